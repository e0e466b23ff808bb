#![allow(clippy::uninlined_format_args)]

pub mod animation;
pub mod app;
pub mod config;
pub mod feed;
pub mod item;
pub mod logging;
pub mod mute;
pub mod pager;
pub mod screen;
pub mod ui;
pub mod video;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
