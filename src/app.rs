use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config;
use crate::feed::{self, FeedSource};
use crate::logging;
use crate::mute::MuteProvider;
use crate::screen::{self, FeedScreen};
use crate::ui;
use crate::video::{MpvOptions, MpvPlayer, NullPlayer, Player};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
}

pub fn run(opts: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: opts.config_file,
        env_prefix: None,
    })
    .context("load config")?;
    logging::init(&cfg.log).context("initialize logging")?;

    let client = feed::Client::new(feed::ClientConfig {
        endpoint: cfg.feed.endpoint.clone(),
        media_base_url: cfg.feed.media_base_url.clone(),
        user_agent: cfg.feed.user_agent.clone(),
        request_timeout: cfg.feed.timeout(),
        http_client: None,
    })
    .context("create feed client")?;
    let source: Arc<dyn FeedSource> = Arc::new(client);

    let player: Box<dyn Player> = if cfg.player.enabled {
        Box::new(MpvPlayer::new(MpvOptions {
            mpv_path: cfg.player.mpv_path.clone(),
            user_agent: Some(cfg.feed.user_agent.clone()),
        }))
    } else {
        tracing::info!("video playback disabled by config");
        Box::new(NullPlayer)
    };

    let mute = MuteProvider::with_initial(cfg.player.start_muted);
    let screen = FeedScreen::new(screen::Options {
        source,
        mute: mute.handle(),
        player,
        dedupe_ids: cfg.feed.dedupe_ids,
    })?;

    let status_message = if cfg.player.enabled {
        format!("Videos play in {}.", cfg.player.mpv_path)
    } else {
        "Video playback is disabled.".to_string()
    };
    let mut model = ui::Model::new(ui::Options {
        screen,
        status_message,
    });
    model.run()?;
    tracing::info!("reels-tui exiting");

    Ok(())
}
