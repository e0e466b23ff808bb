use std::time::Instant;

use crate::animation::{self, Transient};
use crate::feed::Post;
use crate::mute::{MuteError, MuteHandle};

pub const CAPTION_TOGGLE_THRESHOLD: usize = 100;
pub const CAPTION_COLLAPSED_LINES: usize = 2;
pub const CAPTION_EXPANDED_LINES: usize = 20;

const FILLER_CAPTION: &str = "Nisi ullamco non ipsum non exercitation nisi duis. Consequat excepteur adipisicing Lorem dolor veniam aliquip pariatur. Nisi quis fugiat reprehenderit dolor. Anim duis consequat proident ipsum nulla aliquip consectetur labore.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionView<'a> {
    pub text: &'a str,
    pub max_lines: usize,
    pub toggle_label: Option<&'static str>,
}

/// Local state for one post in the pager.
pub struct ReelItem {
    post: Post,
    mute: MuteHandle,
    is_active: bool,
    paused: bool,
    buffering: bool,
    liked: bool,
    caption_expanded: bool,
    heart: Transient,
    glyph: Transient,
}

impl ReelItem {
    pub fn new(post: Post, mute: MuteHandle, is_active: bool) -> Self {
        Self {
            post,
            mute,
            is_active,
            paused: !is_active,
            buffering: false,
            liked: false,
            caption_expanded: false,
            heart: Transient::new(animation::HEART_BURST),
            glyph: Transient::new(animation::PLAY_PAUSE_GLYPH),
        }
    }

    pub fn post(&self) -> &Post {
        &self.post
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn is_liked(&self) -> bool {
        self.liked
    }

    pub fn heart(&self) -> &Transient {
        &self.heart
    }

    pub fn glyph(&self) -> &Transient {
        &self.glyph
    }

    /// Activation always overrides a local tap.
    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
        self.paused = !active;
    }

    pub fn tap(&mut self, now: Instant) {
        self.paused = !self.paused;
        self.glyph.start(now);
    }

    pub fn like(&mut self, now: Instant) {
        self.liked = true;
        self.heart.start(now);
    }

    pub fn set_buffering(&mut self, buffering: bool) {
        self.buffering = buffering;
    }

    pub fn on_playback_error(&self, message: &str) {
        tracing::error!(id = %self.post.id, error = message, "video playback error");
    }

    pub fn is_muted(&self) -> Result<bool, MuteError> {
        self.mute.is_muted()
    }

    pub fn toggle_mute(&self) -> Result<bool, MuteError> {
        self.mute.toggle()
    }

    fn caption_text(&self) -> &str {
        match self.post.description.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => FILLER_CAPTION,
        }
    }

    fn caption_toggles(&self) -> bool {
        self.caption_text().chars().count() > CAPTION_TOGGLE_THRESHOLD
    }

    pub fn toggle_caption(&mut self) {
        if self.caption_toggles() {
            self.caption_expanded = !self.caption_expanded;
        }
    }

    pub fn caption(&self) -> CaptionView<'_> {
        let toggle_label = if !self.caption_toggles() {
            None
        } else if self.caption_expanded {
            Some("Show Less")
        } else {
            Some("Read More")
        };
        CaptionView {
            text: self.caption_text(),
            max_lines: if self.caption_expanded {
                CAPTION_EXPANDED_LINES
            } else {
                CAPTION_COLLAPSED_LINES
            },
            toggle_label,
        }
    }

    /// Advances both overlays. Returns true when anything needs a redraw.
    pub fn tick(&mut self, now: Instant) -> bool {
        let heart = self.heart.tick(now);
        let glyph = self.glyph.tick(now);
        heart || glyph
    }

    pub fn is_animating(&self) -> bool {
        self.heart.is_visible() || self.glyph.is_visible()
    }
}
