use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::feed::{FeedError, FeedPage, FeedSource};
use crate::item::ReelItem;
use crate::mute::{MuteError, MuteHandle};
use crate::pager::{FeedState, FetchOutcome};
use crate::video::{PlaybackEvent, Player, VideoSource};

struct FetchResponse {
    request_id: u64,
    result: Result<FeedPage, FeedError>,
}

pub struct Options {
    pub source: Arc<dyn FeedSource>,
    pub mute: MuteHandle,
    pub player: Box<dyn Player>,
    pub dedupe_ids: bool,
}

/// Owns the feed session: pages come in on a background thread and are
/// applied here, on the UI thread, in [`FeedScreen::poll`].
pub struct FeedScreen {
    state: FeedState,
    items: Vec<ReelItem>,
    source: Arc<dyn FeedSource>,
    mute: MuteHandle,
    mute_rx: Receiver<bool>,
    player: Box<dyn Player>,
    loaded: Option<usize>,
    response_tx: Sender<FetchResponse>,
    response_rx: Receiver<FetchResponse>,
}

impl FeedScreen {
    pub fn new(opts: Options) -> Result<Self, MuteError> {
        let mute_rx = opts.mute.subscribe()?;
        let (response_tx, response_rx) = unbounded();
        Ok(Self {
            state: FeedState::new(opts.dedupe_ids),
            items: Vec::new(),
            source: opts.source,
            mute: opts.mute,
            mute_rx,
            player: opts.player,
            loaded: None,
            response_tx,
            response_rx,
        })
    }

    /// Kicks off the first page load.
    pub fn mount(&mut self) {
        self.request_more();
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn items(&self) -> &[ReelItem] {
        &self.items
    }

    pub fn active_item(&self) -> Option<&ReelItem> {
        self.items.get(self.state.active_index())
    }

    fn active_item_mut(&mut self) -> Option<&mut ReelItem> {
        self.items.get_mut(self.state.active_index())
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_fetching()
    }

    /// Starts a page fetch unless one is in flight or the feed is exhausted.
    pub fn request_more(&mut self) -> bool {
        let Some(request) = self.state.start_fetch() else {
            return false;
        };
        tracing::debug!(request_id = request.id, cursor = ?request.cursor, "requesting feed page");
        let tx = self.response_tx.clone();
        let source = self.source.clone();
        thread::spawn(move || {
            let result = source.fetch_page(request.cursor.as_deref());
            let _ = tx.send(FetchResponse {
                request_id: request.id,
                result,
            });
        });
        true
    }

    /// Applies finished fetches, mute changes and player events. Returns
    /// true when anything visible changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(response) = self.response_rx.try_recv() {
            self.apply_response(response);
            changed = true;
        }
        changed |= self.apply_mute_updates();
        for event in self.player.poll_events() {
            self.apply_playback_event(event);
            changed = true;
        }
        changed
    }

    fn apply_response(&mut self, response: FetchResponse) {
        match self.state.finish_fetch(response.request_id, response.result) {
            FetchOutcome::Appended(range) => {
                let first_page = self.items.is_empty();
                for index in range.clone() {
                    let post = self.state.posts()[index].clone();
                    let active = self.state.is_active(index);
                    self.items.push(ReelItem::new(post, self.mute.clone(), active));
                }
                tracing::info!(
                    appended = range.len(),
                    total = self.items.len(),
                    has_next = self.state.has_next(),
                    "feed page applied"
                );
                if first_page && !self.items.is_empty() {
                    self.sync_playback();
                }
                // An empty page would otherwise re-trigger itself on every poll.
                if !range.is_empty() {
                    self.maybe_prefetch();
                }
            }
            FetchOutcome::Failed => {}
            FetchOutcome::Stale => {
                tracing::debug!(request_id = response.request_id, "dropping stale feed page");
            }
        }
    }

    fn apply_mute_updates(&mut self) -> bool {
        let Some(muted) = self.mute_rx.try_iter().last() else {
            return false;
        };
        if self.loaded.is_some() {
            if let Err(err) = self.player.set_muted(muted) {
                tracing::warn!(error = %err, "failed to update player mute state");
            }
        }
        true
    }

    fn apply_playback_event(&mut self, event: PlaybackEvent) {
        let Some(item) = self.loaded.and_then(|index| self.items.get_mut(index)) else {
            return;
        };
        match event {
            PlaybackEvent::Buffering(buffering) => item.set_buffering(buffering),
            PlaybackEvent::Error(message) => item.on_playback_error(&message),
        }
    }

    fn maybe_prefetch(&mut self) {
        if self.state.wants_prefetch() {
            self.request_more();
        }
    }

    /// Reports the pager's current page. Exactly one item ends up active.
    pub fn select(&mut self, index: usize) -> bool {
        if self.items.is_empty() {
            self.maybe_prefetch();
            return false;
        }
        let changed = self.state.select(index);
        if changed {
            self.sync_activation();
        }
        self.maybe_prefetch();
        changed
    }

    pub fn next(&mut self) -> bool {
        self.select(self.state.active_index().saturating_add(1))
    }

    pub fn previous(&mut self) -> bool {
        self.select(self.state.active_index().saturating_sub(1))
    }

    pub fn jump_to(&mut self, index: usize) -> bool {
        self.select(index)
    }

    pub fn jump_to_last(&mut self) -> bool {
        self.select(self.items.len().saturating_sub(1))
    }

    fn sync_activation(&mut self) {
        for (index, item) in self.items.iter_mut().enumerate() {
            item.set_active(self.state.is_active(index));
        }
        self.sync_playback();
    }

    fn sync_playback(&mut self) {
        let active = self.state.active_index();
        let Some(item) = self.items.get(active) else {
            return;
        };
        let paused = item.is_paused();
        if self.loaded == Some(active) {
            if let Err(err) = self.player.set_paused(paused) {
                tracing::warn!(error = %err, "failed to update player pause state");
            }
            return;
        }
        let id = item.post().id.clone();
        let source = VideoSource::from_post(item.post());

        if let Some(previous) = self.loaded.and_then(|index| self.items.get_mut(index)) {
            previous.set_buffering(false);
        }
        self.loaded = None;
        self.player.stop();

        let Some(source) = source else {
            tracing::warn!(%id, "post has no playable video");
            return;
        };
        let muted = match self.mute.is_muted() {
            Ok(muted) => muted,
            Err(err) => {
                tracing::error!(error = %err, "cannot read mute state");
                true
            }
        };
        match self.player.load(&source, paused, muted) {
            Ok(()) => self.loaded = Some(active),
            Err(err) => {
                tracing::warn!(error = %err, url = %source.playback_url, "failed to start video")
            }
        }
    }

    pub fn tap(&mut self, now: Instant) {
        let Some(item) = self.active_item_mut() else {
            return;
        };
        item.tap(now);
        let paused = item.is_paused();
        if self.loaded == Some(self.state.active_index()) {
            if let Err(err) = self.player.set_paused(paused) {
                tracing::warn!(error = %err, "failed to toggle playback");
            }
        }
    }

    pub fn like(&mut self, now: Instant) {
        if let Some(item) = self.active_item_mut() {
            item.like(now);
        }
    }

    pub fn toggle_caption(&mut self) {
        if let Some(item) = self.active_item_mut() {
            item.toggle_caption();
        }
    }

    pub fn toggle_mute(&mut self) -> Result<bool, MuteError> {
        let muted = match self.active_item() {
            Some(item) => item.toggle_mute()?,
            None => self.mute.toggle()?,
        };
        self.apply_mute_updates();
        Ok(muted)
    }

    pub fn is_muted(&self) -> Result<bool, MuteError> {
        self.mute.is_muted()
    }

    /// Advances every running overlay animation.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for item in self.items.iter_mut().filter(|item| item.is_animating()) {
            changed |= item.tick(now);
        }
        changed
    }

    pub fn is_animating(&self) -> bool {
        self.items.iter().any(ReelItem::is_animating)
    }

    pub fn shutdown(&mut self) {
        self.player.stop();
        self.loaded = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Author, Pagination, Post};
    use crate::mute::MuteProvider;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedSource {
        pages: Mutex<VecDeque<Result<FeedPage, FeedError>>>,
        cursors: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn push_page(&self, ids: &[&str], next: Option<&str>, has_next: bool) {
            self.pages.lock().push_back(Ok(page(ids, next, has_next)));
        }

        fn push_error(&self) {
            self.pages
                .lock()
                .push_back(Err(FeedError::Status { status: 503 }));
        }

        fn calls(&self) -> Vec<Option<String>> {
            self.cursors.lock().clone()
        }
    }

    impl FeedSource for ScriptedSource {
        fn fetch_page(&self, cursor: Option<&str>) -> Result<FeedPage, FeedError> {
            self.cursors.lock().push(cursor.map(str::to_string));
            self.pages
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(FeedPage::empty()))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Load { url: String, paused: bool, muted: bool },
        Paused(bool),
        Muted(bool),
        Stop,
    }

    #[derive(Clone, Default)]
    struct RecordingPlayer {
        calls: Arc<Mutex<Vec<Call>>>,
        events: Arc<Mutex<Vec<PlaybackEvent>>>,
    }

    impl Player for RecordingPlayer {
        fn load(&mut self, source: &VideoSource, paused: bool, muted: bool) -> anyhow::Result<()> {
            self.calls.lock().push(Call::Load {
                url: source.playback_url.clone(),
                paused,
                muted,
            });
            Ok(())
        }

        fn set_paused(&mut self, paused: bool) -> anyhow::Result<()> {
            self.calls.lock().push(Call::Paused(paused));
            Ok(())
        }

        fn set_muted(&mut self, muted: bool) -> anyhow::Result<()> {
            self.calls.lock().push(Call::Muted(muted));
            Ok(())
        }

        fn stop(&mut self) {
            self.calls.lock().push(Call::Stop);
        }

        fn poll_events(&mut self) -> Vec<PlaybackEvent> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    fn post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            video_url: format!("https://cdn.test/{id}.mp4"),
            thumbnail_url: String::new(),
            description: None,
            likes: 1,
            comments: 0,
            author: Author {
                name: "stoa".into(),
                avatar_url: String::new(),
            },
        }
    }

    fn page(ids: &[&str], next: Option<&str>, has_next: bool) -> FeedPage {
        FeedPage {
            posts: ids.iter().map(|id| post(id)).collect(),
            pagination: Pagination {
                next_cursor: next.map(str::to_string),
                has_next,
            },
        }
    }

    fn screen_with(
        source: Arc<ScriptedSource>,
        mute: &MuteProvider,
    ) -> (FeedScreen, RecordingPlayer) {
        let player = RecordingPlayer::default();
        let screen = FeedScreen::new(Options {
            source,
            mute: mute.handle(),
            player: Box::new(player.clone()),
            dedupe_ids: false,
        })
        .unwrap();
        (screen, player)
    }

    fn settle(screen: &mut FeedScreen) {
        for _ in 0..400 {
            screen.poll();
            if !screen.is_loading() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("fetch did not finish");
    }

    fn active_count(screen: &FeedScreen) -> usize {
        screen.items().iter().filter(|item| item.is_active()).count()
    }

    #[test]
    fn first_load_activates_the_first_post() {
        let source = Arc::new(ScriptedSource::default());
        let ids: Vec<String> = (0..10).map(|i| format!("p{i}")).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        source.push_page(&ids, Some("c1"), true);
        let mute = MuteProvider::new();
        let (mut screen, player) = screen_with(source.clone(), &mute);

        screen.mount();
        settle(&mut screen);

        assert_eq!(screen.items().len(), 10);
        assert_eq!(screen.state().active_index(), 0);
        assert!(screen.items()[0].is_active());
        assert!(!screen.items()[0].is_paused());
        assert_eq!(active_count(&screen), 1);
        assert!(player.calls.lock().contains(&Call::Load {
            url: "https://cdn.test/p0.mp4".into(),
            paused: false,
            muted: true,
        }));

        screen.jump_to(8);
        settle(&mut screen);
        assert_eq!(source.calls(), vec![None, Some("c1".to_string())]);
    }

    #[test]
    fn scrolling_keeps_exactly_one_item_active() {
        let source = Arc::new(ScriptedSource::default());
        source.push_page(&["a", "b", "c", "d", "e"], None, false);
        let mute = MuteProvider::new();
        let (mut screen, player) = screen_with(source, &mute);
        screen.mount();
        settle(&mut screen);

        for target in [1, 2, 4, 0, 3] {
            screen.select(target);
            assert_eq!(active_count(&screen), 1);
            assert!(screen.items()[target].is_active());
            for (index, item) in screen.items().iter().enumerate() {
                assert_eq!(item.is_paused(), index != target);
            }
        }
        let loads = player
            .calls
            .lock()
            .iter()
            .filter(|call| matches!(call, Call::Load { .. }))
            .count();
        assert_eq!(loads, 6);
    }

    #[test]
    fn prefetch_triggers_near_the_end_only_once() {
        let source = Arc::new(ScriptedSource::default());
        source.push_page(&["a", "b", "c", "d"], Some("c1"), true);
        source.push_page(&["e", "f"], None, false);
        let mute = MuteProvider::new();
        let (mut screen, _player) = screen_with(source.clone(), &mute);
        screen.mount();
        settle(&mut screen);

        screen.select(1);
        assert!(!screen.is_loading());
        screen.select(2);
        assert!(screen.is_loading());
        screen.select(3);
        screen.next();
        settle(&mut screen);

        assert_eq!(source.calls().len(), 2);
        let ids: Vec<&str> = screen.items().iter().map(|i| i.post().id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d", "e", "f"]);

        screen.jump_to_last();
        settle(&mut screen);
        assert_eq!(source.calls().len(), 2);
    }

    #[test]
    fn failed_fetch_stops_pagination() {
        let source = Arc::new(ScriptedSource::default());
        source.push_page(&["a", "b", "c"], Some("c1"), true);
        source.push_error();
        source.push_page(&["never"], None, false);
        let mute = MuteProvider::new();
        let (mut screen, _player) = screen_with(source.clone(), &mute);
        screen.mount();
        settle(&mut screen);

        screen.select(1);
        settle(&mut screen);
        assert!(!screen.state().has_next());
        assert!(screen.state().last_error().is_some());

        screen.select(2);
        screen.select(0);
        screen.select(2);
        assert!(!screen.is_loading());
        assert_eq!(source.calls().len(), 2);
        assert_eq!(screen.items().len(), 3);
    }

    struct EndlessEmptySource {
        calls: Mutex<usize>,
    }

    impl FeedSource for EndlessEmptySource {
        fn fetch_page(&self, _cursor: Option<&str>) -> Result<FeedPage, FeedError> {
            *self.calls.lock() += 1;
            Ok(page(&[], Some("again"), true))
        }
    }

    #[test]
    fn empty_page_with_more_pending_waits_for_input() {
        let source = Arc::new(EndlessEmptySource {
            calls: Mutex::new(0),
        });
        let mute = MuteProvider::new();
        let mut screen = FeedScreen::new(Options {
            source: source.clone(),
            mute: mute.handle(),
            player: Box::new(RecordingPlayer::default()),
            dedupe_ids: false,
        })
        .unwrap();

        screen.mount();
        settle(&mut screen);
        for _ in 0..50 {
            screen.poll();
        }
        assert!(!screen.is_loading());
        assert_eq!(*source.calls.lock(), 1);
        assert!(screen.state().has_next());

        screen.next();
        settle(&mut screen);
        assert_eq!(*source.calls.lock(), 2);
    }

    #[test]
    fn tap_is_overridden_by_the_next_activation_change() {
        let source = Arc::new(ScriptedSource::default());
        source.push_page(&["a", "b", "c", "d", "e"], None, false);
        let mute = MuteProvider::new();
        let (mut screen, player) = screen_with(source, &mute);
        screen.mount();
        settle(&mut screen);

        screen.tap(Instant::now());
        assert!(screen.active_item().unwrap().is_paused());
        assert_eq!(player.calls.lock().last(), Some(&Call::Paused(true)));

        screen.next();
        screen.previous();
        assert!(!screen.active_item().unwrap().is_paused());
    }

    #[test]
    fn mute_toggled_on_one_item_reaches_the_player_and_other_items() {
        let source = Arc::new(ScriptedSource::default());
        source.push_page(&["a", "b", "c", "d", "e"], None, false);
        let mute = MuteProvider::new();
        let (mut screen, player) = screen_with(source, &mute);
        screen.mount();
        settle(&mut screen);

        screen.select(3);
        assert_eq!(screen.toggle_mute(), Ok(false));
        assert_eq!(player.calls.lock().last(), Some(&Call::Muted(false)));
        assert_eq!(screen.items()[0].is_muted(), Ok(false));

        screen.select(0);
        assert!(player.calls.lock().contains(&Call::Load {
            url: "https://cdn.test/a.mp4".into(),
            paused: false,
            muted: false,
        }));
    }

    #[test]
    fn like_persists_through_taps() {
        let source = Arc::new(ScriptedSource::default());
        source.push_page(&["a"], None, false);
        let mute = MuteProvider::new();
        let (mut screen, _player) = screen_with(source, &mute);
        screen.mount();
        settle(&mut screen);

        let now = Instant::now();
        screen.like(now);
        screen.tap(now);
        screen.tap(now);
        assert!(screen.active_item().unwrap().is_liked());
        assert!(screen.is_animating());
        assert!(screen.tick(now + Duration::from_millis(250)));
        screen.tick(now + Duration::from_secs(3));
        assert!(!screen.is_animating());
        assert!(screen.active_item().unwrap().is_liked());
    }

    #[test]
    fn buffering_events_reach_the_loaded_item() {
        let source = Arc::new(ScriptedSource::default());
        source.push_page(&["a", "b"], None, false);
        let mute = MuteProvider::new();
        let (mut screen, player) = screen_with(source, &mute);
        screen.mount();
        settle(&mut screen);

        player.events.lock().push(PlaybackEvent::Buffering(true));
        assert!(screen.poll());
        assert!(screen.items()[0].is_buffering());
        player
            .events
            .lock()
            .push(PlaybackEvent::Error("decoder failed".into()));
        screen.poll();
        assert!(screen.items()[0].is_buffering());

        screen.select(1);
        assert!(!screen.items()[0].is_buffering());
    }

    #[test]
    fn screen_requires_a_live_mute_provider() {
        let source: Arc<dyn FeedSource> = Arc::new(ScriptedSource::default());
        let result = FeedScreen::new(Options {
            source,
            mute: MuteHandle::detached(),
            player: Box::new(RecordingPlayer::default()),
            dedupe_ids: false,
        });
        assert!(matches!(result, Err(MuteError::ProviderDropped)));
    }
}
