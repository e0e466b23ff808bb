use std::collections::HashSet;
use std::ops::Range;

use crate::feed::{FeedError, FeedPage, Post};

/// Fetch when the active post is this close to the end of the loaded list.
pub const PREFETCH_LOOKAHEAD: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub id: u64,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Appended(Range<usize>),
    Failed,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Fetching { request_id: u64 },
}

/// Session state for the feed: accumulated posts, pagination cursor and the
/// single active index.
#[derive(Debug)]
pub struct FeedState {
    posts: Vec<Post>,
    cursor: Option<String>,
    has_next: bool,
    active_index: usize,
    phase: Phase,
    next_request_id: u64,
    last_error: Option<String>,
    dedupe_ids: bool,
    seen_ids: HashSet<String>,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new(false)
    }
}

impl FeedState {
    pub fn new(dedupe_ids: bool) -> Self {
        Self {
            posts: Vec::new(),
            cursor: None,
            has_next: true,
            active_index: 0,
            phase: Phase::Idle,
            next_request_id: 1,
            last_error: None,
            dedupe_ids,
            seen_ids: HashSet::new(),
        }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.phase, Phase::Fetching { .. })
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn is_active(&self, index: usize) -> bool {
        index == self.active_index && index < self.posts.len()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Idle -> Fetching. Returns `None` when there is nothing more to load or
    /// a fetch is already in flight.
    pub fn start_fetch(&mut self) -> Option<FetchRequest> {
        if !self.has_next || self.is_fetching() {
            return None;
        }
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.phase = Phase::Fetching { request_id: id };
        Some(FetchRequest {
            id,
            cursor: self.cursor.clone(),
        })
    }

    pub fn finish_fetch(
        &mut self,
        request_id: u64,
        result: Result<FeedPage, FeedError>,
    ) -> FetchOutcome {
        match self.phase {
            Phase::Fetching { request_id: pending } if pending == request_id => {}
            _ => return FetchOutcome::Stale,
        }
        self.phase = Phase::Idle;

        match result {
            Ok(page) => {
                let start = self.posts.len();
                for post in page.posts {
                    if self.dedupe_ids && !self.seen_ids.insert(post.id.clone()) {
                        tracing::debug!(id = %post.id, "skipping duplicate post");
                        continue;
                    }
                    self.posts.push(post);
                }
                self.cursor = page.pagination.next_cursor;
                self.has_next = page.pagination.has_next;
                FetchOutcome::Appended(start..self.posts.len())
            }
            Err(err) => {
                tracing::warn!(error = %err, "feed fetch failed, no further pages will be requested");
                self.has_next = false;
                self.last_error = Some(err.to_string());
                FetchOutcome::Failed
            }
        }
    }

    /// Moves the active post. The index is clamped to the loaded range.
    pub fn select(&mut self, index: usize) -> bool {
        let clamped = index.min(self.posts.len().saturating_sub(1));
        let changed = clamped != self.active_index;
        self.active_index = clamped;
        changed
    }

    pub fn wants_prefetch(&self) -> bool {
        self.has_next
            && !self.is_fetching()
            && self.active_index >= self.posts.len().saturating_sub(PREFETCH_LOOKAHEAD)
    }
}
