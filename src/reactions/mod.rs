mod handlers;
pub use handlers::{
    bookmark, comment, react_every_event, react_latest_per_author, repost, zap_receipt, Dispatch,
    KindHandler,
};

use crate::event::Event;
use crate::metrics::{Metrics, NoMetrics};
use crate::settings::Settings;
use crate::tags::{RootResolver, TagRootResolver};
use nostr_types::Unixtime;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Who counts as "the user" when folding events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CurrentUser {
    /// Nobody; every event is someone else's
    #[default]
    Nobody,

    /// Every author. Used when the caller already knows the events are the user's own.
    Everyone,

    Pubkey(String),
}

impl CurrentUser {
    pub fn is(&self, pubkey: &str) -> bool {
        match self {
            CurrentUser::Nobody => false,
            CurrentUser::Everyone => true,
            CurrentUser::Pubkey(pk) => pk == pubkey,
        }
    }
}

impl From<Option<String>> for CurrentUser {
    fn from(pubkey: Option<String>) -> CurrentUser {
        match pubkey {
            Some(pk) => CurrentUser::Pubkey(pk),
            None => CurrentUser::Nobody,
        }
    }
}

/// Engagement on one content item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReactionStats {
    pub reaction_count: u64,

    /// The user's latest reaction
    pub reacted_by_user: Option<Event>,

    /// Latest reaction time of each other author. Only filled when counting
    /// one reaction per author.
    pub reacted_by: HashMap<String, Unixtime>,

    pub comment_count: u64,
    pub comments: Vec<Event>,
    pub commented_by_user: bool,

    pub reposted_by: HashSet<String>,
    pub reposts: Vec<Event>,
    pub reposted_by_user: bool,

    pub bookmarked_by_user: bool,

    pub zapped_msats: u64,
    pub zapped_by: HashSet<String>,
    pub zapped_by_user: bool,
}

/// Stats keyed by root id
pub type ReactionMap = HashMap<String, Arc<ReactionStats>>;

/// Everything the aggregator knows in a session.
///
/// Cloning is cheap. Stats are shared between clones and copied on write, so a
/// snapshot handed out earlier never changes underneath its holder.
#[derive(Debug, Clone, Default)]
pub struct ReactionState {
    seen: Arc<HashSet<String>>,
    reactions: Arc<ReactionMap>,
}

impl ReactionState {
    pub fn new() -> ReactionState {
        Default::default()
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn stats(&self, root_id: &str) -> Option<Arc<ReactionStats>> {
        self.reactions.get(root_id).cloned()
    }

    pub fn reactions(&self) -> Arc<ReactionMap> {
        self.reactions.clone()
    }
}

/// Folds events into a [ReactionState]
pub struct Aggregator {
    dispatch: Dispatch,
    resolver: Box<dyn RootResolver>,
    metrics: Arc<dyn Metrics>,
}

impl Aggregator {
    pub fn new(
        dispatch: Dispatch,
        resolver: Box<dyn RootResolver>,
        metrics: Arc<dyn Metrics>,
    ) -> Aggregator {
        Aggregator {
            dispatch,
            resolver,
            metrics,
        }
    }

    pub fn from_settings(settings: &Settings) -> Aggregator {
        Aggregator::new(
            Dispatch::from_settings(settings),
            Box::new(TagRootResolver),
            Arc::new(NoMetrics),
        )
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn dispatch_mut(&mut self) -> &mut Dispatch {
        &mut self.dispatch
    }

    /// Returns the state after folding in `events`. Events already seen are skipped,
    /// as are events with no resolvable root. Nothing here can fail.
    pub fn fold(
        &self,
        mut state: ReactionState,
        events: &[Event],
        user: &CurrentUser,
    ) -> ReactionState {
        for event in events {
            if !Arc::make_mut(&mut state.seen).insert(event.id.clone()) {
                tracing::trace!("Duplicate event {}", event.id);
                self.metrics.incr("reactions.duplicate", 1);
                continue;
            }

            let root_id = match self.resolver.root_id(event) {
                Some(r) => r,
                None => {
                    tracing::debug!(
                        "Skipping event {} (kind {}): no root tag",
                        event.id,
                        event.kind_number()
                    );
                    self.metrics.incr("reactions.unrooted", 1);
                    continue;
                }
            };

            let handler = match self.dispatch.get(event.kind_number()) {
                Some(h) => h,
                None => {
                    self.metrics.incr("reactions.ignored", 1);
                    continue;
                }
            };

            let reactions = Arc::make_mut(&mut state.reactions);
            let stats = reactions.entry(root_id).or_default();
            handler(Arc::make_mut(stats), event, user);
            self.metrics.incr("reactions.folded", 1);
        }

        state
    }
}

/// Owns the aggregator's session state
pub struct ReactionStore {
    aggregator: Aggregator,
    state: RwLock<ReactionState>,
}

impl ReactionStore {
    pub fn new(aggregator: Aggregator) -> ReactionStore {
        ReactionStore {
            aggregator,
            state: RwLock::new(ReactionState::new()),
        }
    }

    pub fn from_settings(settings: &Settings, metrics: Arc<dyn Metrics>) -> ReactionStore {
        ReactionStore::new(Aggregator::new(
            Dispatch::from_settings(settings),
            Box::new(TagRootResolver),
            metrics,
        ))
    }

    /// Fold a batch of events. The whole batch lands under one write lock.
    pub fn add_events(&self, events: &[Event], user: &CurrentUser) {
        let mut state = self.state.write();
        let current = std::mem::take(&mut *state);
        *state = self.aggregator.fold(current, events, user);
    }

    pub fn stats(&self, root_id: &str) -> Option<Arc<ReactionStats>> {
        self.state.read().stats(root_id)
    }

    pub fn snapshot(&self) -> Arc<ReactionMap> {
        self.state.read().reactions()
    }

    pub fn state(&self) -> ReactionState {
        self.state.read().clone()
    }

    pub fn seen_count(&self) -> usize {
        self.state.read().seen_count()
    }

    /// Forget everything, including which events were seen
    pub fn reset(&self) {
        *self.state.write() = ReactionState::new();
    }
}
