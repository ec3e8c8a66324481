use super::{CurrentUser, ReactionStats};
use crate::event::Event;
use crate::settings::{ReactionCounting, Settings};
use nostr_types::EventKind;
use std::collections::HashMap;

/// Folds one event into the stats of its root. The caller has already checked
/// the event is new and resolved its root.
pub type KindHandler = fn(&mut ReactionStats, &Event, &CurrentUser);

/// Maps event kinds to the handler that folds them
#[derive(Clone, Default)]
pub struct Dispatch {
    handlers: HashMap<u32, KindHandler>,
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl Dispatch {
    pub fn empty() -> Dispatch {
        Default::default()
    }

    pub fn from_settings(settings: &Settings) -> Dispatch {
        let mut dispatch = Dispatch::empty();

        let react: KindHandler = match settings.reaction_counting {
            ReactionCounting::EveryEvent => react_every_event,
            ReactionCounting::LatestPerAuthor => react_latest_per_author,
        };
        dispatch.register(u32::from(EventKind::Reaction), react);

        dispatch.register(u32::from(EventKind::Repost), repost);
        dispatch.register(u32::from(EventKind::GenericRepost), repost);

        for kind in &settings.comment_kinds {
            dispatch.register(*kind, comment);
        }

        dispatch.register(settings.bookmark_kind, bookmark);

        if settings.count_zap_receipts {
            dispatch.register(u32::from(EventKind::Zap), zap_receipt);
        }

        dispatch
    }

    /// Add or replace the handler for `kind`, returning any handler it displaced
    pub fn register(&mut self, kind: u32, handler: KindHandler) -> Option<KindHandler> {
        self.handlers.insert(kind, handler)
    }

    pub fn unregister(&mut self, kind: u32) -> Option<KindHandler> {
        self.handlers.remove(&kind)
    }

    pub fn get(&self, kind: u32) -> Option<KindHandler> {
        self.handlers.get(&kind).copied()
    }

    pub fn kinds(&self) -> Vec<u32> {
        let mut kinds: Vec<u32> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

// The user's own reaction: the latest one by created_at is kept, and it only
// ever contributes one to the count.
fn self_reaction(stats: &mut ReactionStats, event: &Event) {
    let newer = match &stats.reacted_by_user {
        None => {
            stats.reaction_count += 1;
            true
        }
        Some(previous) => event.created_at > previous.created_at,
    };
    if newer {
        stats.reacted_by_user = Some(event.clone());
    }
}

/// Counts every reaction from other people, including repeats
pub fn react_every_event(stats: &mut ReactionStats, event: &Event, user: &CurrentUser) {
    if user.is(&event.pubkey) {
        self_reaction(stats, event);
    } else {
        stats.reaction_count += 1;
    }
}

/// Counts each other author once
pub fn react_latest_per_author(stats: &mut ReactionStats, event: &Event, user: &CurrentUser) {
    if user.is(&event.pubkey) {
        self_reaction(stats, event);
        return;
    }

    match stats.reacted_by.get_mut(&event.pubkey) {
        Some(latest) => {
            if event.created_at > *latest {
                *latest = event.created_at;
            }
        }
        None => {
            stats.reacted_by.insert(event.pubkey.clone(), event.created_at);
            stats.reaction_count += 1;
        }
    }
}

pub fn repost(stats: &mut ReactionStats, event: &Event, user: &CurrentUser) {
    stats.reposted_by.insert(event.pubkey.clone());
    stats.reposts.push(event.clone());
    if user.is(&event.pubkey) {
        stats.reposted_by_user = true;
    }
}

/// Comments are kept ordered by created_at so delivery order doesn't matter
pub fn comment(stats: &mut ReactionStats, event: &Event, user: &CurrentUser) {
    stats.comment_count += 1;
    let index = stats
        .comments
        .partition_point(|c| c.created_at <= event.created_at);
    stats.comments.insert(index, event.clone());
    if user.is(&event.pubkey) {
        stats.commented_by_user = true;
    }
}

pub fn bookmark(stats: &mut ReactionStats, event: &Event, user: &CurrentUser) {
    if user.is(&event.pubkey) {
        stats.bookmarked_by_user = true;
    }
}

/// NIP-57 receipt. The receipt is signed by the zapper service, so the payer and
/// amount come from the embedded zap request.
pub fn zap_receipt(stats: &mut ReactionStats, event: &Event, user: &CurrentUser) {
    let request: Option<Event> = event
        .first_tag_value("description")
        .and_then(|json| serde_json::from_str(json).ok());

    let (payer, msats) = match &request {
        Some(request) => (
            request.pubkey.clone(),
            request
                .first_tag_value("amount")
                .and_then(|a| a.parse::<u64>().ok())
                .unwrap_or(0),
        ),
        None => {
            tracing::debug!("Zap receipt {} has no readable zap request", event.id);
            let payer = event.first_tag_value("P").unwrap_or(event.pubkey.as_str());
            (payer.to_owned(), 0)
        }
    };

    stats.zapped_msats = stats.zapped_msats.saturating_add(msats);
    if user.is(&payer) {
        stats.zapped_by_user = true;
    }
    stats.zapped_by.insert(payer);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::fixtures::event;
    use crate::event::Tag;
    use nostr_types::Unixtime;

    fn me() -> CurrentUser {
        CurrentUser::Pubkey("me".to_owned())
    }

    #[test]
    fn test_default_registrations() {
        let dispatch = Dispatch::from_settings(&Settings::default());
        assert_eq!(dispatch.kinds(), vec![1, 6, 7, 16, 1111, 3006, 9735]);

        let settings = Settings {
            count_zap_receipts: false,
            bookmark_kind: 10003,
            ..Default::default()
        };
        let dispatch = Dispatch::from_settings(&settings);
        assert_eq!(dispatch.kinds(), vec![1, 6, 7, 16, 1111, 10003]);
    }

    #[test]
    fn test_register_replaces() {
        fn nothing(_: &mut ReactionStats, _: &Event, _: &CurrentUser) {}

        let mut dispatch = Dispatch::from_settings(&Settings::default());
        assert!(dispatch.register(7, nothing).is_some());
        assert!(dispatch.register(42, nothing).is_none());
        assert!(dispatch.unregister(42).is_some());
        assert!(dispatch.get(42).is_none());

        let mut stats = ReactionStats::default();
        (dispatch.get(7).unwrap())(&mut stats, &event("r", "a", 7, 1, vec![]), &me());
        assert_eq!(stats.reaction_count, 0);
    }

    #[test]
    fn test_self_reaction_latest_wins() {
        let mut stats = ReactionStats::default();
        react_every_event(&mut stats, &event("r1", "me", 7, 100, vec![]), &me());
        react_every_event(&mut stats, &event("r2", "me", 7, 50, vec![]), &me());
        assert_eq!(stats.reaction_count, 1);
        assert_eq!(
            stats.reacted_by_user.as_ref().map(|e| e.created_at),
            Some(Unixtime(100))
        );

        react_every_event(&mut stats, &event("r3", "me", 7, 150, vec![]), &me());
        assert_eq!(stats.reaction_count, 1);
        assert_eq!(stats.reacted_by_user.as_ref().unwrap().id, "r3");
    }

    #[test]
    fn test_external_reaction_counting_modes() {
        let reactions = [
            event("r1", "alice", 7, 10, vec![]),
            event("r2", "alice", 7, 20, vec![]),
            event("r3", "bob", 7, 15, vec![]),
        ];

        let mut raw = ReactionStats::default();
        let mut per_author = ReactionStats::default();
        for r in &reactions {
            react_every_event(&mut raw, r, &me());
            react_latest_per_author(&mut per_author, r, &me());
        }

        assert_eq!(raw.reaction_count, 3);
        assert!(raw.reacted_by.is_empty());

        assert_eq!(per_author.reaction_count, 2);
        assert_eq!(per_author.reacted_by.get("alice"), Some(&Unixtime(20)));
        assert_eq!(per_author.reacted_by.get("bob"), Some(&Unixtime(15)));
    }

    #[test]
    fn test_everyone_counts_as_user() {
        let mut stats = ReactionStats::default();
        react_every_event(&mut stats, &event("r1", "alice", 7, 10, vec![]), &CurrentUser::Everyone);
        react_every_event(&mut stats, &event("r2", "bob", 7, 20, vec![]), &CurrentUser::Everyone);
        assert_eq!(stats.reaction_count, 1);
        assert_eq!(stats.reacted_by_user.unwrap().pubkey, "bob");
    }

    #[test]
    fn test_comments_ordered_by_time() {
        let mut stats = ReactionStats::default();
        comment(&mut stats, &event("c2", "alice", 1, 20, vec![]), &me());
        comment(&mut stats, &event("c1", "bob", 1, 10, vec![]), &me());
        comment(&mut stats, &event("c3", "me", 1111, 30, vec![]), &me());
        let ids: Vec<&str> = stats.comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(stats.comment_count, 3);
        assert!(stats.commented_by_user);
    }

    #[test]
    fn test_reposts_and_bookmarks() {
        let mut stats = ReactionStats::default();
        repost(&mut stats, &event("p1", "alice", 6, 1, vec![]), &me());
        repost(&mut stats, &event("p2", "alice", 16, 2, vec![]), &me());
        assert_eq!(stats.reposted_by.len(), 1);
        assert_eq!(stats.reposts.len(), 2);
        assert!(!stats.reposted_by_user);

        repost(&mut stats, &event("p3", "me", 6, 3, vec![]), &me());
        assert!(stats.reposted_by_user);

        bookmark(&mut stats, &event("b1", "alice", 3006, 1, vec![]), &me());
        assert!(!stats.bookmarked_by_user);
        bookmark(&mut stats, &event("b2", "me", 3006, 1, vec![]), &me());
        assert!(stats.bookmarked_by_user);
    }

    #[test]
    fn test_zap_receipt_reads_request() {
        let request = serde_json::to_string(&event(
            "zr",
            "me",
            9734,
            1,
            vec![Tag::new(&["amount", "21000"]), Tag::new(&["e", "photo"])],
        ))
        .unwrap();
        let receipt = event(
            "z1",
            "zapper-service",
            9735,
            2,
            vec![Tag::new(&["e", "photo"]), Tag::new(&["description", &request])],
        );

        let mut stats = ReactionStats::default();
        zap_receipt(&mut stats, &receipt, &me());
        assert_eq!(stats.zapped_msats, 21000);
        assert!(stats.zapped_by.contains("me"));
        assert!(stats.zapped_by_user);
    }

    #[test]
    fn test_zap_receipt_without_request() {
        let receipt = event(
            "z1",
            "zapper-service",
            9735,
            2,
            vec![Tag::new(&["e", "photo"]), Tag::new(&["P", "alice"])],
        );
        let mut stats = ReactionStats::default();
        zap_receipt(&mut stats, &receipt, &me());
        assert_eq!(stats.zapped_msats, 0);
        assert!(stats.zapped_by.contains("alice"));
        assert!(!stats.zapped_by_user);
    }

    #[test]
    fn test_zap_total_saturates() {
        let request = serde_json::to_string(&event(
            "zr",
            "bob",
            9734,
            1,
            vec![Tag::new(&["amount", &u64::MAX.to_string()])],
        ))
        .unwrap();
        let receipt = |id: &str| {
            event(
                id,
                "zapper-service",
                9735,
                2,
                vec![Tag::new(&["e", "photo"]), Tag::new(&["description", &request])],
            )
        };

        let mut stats = ReactionStats::default();
        zap_receipt(&mut stats, &receipt("z1"), &me());
        zap_receipt(&mut stats, &receipt("z2"), &me());
        assert_eq!(stats.zapped_msats, u64::MAX);
        assert!(!stats.zapped_by_user);
    }
}
