use crate::event::{Event, Tag};

/// Works out which content item an event is about.
///
/// Subscription layers disagree on threading conventions, so the aggregator takes
/// this as a collaborator rather than hard-coding one.
pub trait RootResolver: Send + Sync {
    fn root_id(&self, event: &Event) -> Option<String>;
}

/// Resolves roots using NIP-22 uppercase tags first, then NIP-10 markers, then the
/// deprecated positional `e` tag convention.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagRootResolver;

impl RootResolver for TagRootResolver {
    fn root_id(&self, event: &Event) -> Option<String> {
        root_tag(event).map(|t| t.value().to_owned())
    }
}

fn usable(tag: &Tag) -> bool {
    !tag.value().is_empty()
}

/// The tag naming the thread root of `event`, if any
pub fn root_tag(event: &Event) -> Option<&Tag> {
    // NIP-22 scopes
    for name in ["E", "A", "I"] {
        if let Some(tag) = event.tags_named(name).find(|t| usable(t)) {
            return Some(tag);
        }
    }

    // Mentions cite another event without replying to it
    let refs: Vec<&Tag> = event
        .tags
        .iter()
        .filter(|t| (t.tagname() == "e" || t.tagname() == "a") && usable(t))
        .filter(|t| t.marker() != Some("mention"))
        .collect();

    if let Some(tag) = refs.iter().find(|t| t.marker() == Some("root")) {
        return Some(*tag);
    }

    if refs.len() == 1 {
        return Some(refs[0]);
    }

    // Positional: with no markers at all, the first 'e' is the root
    if refs.iter().all(|t| t.marker().is_none()) {
        return refs.iter().find(|t| t.tagname() == "e").copied();
    }

    None
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::fixtures::event;

    fn root(tags: Vec<Tag>) -> Option<String> {
        TagRootResolver.root_id(&event("x", "pk", 7, 1, tags))
    }

    #[test]
    fn test_uppercase_root_wins() {
        let tags = vec![
            Tag::new(&["e", "parent", "", "reply"]),
            Tag::new(&["E", "top"]),
        ];
        assert_eq!(root(tags), Some("top".to_owned()));
    }

    #[test]
    fn test_marked_root() {
        let tags = vec![
            Tag::new(&["e", "parent", "", "reply"]),
            Tag::new(&["e", "top", "wss://relay.example", "root"]),
        ];
        assert_eq!(root(tags), Some("top".to_owned()));
    }

    #[test]
    fn test_single_reference() {
        assert_eq!(root(vec![Tag::new(&["e", "only"])]), Some("only".to_owned()));
        assert_eq!(
            root(vec![Tag::new(&["a", "30023:pk:slug"])]),
            Some("30023:pk:slug".to_owned())
        );
    }

    #[test]
    fn test_positional_first_e() {
        let tags = vec![
            Tag::new(&["p", "someone"]),
            Tag::new(&["e", "first"]),
            Tag::new(&["e", "second"]),
        ];
        assert_eq!(root(tags), Some("first".to_owned()));
    }

    #[test]
    fn test_unresolvable() {
        assert_eq!(root(vec![]), None);
        assert_eq!(root(vec![Tag::new(&["p", "someone"])]), None);
        assert_eq!(root(vec![Tag::new(&["e", ""])]), None);
        // marked, but none of them is the root
        let tags = vec![
            Tag::new(&["e", "a", "", "reply"]),
            Tag::new(&["e", "b", "", "reply"]),
        ];
        assert_eq!(root(tags), None);
    }

    #[test]
    fn test_mention_is_not_a_root() {
        assert_eq!(root(vec![Tag::new(&["e", "x", "", "mention"])]), None);
        let tags = vec![
            Tag::new(&["e", "cited", "", "mention"]),
            Tag::new(&["e", "parent"]),
        ];
        assert_eq!(root(tags), Some("parent".to_owned()));
    }
}
