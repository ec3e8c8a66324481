use nostr_types::{EventKind, Unixtime};
use serde::{Deserialize, Serialize};

/// NIP-22 comment kind. Counted as a reply alongside text notes.
pub const KIND_GENERIC_REPLY: u32 = 1111;

/// Bookmark kind used by the photo client when none is configured.
pub const DEFAULT_BOOKMARK_KIND: u32 = 3006;

/// A nostr tag as it appears on the wire, an array of strings where the first
/// element names the tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    pub fn new(fields: &[&str]) -> Tag {
        Tag(fields.iter().map(|s| s.to_string()).collect())
    }

    pub fn tagname(&self) -> &str {
        self.get_index(0)
    }

    pub fn value(&self) -> &str {
        self.get_index(1)
    }

    /// NIP-10 marker (`root`, `reply`, `mention`) if present
    pub fn marker(&self) -> Option<&str> {
        match self.get_index(3) {
            "" => None,
            m => Some(m),
        }
    }

    /// Field at `index`, or the empty string if the tag is shorter
    pub fn get_index(&self, index: usize) -> &str {
        self.0.get(index).map(|s| s.as_str()).unwrap_or("")
    }
}

/// An event handed to us by the subscription layer. We never sign or verify
/// these; the SDK has already done that by the time they reach us.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: Unixtime,
    pub kind: EventKind,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

impl Event {
    pub fn kind_number(&self) -> u32 {
        u32::from(self.kind)
    }

    /// All tags with the given name
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Tag> + 'a {
        self.tags.iter().filter(move |t| t.tagname() == name)
    }

    /// Value of the first tag with the given name
    pub fn first_tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .filter(|t| t.tagname() == name)
            .map(|t| t.value())
            .find(|v| !v.is_empty())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn event(
        id: &str,
        pubkey: &str,
        kind: u32,
        created_at: i64,
        tags: Vec<Tag>,
    ) -> Event {
        Event {
            id: id.to_owned(),
            pubkey: pubkey.to_owned(),
            created_at: Unixtime(created_at),
            kind: EventKind::from(kind),
            tags,
            content: String::new(),
            sig: String::new(),
        }
    }

    /// An event on `root` tagged the way the photo client tags its replies
    pub(crate) fn on_root(id: &str, pubkey: &str, kind: u32, created_at: i64, root: &str) -> Event {
        event(
            id,
            pubkey,
            kind,
            created_at,
            vec![Tag::new(&["e", root, "", "root"])],
        )
    }
}
