use crate::error::Error;
use crate::event::{DEFAULT_BOOKMARK_KIND, KIND_GENERIC_REPLY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How reactions from people other than the tracked user are counted
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReactionCounting {
    /// Every reaction event counts, even repeats by the same author
    #[default]
    EveryEvent,

    /// Each author counts once; later reactions only refresh their timestamp
    LatestPerAuthor,
}

/// Tunables for the aggregator and the payment tracker.
///
/// Everything has a default, so a settings file only needs the keys it changes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    // Aggregation
    pub reaction_counting: ReactionCounting,
    pub comment_kinds: Vec<u32>,
    pub bookmark_kind: u32,
    pub count_zap_receipts: bool,

    // Payments
    pub payment_delay_ms: u64,
    pub payment_grace_ms: u64,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            reaction_counting: ReactionCounting::EveryEvent,
            comment_kinds: vec![1, KIND_GENERIC_REPLY],
            bookmark_kind: DEFAULT_BOOKMARK_KIND,
            count_zap_receipts: true,
            payment_delay_ms: 5_000,
            payment_grace_ms: 1_500,
        }
    }
}

impl Settings {
    /// Where settings live if the caller doesn't say
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("nostr-engagement");
            p.push("settings.json");
            p
        })
    }

    /// Load settings from a JSON file. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Settings, Error> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings at {}, using defaults", path.display());
                return Ok(Settings::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn payment_delay(&self) -> Duration {
        Duration::from_millis(self.payment_delay_ms)
    }

    pub fn payment_grace(&self) -> Duration {
        Duration::from_millis(self.payment_grace_ms)
    }
}
