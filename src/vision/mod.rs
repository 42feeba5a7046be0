//! Vendor vision capability. The pipeline only ever talks to the
//! [`VisionClient`] trait; the HTTP adapter and the scripted test double
//! are interchangeable behind it.

pub mod http;
pub mod scripted;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpVisionClient;
pub use scripted::ScriptedVisionClient;

/// Reference to a screenshot the client can dereference.
#[derive(Clone, Debug)]
pub enum ImageRef {
    Path(PathBuf),
    Inline { bytes: Vec<u8>, mime: &'static str },
}

impl ImageRef {
    /// Stable key used by scripted clients and log lines.
    pub fn label(&self) -> String {
        match self {
            ImageRef::Path(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ImageRef::Inline { bytes, .. } => format!("inline:{}b", bytes.len()),
        }
    }
}

/// Phase-1 result: the hand-id token plus the anonymous table state the
/// matcher scores against. Never contains player names; those are
/// phase-2 output only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableScan {
    pub hand_id: Option<String>,
    #[serde(default)]
    pub hero_cards: Vec<String>,
    #[serde(default)]
    pub board_cards: Vec<String>,
    /// Visible stacks in visual order, hero (bottom of the screen) first.
    #[serde(default)]
    pub stacks: Vec<f64>,
    #[serde(default)]
    pub player_count: Option<usize>,
}

impl TableScan {
    pub fn hero_stack(&self) -> Option<f64> {
        self.stacks.first().copied()
    }

    /// Visible player count: the explicit reading when the model gave
    /// one, otherwise the stack list length.
    pub fn visible_players(&self) -> Option<usize> {
        self.player_count
            .or_else(|| (!self.stacks.is_empty()).then_some(self.stacks.len()))
    }

    pub fn is_empty(&self) -> bool {
        self.hand_id.is_none()
            && self.hero_cards.is_empty()
            && self.board_cards.is_empty()
            && self.stacks.is_empty()
    }
}

/// Phase-2 result: real screen names in visual order plus the role
/// markers visible on the felt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerScan {
    #[serde(default)]
    pub players: Vec<String>,
    #[serde(default)]
    pub stacks: Option<Vec<f64>>,
    #[serde(default)]
    pub dealer_player: Option<String>,
    #[serde(default)]
    pub small_blind_player: Option<String>,
    #[serde(default)]
    pub big_blind_player: Option<String>,
}

impl PlayerScan {
    /// Role markers that name a player actually present in the list.
    pub fn roles_populated(&self) -> usize {
        [
            &self.dealer_player,
            &self.small_blind_player,
            &self.big_blind_player,
        ]
        .into_iter()
        .flatten()
        .filter(|name| self.players.iter().any(|p| p == *name))
        .count()
    }

    /// Shape check for the vendor payload. A role marker naming a player
    /// that is not in the list means the model hallucinated the read.
    pub fn validate(&self) -> Result<(), VisionError> {
        if self.players.is_empty() {
            return Err(VisionError::Schema("empty player list".into()));
        }
        if self.players.iter().any(|p| p.trim().is_empty()) {
            return Err(VisionError::Schema("blank player name".into()));
        }
        for (field, value) in [
            ("dealer_player", &self.dealer_player),
            ("small_blind_player", &self.small_blind_player),
            ("big_blind_player", &self.big_blind_player),
        ] {
            if let Some(name) = value {
                if !self.players.iter().any(|p| p == name) {
                    return Err(VisionError::Schema(format!(
                        "{field} `{name}` is not in the player list"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum VisionError {
    /// No usable credential. Construction fails with this; there is no
    /// placeholder-key path that fakes output.
    #[error("vision credential missing or placeholder")]
    AuthMissing,
    #[error("transient vision failure: {0}")]
    Transient(String),
    #[error("permanent vision failure: {0}")]
    Permanent(String),
    #[error("vision call timed out after {0:?}")]
    Timeout(Duration),
    #[error("vision payload failed schema validation: {0}")]
    Schema(String),
}

impl VisionError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, VisionError::Transient(_) | VisionError::Timeout(_))
    }
}

/// Two narrow operations over the vendor service. Implementations must
/// bound wall clock per call, be idempotent, and classify failures as
/// transient or permanent.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Phase 1: read the hand-id token and the anonymous table state.
    async fn scan_table(&self, image: &ImageRef) -> Result<TableScan, VisionError>;

    /// Phase 2: read the player names and role markers. Only called on
    /// screenshots anchored by a successful match.
    async fn extract_players(&self, image: &ImageRef) -> Result<PlayerScan, VisionError>;
}
