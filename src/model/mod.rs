use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Board and rule parameters for one game.
///
/// The realized mine count is not part of the config: every tile is an
/// independent Bernoulli trial with probability `mine_probability`, so a
/// fresh board may hold anywhere from zero mines to a full board of them.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct GameConfig {
    pub width: usize,
    pub height: usize,
    pub mine_probability: f64,
    /// Auto-reveal connected zero-count regions.
    pub cascade_enabled: bool,
    /// Subtract flagged neighbors from displayed counts; flag toggles may
    /// then re-seed the cascade.
    pub live_neighbor_count: bool,
    /// Pause between cascade waves. Pacing only, no effect on the rules.
    pub propagation_delay: Option<Duration>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
            mine_probability: 0.15,
            cascade_enabled: true,
            live_neighbor_count: false,
            propagation_delay: None,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if !self.mine_probability.is_finite() || !(0.0..=1.0).contains(&self.mine_probability) {
            return Err(EngineError::InvalidMineProbability(self.mine_probability));
        }
        Ok(())
    }
}

/// Terminal state of a game. Both end states freeze the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "playing")]
    Playing,
    #[serde(rename = "won")]
    Won,
    #[serde(rename = "lost")]
    Lost,
}

/// What the presentation layer is allowed to see of a single tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum TileView {
    #[serde(rename = "hidden")]
    Hidden,
    #[serde(rename = "flagged")]
    Flagged,
    /// Count may be negative with live neighbor counts on an over-flagged
    /// neighborhood.
    #[serde(rename = "revealed")]
    Revealed { count: i8 },
    /// Unflagged mine, exposed when the game is lost.
    #[serde(rename = "mine")]
    Mine,
    /// Correctly flagged mine, exposed when the game ends.
    #[serde(rename = "found")]
    FoundMine,
    /// Flagged non-mine, exposed when the game is lost.
    #[serde(rename = "wrong")]
    WrongFlag,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileUpdate {
    pub id: usize,
    pub view: TileView,
}

/// State deltas published to subscribers, one batch per event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BoardEvent {
    /// Full snapshot of a fresh (or newly observed) board.
    #[serde(rename = "init")]
    Init {
        width: usize,
        height: usize,
        mine_count: usize,
        tiles: Vec<Vec<TileView>>,
        outcome: Outcome,
    },
    /// An atomic batch of tile changes. Cascades arrive as one event per
    /// wave.
    #[serde(rename = "update")]
    Update {
        updates: Vec<TileUpdate>,
        outcome: Outcome,
    },
}

/// Per-tile answer to a state query. `is_mine` is withheld until the tile
/// is revealed or the game has ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileState {
    pub is_mine: Option<bool>,
    pub is_revealed: bool,
    pub is_flagged: bool,
    pub displayed_count: Option<i8>,
}

/// Immediate result of a reveal intent. Cascade batches, if any, follow
/// asynchronously on the event channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevealResult {
    /// The tile was already revealed or flagged, or the game has ended.
    Ignored,
    Revealed { count: i8, cascading: bool },
    Lost,
}

/// Immediate result of a flag intent. `flags_placed` is the total number
/// of standing flags; the engine never reports which of them are correct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagResult {
    /// The tile was already revealed, or the game has ended.
    Ignored,
    Toggled { flagged: bool, flags_placed: usize },
}
