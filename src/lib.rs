//! Core rules engine for a minesweeper-style puzzle game.
//!
//! The engine owns the board and the full rule set: per-tile Bernoulli
//! mine generation, reveal cascades over zero-count regions, flag
//! accounting and win/loss detection. A presentation layer drives it
//! through [`GameSession`] intents and renders the [`BoardEvent`] batches
//! it emits; cascades arrive asynchronously, one batch per wave.
//!
//! ```rust,no_run
//! use minesweeper_engine::{BoardEvent, GameConfig, GameSession};
//!
//! #[tokio::main]
//! async fn main() -> minesweeper_engine::Result<()> {
//!     let session = GameSession::new(GameConfig::default())?;
//!     let mut events = session.subscribe().await;
//!
//!     session.reveal(0).await?;
//!     session.toggle_flag(1).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let BoardEvent::Update { updates, outcome } = event {
//!             println!("{} tiles changed, outcome: {:?}", updates.len(), outcome);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod error;
pub mod logic;
pub mod model;

pub use data::{Tile, TileGrid};
pub use error::{EngineError, Result};
pub use logic::GameSession;
pub use model::{
    BoardEvent, FlagResult, GameConfig, Outcome, RevealResult, TileState, TileUpdate, TileView,
};
