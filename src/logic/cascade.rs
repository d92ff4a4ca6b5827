//! Breadth-first cascade over zero-count regions.
//!
//! The worker never recurses: it expands one wave at a time from a
//! frontier of already-revealed zero-count tiles, applies the wave to the
//! grid and publishes it as a single batch before the next wave's
//! neighbor reads run. All of that happens under the session lock, so
//! intents interleave only at wave boundaries and at most one worker
//! walks a given board (later seeds are merged through `pending_seeds`).

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::SessionState;
use crate::model::{BoardEvent, Outcome, TileUpdate, TileView};

pub(super) async fn run(state: Arc<Mutex<SessionState>>, generation: u64) {
    let mut frontier: Vec<usize> = Vec::new();
    let mut waves = 0usize;

    loop {
        let delay = {
            let mut state = state.lock().await;

            // A reset replaced the board this worker was walking. The new
            // board's bookkeeping is not ours to touch; drop everything.
            if state.generation != generation {
                debug!("cascade cancelled by reset");
                return;
            }
            if state.outcome != Outcome::Playing {
                state.cascade_active = false;
                return;
            }

            frontier.extend(state.drain_seeds());
            if frontier.is_empty() {
                state.cascade_active = false;
                debug!(waves, "cascade finished");
                return;
            }

            // Candidates for this wave: hidden, unflagged neighbors of the
            // frontier. Revealed tiles only ever shrink the candidate set,
            // which bounds the number of waves.
            let mut candidates = BTreeSet::new();
            for &id in &frontier {
                for neighbor in state.grid.neighbors(id) {
                    let tile = state.grid.tile_at(neighbor);
                    if !tile.is_revealed && !tile.is_flagged {
                        candidates.insert(neighbor);
                    }
                }
            }
            frontier.clear();

            // Seeds are only ever zero-count tiles, so a mine here means
            // the board state was mutated out from under us. No safe
            // recovery; end the game.
            if let Some(&mine) = candidates
                .iter()
                .find(|&&id| state.grid.tile_at(id).is_mine)
            {
                warn!(id = mine, "cascade reached a mine, forcing a loss");
                let mut updates = Vec::new();
                state.lose(&mut updates);
                let outcome = state.outcome;
                state.publish(BoardEvent::Update { updates, outcome });
                state.cascade_active = false;
                return;
            }

            let mut updates = Vec::with_capacity(candidates.len());
            for id in candidates {
                let count = state.apply_reveal(id);
                updates.push(TileUpdate {
                    id,
                    view: TileView::Revealed { count },
                });
                if count == 0 {
                    frontier.push(id);
                }
            }

            if !updates.is_empty() {
                waves += 1;
                state.check_win(&mut updates);
                let outcome = state.outcome;
                state.publish(BoardEvent::Update { updates, outcome });
                if outcome != Outcome::Playing {
                    state.cascade_active = false;
                    return;
                }
            }

            state.config.propagation_delay
        };

        // Visual pacing only; correctness never depends on this.
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}
