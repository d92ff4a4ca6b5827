use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::data::TileGrid;
use crate::error::{EngineError, Result};
use crate::model::{
    BoardEvent, FlagResult, GameConfig, Outcome, RevealResult, TileState, TileUpdate, TileView,
};

mod cascade;

/// One game lifecycle, and the only interface the presentation layer
/// talks to.
///
/// Intents (`reveal`, `toggle_flag`, `reset`) are serialized through a
/// single lock; the cascade worker shares the same lock and applies its
/// waves between intents, so the board only ever mutates on one control
/// path at a time. Subscribers receive every state change as
/// [`BoardEvent`] batches in mutation order.
#[derive(Debug)]
pub struct GameSession {
    state: Arc<Mutex<SessionState>>,
}

#[derive(Debug)]
struct SessionState {
    grid: TileGrid,
    config: GameConfig,
    correct_flags: usize,
    incorrect_flags: usize,
    outcome: Outcome,
    /// Bumped on every reset/restart; a cascade worker holding a stale
    /// stamp exits without touching the board or delivering a batch.
    generation: u64,
    cascade_active: bool,
    pending_seeds: Vec<usize>,
    subscribers: Vec<mpsc::UnboundedSender<BoardEvent>>,
}

impl SessionState {
    fn new(grid: TileGrid, config: GameConfig) -> Self {
        Self {
            grid,
            config,
            correct_flags: 0,
            incorrect_flags: 0,
            outcome: Outcome::Playing,
            generation: 0,
            cascade_active: false,
            pending_seeds: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    fn publish(&mut self, event: BoardEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn snapshot(&self) -> BoardEvent {
        let tiles = (0..self.grid.height())
            .map(|y| {
                (0..self.grid.width())
                    .map(|x| self.view(self.grid.id_at(x, y)))
                    .collect()
            })
            .collect();

        BoardEvent::Init {
            width: self.grid.width(),
            height: self.grid.height(),
            mine_count: self.grid.mine_count(),
            tiles,
            outcome: self.outcome,
        }
    }

    /// The tile as the presentation layer may see it, given the current
    /// outcome. Mines stay hidden until the game ends.
    fn view(&self, id: usize) -> TileView {
        let tile = self.grid.tile_at(id);
        match self.outcome {
            Outcome::Lost => {
                if tile.is_mine {
                    if tile.is_flagged {
                        TileView::FoundMine
                    } else {
                        TileView::Mine
                    }
                } else if tile.is_flagged {
                    TileView::WrongFlag
                } else if tile.is_revealed {
                    TileView::Revealed {
                        count: self.displayed_count(id),
                    }
                } else {
                    TileView::Hidden
                }
            }
            Outcome::Won if tile.is_mine => TileView::FoundMine,
            _ => {
                if tile.is_revealed {
                    TileView::Revealed {
                        count: self.displayed_count(id),
                    }
                } else if tile.is_flagged {
                    TileView::Flagged
                } else {
                    TileView::Hidden
                }
            }
        }
    }

    /// Count shown on a revealed tile: adjacent mines, minus the standing
    /// flags around it when live neighbor counts are on.
    fn displayed_count(&self, id: usize) -> i8 {
        let base = self.grid.tile_at(id).adjacent_mines as i8;
        if self.config.live_neighbor_count {
            let flagged = self
                .grid
                .neighbors(id)
                .into_iter()
                .filter(|&neighbor| self.grid.tile_at(neighbor).is_flagged)
                .count() as i8;
            base - flagged
        } else {
            base
        }
    }

    /// Mark one safe tile revealed and return its displayed count. The
    /// only reveal mutation path besides [`SessionState::lose`].
    fn apply_reveal(&mut self, id: usize) -> i8 {
        self.grid.tile_at_mut(id).is_revealed = true;
        self.displayed_count(id)
    }

    /// Terminal loss: expose every mine (flagged ones as found) and mark
    /// misplaced flags.
    fn lose(&mut self, updates: &mut Vec<TileUpdate>) {
        self.outcome = Outcome::Lost;

        for id in 0..self.grid.len() {
            let tile = self.grid.tile_at_mut(id);
            if tile.is_mine {
                tile.is_revealed = true;
            }
        }
        for id in 0..self.grid.len() {
            let tile = self.grid.tile_at(id);
            if tile.is_mine || tile.is_flagged {
                updates.push(TileUpdate {
                    id,
                    view: self.view(id),
                });
            }
        }
    }

    /// Flag-driven win condition. A board that generated with zero mines
    /// holds it vacuously from the start; the game is then won once every
    /// tile is revealed (see DESIGN.md on this corner).
    fn win_condition(&self) -> bool {
        let mine_count = self.grid.mine_count();
        self.correct_flags == mine_count
            && self.incorrect_flags == 0
            && (mine_count > 0
                || self
                    .grid
                    .tiles()
                    .all(|tile| tile.is_revealed || tile.is_mine))
    }

    /// Transition to `Won` when the condition holds, reporting every mine
    /// as found.
    fn check_win(&mut self, updates: &mut Vec<TileUpdate>) {
        if self.outcome != Outcome::Playing || !self.win_condition() {
            return;
        }

        self.outcome = Outcome::Won;
        info!("all mines flagged, game won");
        for id in 0..self.grid.len() {
            if self.grid.tile_at(id).is_mine {
                updates.push(TileUpdate {
                    id,
                    view: TileView::FoundMine,
                });
            }
        }
    }

    /// Swap in a fresh board. The generation bump cancels any in-flight
    /// cascade before the grid it was walking is discarded.
    fn replace(&mut self, grid: TileGrid, config: GameConfig) {
        self.generation = self.generation.wrapping_add(1);
        self.cascade_active = false;
        self.pending_seeds.clear();
        self.grid = grid;
        self.config = config;
        self.correct_flags = 0;
        self.incorrect_flags = 0;
        self.outcome = Outcome::Playing;

        info!(
            width = config.width,
            height = config.height,
            mines = self.grid.mine_count(),
            "board reset"
        );
        let snapshot = self.snapshot();
        self.publish(snapshot);
    }

    fn drain_seeds(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.pending_seeds)
    }

    fn flags_placed(&self) -> usize {
        self.correct_flags + self.incorrect_flags
    }
}

impl GameSession {
    /// Generate a fresh board from `config` and start a game on it.
    #[instrument(level = "trace")]
    pub fn new(config: GameConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = rand::rng();
        let grid =
            TileGrid::generate(config.width, config.height, config.mine_probability, &mut rng)?;
        Ok(Self::assemble(grid, config))
    }

    /// Start a game on a predetermined board, for scripted layouts. The
    /// config still drives the rules and any later [`reset`](Self::reset).
    pub fn from_grid(grid: TileGrid, config: GameConfig) -> Result<Self> {
        config.validate()?;
        if grid.width() != config.width || grid.height() != config.height {
            return Err(EngineError::DimensionMismatch {
                config_width: config.width,
                config_height: config.height,
                grid_width: grid.width(),
                grid_height: grid.height(),
            });
        }
        Ok(Self::assemble(grid, config))
    }

    fn assemble(grid: TileGrid, config: GameConfig) -> Self {
        info!(
            "new game: {}x{} with {} mines",
            grid.width(),
            grid.height(),
            grid.mine_count()
        );
        Self {
            state: Arc::new(Mutex::new(SessionState::new(grid, config))),
        }
    }

    /// Register an observer. The receiver is primed with an `Init`
    /// snapshot and then sees every state change in mutation order.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<BoardEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        let _ = sender.send(state.snapshot());
        state.subscribers.push(sender);
        receiver
    }

    /// Reveal one tile.
    ///
    /// Returns the immediate result; when the tile has no adjacent mines
    /// and cascading is enabled, the connected zero region follows
    /// asynchronously as one `Update` batch per wave.
    #[instrument(level = "trace", skip(self))]
    pub async fn reveal(&self, id: usize) -> Result<RevealResult> {
        let mut state = self.state.lock().await;
        state.grid.check_id(id)?;

        if state.outcome != Outcome::Playing {
            debug!(id, "reveal ignored, game already over");
            return Ok(RevealResult::Ignored);
        }

        let tile = state.grid.tile_at(id);
        let (is_revealed, is_flagged, is_mine) = (tile.is_revealed, tile.is_flagged, tile.is_mine);

        if is_revealed || is_flagged {
            debug!(id, "reveal ignored on revealed or flagged tile");
            return Ok(RevealResult::Ignored);
        }

        if is_mine {
            warn!(id, "mine hit, game over");
            let mut updates = Vec::new();
            state.lose(&mut updates);
            let outcome = state.outcome;
            state.publish(BoardEvent::Update { updates, outcome });
            return Ok(RevealResult::Lost);
        }

        let count = state.apply_reveal(id);
        debug!(id, count, "tile revealed");

        let mut updates = vec![TileUpdate {
            id,
            view: TileView::Revealed { count },
        }];
        state.check_win(&mut updates);
        let outcome = state.outcome;
        state.publish(BoardEvent::Update { updates, outcome });

        let cascading = count == 0 && state.config.cascade_enabled && outcome == Outcome::Playing;
        if cascading {
            self.push_seeds(&mut state, vec![id]);
        }

        Ok(RevealResult::Revealed { count, cascading })
    }

    /// Toggle the flag on one hidden tile and re-check the win condition.
    ///
    /// With live neighbor counts on, every revealed neighbor gets its
    /// displayed count recomputed in the same batch; neighbors dropping
    /// to zero become fresh cascade seeds.
    #[instrument(level = "trace", skip(self))]
    pub async fn toggle_flag(&self, id: usize) -> Result<FlagResult> {
        let mut state = self.state.lock().await;
        state.grid.check_id(id)?;

        if state.outcome != Outcome::Playing {
            debug!(id, "flag ignored, game already over");
            return Ok(FlagResult::Ignored);
        }
        if state.grid.tile_at(id).is_revealed {
            debug!(id, "flag ignored on revealed tile");
            return Ok(FlagResult::Ignored);
        }

        let tile = state.grid.tile_at_mut(id);
        tile.is_flagged = !tile.is_flagged;
        let flagged = tile.is_flagged;
        let is_mine = tile.is_mine;

        match (is_mine, flagged) {
            (true, true) => state.correct_flags += 1,
            (true, false) => state.correct_flags -= 1,
            (false, true) => state.incorrect_flags += 1,
            (false, false) => state.incorrect_flags -= 1,
        }
        debug!(id, flagged, "flag toggled");

        let mut updates = vec![TileUpdate {
            id,
            view: state.view(id),
        }];
        let mut seeds = Vec::new();

        if state.config.live_neighbor_count {
            for neighbor in state.grid.neighbors(id) {
                if !state.grid.tile_at(neighbor).is_revealed {
                    continue;
                }
                let count = state.displayed_count(neighbor);
                updates.push(TileUpdate {
                    id: neighbor,
                    view: TileView::Revealed { count },
                });
                if count == 0 && state.config.cascade_enabled {
                    seeds.push(neighbor);
                }
            }
        }

        state.check_win(&mut updates);
        let outcome = state.outcome;
        state.publish(BoardEvent::Update { updates, outcome });

        if outcome == Outcome::Playing && !seeds.is_empty() {
            self.push_seeds(&mut state, seeds);
        }

        Ok(FlagResult::Toggled {
            flagged,
            flags_placed: state.flags_placed(),
        })
    }

    /// Discard the board and start over with the current config. Cancels
    /// any in-flight cascade; subscribers receive a fresh `Init`.
    #[instrument(level = "trace", skip(self))]
    pub async fn reset(&self) -> Result<()> {
        let config = {
            let state = self.state.lock().await;
            state.config
        };
        self.restart(config).await
    }

    /// As [`reset`](Self::reset), with new parameters.
    #[instrument(level = "trace", skip(self))]
    pub async fn restart(&self, config: GameConfig) -> Result<()> {
        config.validate()?;
        let mut rng = rand::rng();
        let grid =
            TileGrid::generate(config.width, config.height, config.mine_probability, &mut rng)?;

        let mut state = self.state.lock().await;
        state.replace(grid, config);
        Ok(())
    }

    /// Query one tile. `is_mine` is withheld while the tile is hidden and
    /// the game is still running.
    pub async fn tile_state(&self, id: usize) -> Result<TileState> {
        let state = self.state.lock().await;
        state.grid.check_id(id)?;

        let tile = state.grid.tile_at(id);
        let terminal = state.outcome != Outcome::Playing;

        Ok(TileState {
            is_mine: (tile.is_revealed || terminal).then_some(tile.is_mine),
            is_revealed: tile.is_revealed,
            is_flagged: tile.is_flagged,
            displayed_count: (tile.is_revealed && !tile.is_mine)
                .then(|| state.displayed_count(id)),
        })
    }

    pub async fn outcome(&self) -> Outcome {
        self.state.lock().await.outcome
    }

    /// Total mines on the current board, recomputed from the grid.
    pub async fn mine_count(&self) -> usize {
        self.state.lock().await.grid.mine_count()
    }

    /// Number of standing flags, right or wrong.
    pub async fn flags_placed(&self) -> usize {
        self.state.lock().await.flags_placed()
    }

    /// Queue cascade seeds, merging into the active worker when one is
    /// already walking this board.
    fn push_seeds(&self, state: &mut SessionState, seeds: Vec<usize>) {
        state.pending_seeds.extend(seeds);
        if state.cascade_active {
            debug!("seeds merged into active cascade");
            return;
        }

        state.cascade_active = true;
        debug!("cascade worker started");
        tokio::spawn(cascade::run(Arc::clone(&self.state), state.generation));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(len: usize, mines: &[usize]) -> Vec<bool> {
        let mut mask = vec![false; len];
        for &id in mines {
            mask[id] = true;
        }
        mask
    }

    fn fixed_session(config: GameConfig, mines: &[usize]) -> GameSession {
        let tiles = config.width * config.height;
        let grid = TileGrid::from_mines(config.width, config.height, &mask(tiles, mines)).unwrap();
        GameSession::from_grid(grid, config).unwrap()
    }

    fn quiet_config(width: usize, height: usize) -> GameConfig {
        GameConfig {
            width,
            height,
            mine_probability: 0.0,
            cascade_enabled: false,
            live_neighbor_count: false,
            propagation_delay: None,
        }
    }

    #[tokio::test]
    async fn reveal_is_idempotent() {
        let session = fixed_session(quiet_config(3, 3), &[4]);

        assert_eq!(
            session.reveal(0).await.unwrap(),
            RevealResult::Revealed {
                count: 1,
                cascading: false
            }
        );
        assert_eq!(session.reveal(0).await.unwrap(), RevealResult::Ignored);
        assert_eq!(session.outcome().await, Outcome::Playing);
        assert_eq!(session.flags_placed().await, 0);
    }

    #[tokio::test]
    async fn flagged_tiles_reject_reveal() {
        let session = fixed_session(quiet_config(3, 3), &[4]);

        session.toggle_flag(0).await.unwrap();
        assert_eq!(session.reveal(0).await.unwrap(), RevealResult::Ignored);

        session.toggle_flag(0).await.unwrap();
        assert_eq!(
            session.reveal(0).await.unwrap(),
            RevealResult::Revealed {
                count: 1,
                cascading: false
            }
        );
    }

    #[tokio::test]
    async fn out_of_range_ids_are_errors_not_noops() {
        let session = fixed_session(quiet_config(2, 2), &[]);
        let expected = EngineError::TileOutOfRange {
            id: 9,
            width: 2,
            height: 2,
        };

        assert_eq!(session.reveal(9).await.unwrap_err(), expected);
        assert_eq!(session.toggle_flag(9).await.unwrap_err(), expected);
        assert_eq!(session.tile_state(9).await.unwrap_err(), expected);
    }

    #[tokio::test]
    async fn terminal_board_freezes_all_intents() {
        let session = fixed_session(quiet_config(2, 2), &[0]);

        assert_eq!(session.reveal(0).await.unwrap(), RevealResult::Lost);
        assert_eq!(session.outcome().await, Outcome::Lost);

        assert_eq!(session.reveal(1).await.unwrap(), RevealResult::Ignored);
        assert_eq!(session.toggle_flag(1).await.unwrap(), FlagResult::Ignored);
        assert!(!session.tile_state(1).await.unwrap().is_revealed);
    }

    #[tokio::test]
    async fn loss_exposes_mines_found_mines_and_wrong_flags() {
        let session = fixed_session(quiet_config(2, 2), &[0, 3]);
        let mut events = session.subscribe().await;
        let _ = events.recv().await;

        session.toggle_flag(0).await.unwrap(); // correct flag
        session.toggle_flag(1).await.unwrap(); // wrong flag
        let _ = events.recv().await;
        let _ = events.recv().await;

        assert_eq!(session.reveal(3).await.unwrap(), RevealResult::Lost);

        let Some(BoardEvent::Update { updates, outcome }) = events.recv().await else {
            panic!("expected a loss batch");
        };
        assert_eq!(outcome, Outcome::Lost);
        let view_of = |id: usize| {
            updates
                .iter()
                .find(|update| update.id == id)
                .map(|update| update.view)
        };
        assert_eq!(view_of(0), Some(TileView::FoundMine));
        assert_eq!(view_of(3), Some(TileView::Mine));
        assert_eq!(view_of(1), Some(TileView::WrongFlag));

        assert_eq!(session.tile_state(3).await.unwrap().is_mine, Some(true));
        assert_eq!(session.tile_state(2).await.unwrap().is_mine, Some(false));
    }

    #[tokio::test]
    async fn win_requires_exact_flags_and_no_wrong_ones() {
        let session = fixed_session(quiet_config(2, 2), &[0]);

        // Wrong flag blocks the win even once the mine is flagged too.
        session.toggle_flag(1).await.unwrap();
        session.toggle_flag(0).await.unwrap();
        assert_eq!(session.outcome().await, Outcome::Playing);

        // Retracting the wrong flag completes the condition.
        let result = session.toggle_flag(1).await.unwrap();
        assert_eq!(
            result,
            FlagResult::Toggled {
                flagged: false,
                flags_placed: 1
            }
        );
        assert_eq!(session.outcome().await, Outcome::Won);
    }

    #[tokio::test]
    async fn live_neighbor_count_subtracts_standing_flags() {
        let config = GameConfig {
            live_neighbor_count: true,
            ..quiet_config(3, 3)
        };
        let session = fixed_session(config, &[4, 8]);

        // Tile 1 touches one mine (4).
        assert_eq!(
            session.reveal(1).await.unwrap(),
            RevealResult::Revealed {
                count: 1,
                cascading: false
            }
        );

        let mut events = session.subscribe().await;
        let _ = events.recv().await;

        // Flagging a neighbor drops the displayed count to zero...
        session.toggle_flag(4).await.unwrap();
        let Some(BoardEvent::Update { updates, .. }) = events.recv().await else {
            panic!("expected a flag batch");
        };
        assert!(updates.contains(&TileUpdate {
            id: 1,
            view: TileView::Revealed { count: 0 }
        }));

        // ...and over-flagging pushes it negative.
        session.toggle_flag(0).await.unwrap();
        assert_eq!(
            session.tile_state(1).await.unwrap().displayed_count,
            Some(-1)
        );

        // Retracting the flags restores the cached count.
        session.toggle_flag(0).await.unwrap();
        session.toggle_flag(4).await.unwrap();
        assert_eq!(
            session.tile_state(1).await.unwrap().displayed_count,
            Some(1)
        );
    }

    #[tokio::test]
    async fn tile_state_withholds_mines_while_playing() {
        let session = fixed_session(quiet_config(2, 2), &[0]);

        assert_eq!(session.tile_state(0).await.unwrap().is_mine, None);
        assert_eq!(session.tile_state(1).await.unwrap().is_mine, None);

        session.reveal(1).await.unwrap();
        assert_eq!(session.tile_state(1).await.unwrap().is_mine, Some(false));
        assert_eq!(session.tile_state(0).await.unwrap().is_mine, None);
    }

    #[tokio::test]
    async fn from_grid_rejects_mismatched_config() {
        let grid = TileGrid::from_mines(2, 2, &mask(4, &[])).unwrap();
        let err = GameSession::from_grid(grid, quiet_config(3, 3)).unwrap_err();
        assert_eq!(
            err,
            EngineError::DimensionMismatch {
                config_width: 3,
                config_height: 3,
                grid_width: 2,
                grid_height: 2,
            }
        );
    }

    #[tokio::test]
    async fn snapshot_hides_unrevealed_mines() {
        let session = fixed_session(quiet_config(2, 2), &[0]);
        let mut events = session.subscribe().await;

        let Some(BoardEvent::Init {
            width,
            height,
            mine_count,
            tiles,
            outcome,
        }) = events.recv().await
        else {
            panic!("expected the priming snapshot");
        };

        assert_eq!((width, height, mine_count), (2, 2, 1));
        assert_eq!(outcome, Outcome::Playing);
        assert!(
            tiles
                .iter()
                .flatten()
                .all(|view| *view == TileView::Hidden)
        );
    }
}
