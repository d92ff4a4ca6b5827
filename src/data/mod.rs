use rand::Rng;

use crate::error::{EngineError, Result};

/// One cell of the board. Owned exclusively by [`TileGrid`]; the rest of
/// the crate reads it through grid accessors and mutates it only from the
/// session's locked apply paths.
#[derive(Clone, Debug)]
pub struct Tile {
    pub is_mine: bool,
    /// Cached at generation; the grid's mine layout never changes after.
    pub adjacent_mines: u8,
    pub is_revealed: bool,
    pub is_flagged: bool,
}

/// The mutable board state: `width * height` tiles in id order, where
/// `id = y * width + x`.
#[derive(Clone, Debug)]
pub struct TileGrid {
    width: usize,
    height: usize,
    tiles: Vec<Tile>,
}

fn count_adjacent_mines(mines: &[bool], id: usize, width: usize, height: usize) -> u8 {
    let x = (id % width) as isize;
    let y = (id / width) as isize;
    let mut count = 0;

    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }

            let nx = x + dx;
            let ny = y + dy;

            if nx >= 0 && ny >= 0 && (nx as usize) < width && (ny as usize) < height {
                let adj = nx as usize + ny as usize * width;
                if mines[adj] {
                    count += 1;
                }
            }
        }
    }

    count
}

impl TileGrid {
    /// Populate a fresh board: one independent Bernoulli trial per tile.
    ///
    /// The realized mine count is a random outcome, not an input; it can
    /// be zero or cover the whole board.
    pub fn generate<R: Rng + ?Sized>(
        width: usize,
        height: usize,
        mine_probability: f64,
        rng: &mut R,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidDimensions { width, height });
        }
        if !mine_probability.is_finite() || !(0.0..=1.0).contains(&mine_probability) {
            return Err(EngineError::InvalidMineProbability(mine_probability));
        }

        let mines: Vec<bool> = (0..width * height)
            .map(|_| rng.random_bool(mine_probability))
            .collect();

        Ok(Self::with_mines(width, height, mines))
    }

    /// Build a board from a predetermined mine layout, id order.
    pub fn from_mines(width: usize, height: usize, mines: &[bool]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidDimensions { width, height });
        }
        if mines.len() != width * height {
            return Err(EngineError::GridMaskMismatch {
                expected: width * height,
                got: mines.len(),
            });
        }

        Ok(Self::with_mines(width, height, mines.to_vec()))
    }

    fn with_mines(width: usize, height: usize, mines: Vec<bool>) -> Self {
        let tiles = mines
            .iter()
            .enumerate()
            .map(|(id, &is_mine)| Tile {
                is_mine,
                adjacent_mines: count_adjacent_mines(&mines, id, width, height),
                is_revealed: false,
                is_flagged: false,
            })
            .collect();

        Self {
            width,
            height,
            tiles,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Bounds check an id, echoing it back for chaining.
    pub fn check_id(&self, id: usize) -> Result<usize> {
        if id < self.tiles.len() {
            Ok(id)
        } else {
            Err(EngineError::TileOutOfRange {
                id,
                width: self.width,
                height: self.height,
            })
        }
    }

    pub fn tile(&self, id: usize) -> Result<&Tile> {
        self.check_id(id).map(|id| &self.tiles[id])
    }

    pub(crate) fn tile_at(&self, id: usize) -> &Tile {
        &self.tiles[id]
    }

    pub(crate) fn tile_at_mut(&mut self, id: usize) -> &mut Tile {
        &mut self.tiles[id]
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    pub fn coords(&self, id: usize) -> (usize, usize) {
        (id % self.width, id / self.width)
    }

    pub fn id_at(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Ids of the Moore neighborhood of `id`, clipped at the board edges:
    /// 3 for a corner, 5 for an edge, 8 for an interior tile. `id` itself
    /// is never included.
    pub fn neighbors(&self, id: usize) -> Vec<usize> {
        debug_assert!(id < self.tiles.len());

        let x = (id % self.width) as isize;
        let y = (id / self.width) as isize;
        let mut ids = Vec::with_capacity(8);

        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }

                let nx = x + dx;
                let ny = y + dy;

                if nx >= 0 && ny >= 0 && (nx as usize) < self.width && (ny as usize) < self.height {
                    ids.push(nx as usize + ny as usize * self.width);
                }
            }
        }

        ids
    }

    /// Total mines, recomputed from the tiles on every call rather than
    /// tracked in a separate counter.
    pub fn mine_count(&self) -> usize {
        self.tiles.iter().filter(|tile| tile.is_mine).count()
    }
}
