//! World, chunk and local coordinates.
//!
//! The world is an unbounded grid of tiles partitioned into square chunks of
//! [`CHUNK_EDGE`] tiles. Conversions floor toward negative infinity so that
//! world x = -1 lives in chunk -1 at local x = 31.

use serde::{Deserialize, Serialize};

/// Edge length of a chunk, in tiles.
pub const CHUNK_EDGE: i32 = 32;

/// Tiles per chunk.
pub const CHUNK_AREA: usize = (CHUNK_EDGE * CHUNK_EDGE) as usize;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A tile position in absolute world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldCoord {
    pub x: i32,
    pub y: i32,
}

/// A chunk position. One unit is [`CHUNK_EDGE`] tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
}

/// A tile position inside a chunk, both axes in `[0, CHUNK_EDGE)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalCoord {
    pub x: u8,
    pub y: u8,
}

/// Cardinal orientation of a placed entity. `Up` is toward negative y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Up,
    Right,
    Down,
    Left,
}

// ---------------------------------------------------------------------------
// WorldCoord
// ---------------------------------------------------------------------------

impl WorldCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The coordinate `distance` tiles away in `orientation`. Negative
    /// distances step backward.
    pub fn incremented(self, orientation: Orientation, distance: i32) -> Self {
        let (dx, dy) = orientation.offset();
        Self {
            x: self.x + dx * distance,
            y: self.y + dy * distance,
        }
    }

    /// Chebyshev (chessboard) distance to another position.
    pub fn chebyshev_distance(&self, other: &WorldCoord) -> u32 {
        (self.x - other.x)
            .unsigned_abs()
            .max((self.y - other.y).unsigned_abs())
    }
}

impl ChunkCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl LocalCoord {
    pub fn new(x: u8, y: u8) -> Self {
        debug_assert!(i32::from(x) < CHUNK_EDGE && i32::from(y) < CHUNK_EDGE);
        Self { x, y }
    }

    /// Row-major index into a chunk's tile array.
    #[inline]
    pub fn index(self) -> usize {
        usize::from(self.y) * CHUNK_EDGE as usize + usize::from(self.x)
    }

    /// Inverse of [`LocalCoord::index`].
    #[inline]
    pub fn from_index(index: usize) -> Self {
        let edge = CHUNK_EDGE as usize;
        Self {
            x: (index % edge) as u8,
            y: (index / edge) as u8,
        }
    }
}

// ---------------------------------------------------------------------------
// Orientation
// ---------------------------------------------------------------------------

impl Orientation {
    /// All four orientations, clockwise from `Up`.
    pub fn all() -> [Orientation; 4] {
        [
            Orientation::Up,
            Orientation::Right,
            Orientation::Down,
            Orientation::Left,
        ]
    }

    /// Unit (dx, dy) step.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Orientation::Up => (0, -1),
            Orientation::Right => (1, 0),
            Orientation::Down => (0, 1),
            Orientation::Left => (-1, 0),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Orientation::Up => Orientation::Down,
            Orientation::Right => Orientation::Left,
            Orientation::Down => Orientation::Up,
            Orientation::Left => Orientation::Right,
        }
    }

    pub fn rotate_cw(self) -> Self {
        match self {
            Orientation::Up => Orientation::Right,
            Orientation::Right => Orientation::Down,
            Orientation::Down => Orientation::Left,
            Orientation::Left => Orientation::Up,
        }
    }

    pub fn rotate_ccw(self) -> Self {
        self.rotate_cw().opposite()
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Split a world coordinate into its chunk and the tile within that chunk.
pub fn world_to_chunk(coord: WorldCoord) -> (ChunkCoord, LocalCoord) {
    let chunk = ChunkCoord {
        x: coord.x.div_euclid(CHUNK_EDGE),
        y: coord.y.div_euclid(CHUNK_EDGE),
    };
    let local = LocalCoord {
        x: coord.x.rem_euclid(CHUNK_EDGE) as u8,
        y: coord.y.rem_euclid(CHUNK_EDGE) as u8,
    };
    (chunk, local)
}

/// World coordinate of a chunk's local (0, 0) tile.
pub fn chunk_to_world_origin(chunk: ChunkCoord) -> WorldCoord {
    WorldCoord {
        x: chunk.x * CHUNK_EDGE,
        y: chunk.y * CHUNK_EDGE,
    }
}

/// World coordinate of a tile inside a chunk.
pub fn local_to_world(chunk: ChunkCoord, local: LocalCoord) -> WorldCoord {
    let origin = chunk_to_world_origin(chunk);
    WorldCoord {
        x: origin.x + i32::from(local.x),
        y: origin.y + i32::from(local.y),
    }
}
