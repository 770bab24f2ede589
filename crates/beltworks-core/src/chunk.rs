//! Chunks, tiles and tile layers.

use crate::coord::{CHUNK_AREA, ChunkCoord, LocalCoord, local_to_world};
use crate::id::{PrototypeId, UniqueDataId};
use crate::relocation::{RelocationTable, TileLocation};
use crate::unique::{UniqueData, UniqueVariant};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TileLayer
// ---------------------------------------------------------------------------

/// One of the stacked slots of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TileLayer {
    /// Terrain.
    Base,
    Resource,
    Entity,
    Overlay,
}

impl TileLayer {
    pub const COUNT: usize = 4;

    pub const ALL: [TileLayer; Self::COUNT] = [
        TileLayer::Base,
        TileLayer::Resource,
        TileLayer::Entity,
        TileLayer::Overlay,
    ];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            TileLayer::Base => 0,
            TileLayer::Resource => 1,
            TileLayer::Entity => 2,
            TileLayer::Overlay => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// ChunkTileLayer
// ---------------------------------------------------------------------------

/// A prototype reference plus the unique data of the instance placed there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkTileLayer {
    pub prototype: Option<PrototypeId>,
    unique: Option<UniqueData>,
}

impl ChunkTileLayer {
    pub fn new(prototype: Option<PrototypeId>) -> Self {
        Self {
            prototype,
            unique: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prototype.is_none() && self.unique.is_none()
    }

    pub fn unique(&self) -> Option<&UniqueData> {
        self.unique.as_ref()
    }

    pub fn unique_mut(&mut self) -> Option<&mut UniqueData> {
        self.unique.as_mut()
    }

    /// Internal id of the owned instance, if any.
    pub fn unique_id(&self) -> Option<UniqueDataId> {
        self.unique.as_ref().and_then(|u| u.internal_id)
    }

    /// Replace the owned instance with `data`, assign it a fresh internal id
    /// and register that id at `location`. The previous instance (if any) is
    /// dropped and unregistered.
    pub fn make_unique_data<T: UniqueVariant>(
        &mut self,
        data: T,
        relocation: &mut RelocationTable,
        location: TileLocation,
    ) -> UniqueDataId {
        self.drop_unique(relocation);

        let id = relocation.assign_id();
        relocation.store_relocation_entry(id, location);
        self.unique = Some(UniqueData {
            internal_id: Some(id),
            value: data.into_value(),
        });
        id
    }

    /// Typed view of the owned instance; `None` if absent or of another kind.
    pub fn get_unique_data<T: UniqueVariant>(&self) -> Option<&T> {
        self.unique.as_ref().and_then(|u| u.get::<T>())
    }

    pub fn get_unique_data_mut<T: UniqueVariant>(&mut self) -> Option<&mut T> {
        self.unique.as_mut().and_then(|u| u.get_mut::<T>())
    }

    /// Drop the owned instance and unregister it. The prototype stays.
    pub fn drop_unique(&mut self, relocation: &mut RelocationTable) {
        if let Some(old) = self.unique.take()
            && let Some(id) = old.internal_id
        {
            relocation.remove(id);
        }
    }

    /// Drop owned unique data and the prototype reference.
    pub fn clear(&mut self, relocation: &mut RelocationTable) {
        self.drop_unique(relocation);
        self.prototype = None;
    }
}

// ---------------------------------------------------------------------------
// ChunkTile
// ---------------------------------------------------------------------------

/// The stacked layers at one tile position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkTile {
    layers: [ChunkTileLayer; TileLayer::COUNT],
}

impl ChunkTile {
    pub fn layer(&self, layer: TileLayer) -> &ChunkTileLayer {
        &self.layers[layer.index()]
    }

    pub fn layer_mut(&mut self, layer: TileLayer) -> &mut ChunkTileLayer {
        &mut self.layers[layer.index()]
    }

    pub fn prototype(&self, layer: TileLayer) -> Option<PrototypeId> {
        self.layer(layer).prototype
    }

    pub fn layers(&self) -> impl Iterator<Item = (TileLayer, &ChunkTileLayer)> {
        TileLayer::ALL.into_iter().zip(self.layers.iter())
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A square block of `CHUNK_EDGE x CHUNK_EDGE` tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    coord: ChunkCoord,
    tiles: Vec<ChunkTile>,
}

impl Chunk {
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            tiles: vec![ChunkTile::default(); CHUNK_AREA],
        }
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn tile(&self, local: LocalCoord) -> &ChunkTile {
        &self.tiles[local.index()]
    }

    pub fn tile_mut(&mut self, local: LocalCoord) -> &mut ChunkTile {
        &mut self.tiles[local.index()]
    }

    /// Tiles in row-major order with their local coordinate.
    pub fn tiles(&self) -> impl Iterator<Item = (LocalCoord, &ChunkTile)> {
        self.tiles
            .iter()
            .enumerate()
            .map(|(i, t)| (LocalCoord::from_index(i), t))
    }

    pub(crate) fn tiles_mut(&mut self) -> impl Iterator<Item = (LocalCoord, &mut ChunkTile)> {
        self.tiles
            .iter_mut()
            .enumerate()
            .map(|(i, t)| (LocalCoord::from_index(i), t))
    }

    /// Register every owned unique-data id with `relocation` at its tile.
    /// Returns how many ids were registered.
    pub fn register_unique_ids(&self, relocation: &mut RelocationTable) -> usize {
        let mut count = 0;
        for (local, tile) in self.tiles() {
            for (layer, tile_layer) in tile.layers() {
                if let Some(id) = tile_layer.unique_id() {
                    let coord = local_to_world(self.coord, local);
                    relocation.store_relocation_entry(id, TileLocation::new(coord, layer));
                    relocation.reserve_through(id);
                    count += 1;
                }
            }
        }
        count
    }

    /// Clear every tile layer, unregistering owned unique data.
    pub fn clear(&mut self, relocation: &mut RelocationTable) {
        for tile in &mut self.tiles {
            for layer in TileLayer::ALL {
                tile.layer_mut(layer).clear(relocation);
            }
        }
    }
}
