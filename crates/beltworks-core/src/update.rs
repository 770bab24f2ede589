//! Tile-update listeners.
//!
//! An entity that depends on what sits on other tiles (an inserter's pickup
//! and drop-off, a drill's output and deposits) registers its
//! [`UniqueDataId`] on those tiles. [`World::build`](crate::world::World::build),
//! [`World::remove`](crate::world::World::remove) and resource placement
//! then notify the listeners of the tile, so idle entities are woken
//! instead of polling. Listeners whose instance is gone are pruned when the
//! tile next emits.

use crate::chunk::TileLayer;
use crate::coord::WorldCoord;
use crate::id::UniqueDataId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileUpdate {
    Placed,
    Removed,
}

/// What happened, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileEvent {
    pub coord: WorldCoord,
    pub layer: TileLayer,
    pub update: TileUpdate,
}

/// Emitter tile to the instances listening on it, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDispatcher {
    listeners: BTreeMap<WorldCoord, Vec<UniqueDataId>>,
}

impl UpdateDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen on `emitter`. Registering twice is a no-op.
    pub fn register(&mut self, emitter: WorldCoord, listener: UniqueDataId) {
        let list = self.listeners.entry(emitter).or_default();
        if !list.contains(&listener) {
            list.push(listener);
        }
    }

    /// Stop listening on `emitter`. Returns whether `listener` was registered.
    pub fn unregister(&mut self, emitter: WorldCoord, listener: UniqueDataId) -> bool {
        let Some(list) = self.listeners.get_mut(&emitter) else {
            return false;
        };
        let before = list.len();
        list.retain(|&l| l != listener);
        let removed = list.len() != before;
        if list.is_empty() {
            self.listeners.remove(&emitter);
        }
        removed
    }

    pub fn listeners(&self, emitter: WorldCoord) -> &[UniqueDataId] {
        self.listeners.get(&emitter).map_or(&[], Vec::as_slice)
    }

    /// Number of (emitter, listener) registrations.
    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Every registration, emitters in coordinate order.
    pub fn iter(&self) -> impl Iterator<Item = (WorldCoord, UniqueDataId)> + '_ {
        self.listeners
            .iter()
            .flat_map(|(&emitter, list)| list.iter().map(move |&l| (emitter, l)))
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
