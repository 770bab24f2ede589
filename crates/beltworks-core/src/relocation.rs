//! Relocation table: stable internal ids for unique-data instances.
//!
//! Tile layers own their unique data by value, so nothing outside the chunk
//! can hold a reference to it across ticks. Deferred entries and cross
//! references instead store a [`UniqueDataId`] and resolve it here to the
//! tile location currently holding that instance. A missing entry means the
//! instance was destroyed.

use crate::chunk::TileLayer;
use crate::coord::WorldCoord;
use crate::id::UniqueDataId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a unique-data instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileLocation {
    pub coord: WorldCoord,
    pub layer: TileLayer,
}

impl TileLocation {
    pub fn new(coord: WorldCoord, layer: TileLayer) -> Self {
        Self { coord, layer }
    }
}

/// Maps internal ids to the tile layer owning the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationTable {
    next_id: u32,
    entries: BTreeMap<UniqueDataId, TileLocation>,
}

impl RelocationTable {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }

    /// Hand out a fresh id. Ids are never reused until [`clear`](Self::clear).
    pub fn assign_id(&mut self) -> UniqueDataId {
        let id = UniqueDataId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Record (or move) the location of `id`.
    pub fn store_relocation_entry(&mut self, id: UniqueDataId, location: TileLocation) {
        self.entries.insert(id, location);
    }

    pub fn get(&self, id: UniqueDataId) -> Option<TileLocation> {
        self.entries.get(&id).copied()
    }

    pub fn contains(&self, id: UniqueDataId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Forget `id`. Returns its last location.
    pub fn remove(&mut self, id: UniqueDataId) -> Option<TileLocation> {
        self.entries.remove(&id)
    }

    /// Make sure future ids are greater than `id`. Used when instances are
    /// re-registered from serialized data.
    pub fn reserve_through(&mut self, id: UniqueDataId) {
        if id.0 >= self.next_id {
            self.next_id = id.0 + 1;
        }
    }

    /// The id the next [`assign_id`](Self::assign_id) call returns.
    pub fn next_id(&self) -> UniqueDataId {
        UniqueDataId(self.next_id)
    }

    /// Drop every entry and restart ids at 1.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_id = 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UniqueDataId, TileLocation)> + '_ {
        self.entries.iter().map(|(id, loc)| (*id, *loc))
    }
}

impl Default for RelocationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(x: i32) -> TileLocation {
        TileLocation::new(WorldCoord::new(x, 0), TileLayer::Entity)
    }

    #[test]
    fn ids_start_at_one() {
        let mut table = RelocationTable::new();
        assert_eq!(table.assign_id(), UniqueDataId(1));
        assert_eq!(table.assign_id(), UniqueDataId(2));
    }

    #[test]
    fn store_get_remove() {
        let mut table = RelocationTable::new();
        let id = table.assign_id();
        table.store_relocation_entry(id, loc(4));
        assert_eq!(table.get(id), Some(loc(4)));
        assert_eq!(table.remove(id), Some(loc(4)));
        assert!(table.get(id).is_none());
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let mut table = RelocationTable::new();
        let a = table.assign_id();
        table.store_relocation_entry(a, loc(0));
        table.remove(a);
        assert_ne!(table.assign_id(), a);
    }

    #[test]
    fn reserve_through_skips_loaded_ids() {
        let mut table = RelocationTable::new();
        table.reserve_through(UniqueDataId(9));
        assert_eq!(table.assign_id(), UniqueDataId(10));
        table.reserve_through(UniqueDataId(3));
        assert_eq!(table.assign_id(), UniqueDataId(11));
    }

    #[test]
    fn clear_restarts_numbering() {
        let mut table = RelocationTable::new();
        let id = table.assign_id();
        table.store_relocation_entry(id, loc(1));
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.assign_id(), UniqueDataId(1));
    }
}
