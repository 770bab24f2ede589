//! Serialization and state hashing.
//!
//! Chunks and whole worlds serialize to binary blobs via `bitcode` behind a
//! versioned header. Unique data is written with its internal id; on load
//! every id is re-registered with the relocation table at the tile it was
//! read from, so deferred entries and tile listeners saved alongside
//! resolve to the same instances.
//!
//! Per-subsystem hashes support desync debugging between two worlds that
//! should be in lockstep.

use crate::chunk::{Chunk, TileLayer};
use crate::coord::local_to_world;
use crate::deferral::DeferralTimer;
use crate::id::UniqueDataId;
use crate::prototype::Prototypes;
use crate::relocation::RelocationTable;
use crate::sim::{SimState, SimulationStrategy, StateHash};
use crate::transport::TransportLines;
use crate::unique::BeltData;
use crate::update::UpdateDispatcher;
use crate::world::{World, WorldConfig};
use crate::worldgen::{WorldGenConfig, WorldGenQueue};
use log::{info, warn};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a world snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0xBE17_0001;

/// Magic number identifying a single serialized chunk.
pub const CHUNK_MAGIC: u32 = 0xBE17_0002;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 2;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{expected:08X}, got 0x{got:08X}")]
    InvalidMagic { expected: u32, got: u32 },
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("data from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("unique data id {0:?} is already registered")]
    DuplicateUniqueId(UniqueDataId),
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Header prepended to every serialized blob. Enables format detection and
/// version checking before the payload is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick at the time the data was written.
    pub tick: u64,
}

impl SnapshotHeader {
    pub fn new(magic: u32, tick: u64) -> Self {
        Self {
            magic,
            version: FORMAT_VERSION,
            tick,
        }
    }

    /// Check magic and version against what this build reads.
    pub fn validate(&self, expected_magic: u32) -> Result<(), DeserializeError> {
        if self.magic != expected_magic {
            return Err(DeserializeError::InvalidMagic {
                expected: expected_magic,
                got: self.magic,
            });
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct ChunkSnapshot {
    header: SnapshotHeader,
    chunk: Chunk,
}

/// Serialize one chunk: coordinate, then every tile layer's prototype id and
/// unique data (category tag, fields, internal id).
pub fn serialize_chunk(chunk: &Chunk, tick: u64) -> Result<Vec<u8>, SerializeError> {
    let snapshot = ChunkSnapshot {
        header: SnapshotHeader::new(CHUNK_MAGIC, tick),
        chunk: chunk.clone(),
    };
    bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
}

/// Deserialize a chunk and register its unique-data ids with `relocation`.
///
/// Fails without touching `relocation` if any id in the chunk is already
/// registered elsewhere.
pub fn deserialize_chunk(
    data: &[u8],
    relocation: &mut RelocationTable,
) -> Result<Chunk, DeserializeError> {
    let snapshot: ChunkSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    snapshot.header.validate(CHUNK_MAGIC)?;

    let chunk = snapshot.chunk;
    for (_, tile) in chunk.tiles() {
        for (_, layer) in tile.layers() {
            if let Some(id) = layer.unique_id()
                && relocation.contains(id)
            {
                return Err(DeserializeError::DuplicateUniqueId(id));
            }
        }
    }
    chunk.register_unique_ids(relocation);
    Ok(chunk)
}

// ---------------------------------------------------------------------------
// Worlds
// ---------------------------------------------------------------------------

/// Everything in a world that outlives a save. The relocation table is not
/// stored; it is rebuilt from the ids the chunks carry.
#[derive(Debug, Serialize, Deserialize)]
struct WorldSnapshot {
    header: SnapshotHeader,
    strategy: SimulationStrategy,
    sim_state: SimState,
    worldgen_config: WorldGenConfig,
    chunks: Vec<Chunk>,
    next_unique_id: UniqueDataId,
    transport: TransportLines,
    deferral: DeferralTimer,
    updates: UpdateDispatcher,
    worldgen: WorldGenQueue,
}

impl World {
    /// Serialize the world to a binary blob via bitcode.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = WorldSnapshot {
            header: SnapshotHeader::new(SNAPSHOT_MAGIC, self.sim_state.tick),
            strategy: self.strategy.clone(),
            sim_state: self.sim_state.clone(),
            worldgen_config: self.worldgen_config,
            chunks: self.chunks.values().cloned().collect(),
            next_unique_id: self.relocation.next_id(),
            transport: self.transport.clone(),
            deferral: self.deferral.clone(),
            updates: self.updates.clone(),
            worldgen: self.worldgen.clone(),
        };
        bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Deserialize a world from a binary blob.
    ///
    /// Validates the header, rebuilds the relocation table from the chunks,
    /// and reports (without failing) prototype ids unknown to `prototypes`
    /// and belts whose segment is missing.
    pub fn deserialize(data: &[u8], prototypes: &Prototypes) -> Result<Self, DeserializeError> {
        let snapshot: WorldSnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate(SNAPSHOT_MAGIC)?;

        let mut world = World::with_config(WorldConfig {
            strategy: snapshot.strategy,
            transport: snapshot.transport.config(),
            worldgen: snapshot.worldgen_config,
        });
        world.sim_state = snapshot.sim_state;
        world.transport = snapshot.transport;
        world.deferral = snapshot.deferral;
        world.updates = snapshot.updates;
        world.worldgen = snapshot.worldgen;

        let mut registered = 0;
        for chunk in snapshot.chunks {
            for (_, tile) in chunk.tiles() {
                for (_, layer) in tile.layers() {
                    if let Some(id) = layer.unique_id()
                        && world.relocation.contains(id)
                    {
                        return Err(DeserializeError::DuplicateUniqueId(id));
                    }
                }
            }
            registered += chunk.register_unique_ids(&mut world.relocation);
            world.chunks.insert(chunk.coord(), chunk);
        }
        if snapshot.next_unique_id.0 > 1 {
            world
                .relocation
                .reserve_through(UniqueDataId(snapshot.next_unique_id.0 - 1));
        }

        world.check_references(prototypes);
        info!(
            "loaded world at tick {}: {} chunks, {} unique instances, {} segments, {} pending deferrals, {} listeners",
            world.sim_state.tick,
            world.chunks.len(),
            registered,
            world.transport.len(),
            world.deferral.pending_len(),
            world.updates.len()
        );
        Ok(world)
    }

    fn check_references(&self, prototypes: &Prototypes) {
        for chunk in self.chunks.values() {
            for (local, tile) in chunk.tiles() {
                for (layer, tile_layer) in tile.layers() {
                    let coord = local_to_world(chunk.coord(), local);
                    if let Some(id) = tile_layer.prototype
                        && prototypes.get(id).is_none()
                    {
                        warn!("{layer:?} layer at {coord:?} references unknown prototype {id:?}");
                    }
                    if layer == TileLayer::Entity
                        && let Some(belt) = tile_layer.get_unique_data::<BeltData>()
                        && !self.transport.contains(belt.segment)
                    {
                        warn!("belt at {coord:?} references missing segment {:?}", belt.segment);
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Hashing
    // -----------------------------------------------------------------------

    /// Hash of the whole simulation state.
    pub fn state_hash(&self) -> u64 {
        let h = self.subsystem_hashes();
        let mut hash = StateHash::new();
        hash.write_u64(h.chunks);
        hash.write_u64(h.transport);
        hash.write_u64(h.deferral);
        hash.write_u64(h.updates);
        hash.write_u64(h.sim_state);
        hash.finish()
    }

    /// Per-subsystem hashes, so diverging worlds can be narrowed down to the
    /// subsystem responsible.
    pub fn subsystem_hashes(&self) -> SubsystemHashes {
        SubsystemHashes {
            chunks: self.hash_chunks(),
            transport: self.hash_transport(),
            deferral: self.hash_deferral(),
            updates: self.hash_updates(),
            sim_state: self.hash_sim_state(),
        }
    }

    fn hash_chunks(&self) -> u64 {
        let mut hash = StateHash::new();
        for chunk in self.chunks.values() {
            hash.write_i32(chunk.coord().x);
            hash.write_i32(chunk.coord().y);
            for (_, tile) in chunk.tiles() {
                for (_, layer) in tile.layers() {
                    if layer.is_empty() {
                        hash.write(&[0]);
                        continue;
                    }
                    hash.write(&[1]);
                    hash.write_u32(layer.prototype.map_or(u32::MAX, |p| p.0));
                    if let Some(unique) = layer.unique() {
                        hash.write(&[unique.kind().tag()]);
                        hash.write_u32(unique.internal_id.map_or(0, |id| id.0));
                        if let Ok(bytes) = bitcode::serialize(&unique.value) {
                            hash.write(&bytes);
                        }
                    }
                }
            }
        }
        hash.finish()
    }

    fn hash_transport(&self) -> u64 {
        let mut hash = StateHash::new();
        for (id, segment) in self.transport.iter() {
            hash.write(&key_bytes(id));
            hash.write_fixed64(segment.length());
            hash.write_fixed64(segment.speed());
            hash.write(&segment.target.map_or([0; 8], key_bytes));
            hash.write_fixed64(segment.landing);
            for belt_item in segment.items() {
                hash.write_u32(belt_item.item.0);
                hash.write_fixed64(belt_item.offset);
            }
        }
        hash.finish()
    }

    fn hash_deferral(&self) -> u64 {
        let mut hash = StateHash::new();
        for entry in self.deferral.iter() {
            hash.write_u64(entry.due);
            hash.write_u32(entry.owner.0);
            hash.write_u64(entry.payload);
        }
        hash.finish()
    }

    fn hash_updates(&self) -> u64 {
        let mut hash = StateHash::new();
        for (emitter, listener) in self.updates.iter() {
            hash.write_i32(emitter.x);
            hash.write_i32(emitter.y);
            hash.write_u32(listener.0);
        }
        hash.finish()
    }

    fn hash_sim_state(&self) -> u64 {
        let mut hash = StateHash::new();
        hash.write_u64(self.sim_state.tick);
        hash.write_u64(self.sim_state.accumulator);
        hash.finish()
    }
}

/// Per-subsystem hashes from [`World::subsystem_hashes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsystemHashes {
    pub chunks: u64,
    pub transport: u64,
    pub deferral: u64,
    pub updates: u64,
    pub sim_state: u64,
}

/// Deterministic bytes of a slotmap key (version and index packed in a u64).
fn key_bytes<K: slotmap::Key>(key: K) -> [u8; 8] {
    key.data().as_ffi().to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{ChunkCoord, Orientation, WorldCoord};
    use crate::test_utils::*;
    use crate::unique::ContainerData;

    fn world_with_chest(fx: &Fixture) -> (World, WorldCoord) {
        let mut world = world_with_origin_chunk();
        let at = WorldCoord::new(7, 9);
        world
            .build(&fx.protos, at, TileLayer::Entity, Orientation::Up, fx.chest)
            .unwrap();
        let chest = world
            .get_unique_data_mut::<ContainerData>(at, TileLayer::Entity)
            .unwrap();
        assert_eq!(chest.inventory.add(fx.iron_plate, 130, 100), 0);
        (world, at)
    }

    #[test]
    fn header_validation() {
        let header = SnapshotHeader::new(SNAPSHOT_MAGIC, 5);
        assert!(header.validate(SNAPSHOT_MAGIC).is_ok());
        assert!(matches!(
            header.validate(CHUNK_MAGIC),
            Err(DeserializeError::InvalidMagic { .. })
        ));

        let future = SnapshotHeader {
            version: FORMAT_VERSION + 1,
            ..header.clone()
        };
        assert!(matches!(
            future.validate(SNAPSHOT_MAGIC),
            Err(DeserializeError::FutureVersion(_))
        ));
        let old = SnapshotHeader { version: 0, ..header };
        assert!(matches!(
            old.validate(SNAPSHOT_MAGIC),
            Err(DeserializeError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn chunk_round_trip_preserves_inventory_and_ids() {
        let fx = fixture();
        let (world, at) = world_with_chest(&fx);
        let chunk = world.get_chunk(ChunkCoord::new(0, 0)).unwrap();
        let id = world.unique_id(at, TileLayer::Entity).unwrap();

        let bytes = serialize_chunk(chunk, world.tick()).unwrap();
        let mut relocation = RelocationTable::new();
        let restored = deserialize_chunk(&bytes, &mut relocation).unwrap();

        assert_eq!(&restored, chunk);
        assert_eq!(relocation.get(id).map(|l| l.coord), Some(at));
        assert!(relocation.next_id().0 > id.0);
    }

    #[test]
    fn chunk_with_registered_ids_is_rejected() {
        let fx = fixture();
        let (world, at) = world_with_chest(&fx);
        let bytes = serialize_chunk(world.get_chunk(ChunkCoord::new(0, 0)).unwrap(), 0).unwrap();

        let mut relocation = RelocationTable::new();
        let id = world.unique_id(at, TileLayer::Entity).unwrap();
        relocation.store_relocation_entry(id, crate::relocation::TileLocation::new(at, TileLayer::Entity));
        assert!(matches!(
            deserialize_chunk(&bytes, &mut relocation),
            Err(DeserializeError::DuplicateUniqueId(dup)) if dup == id
        ));
    }

    #[test]
    fn world_blob_is_not_a_chunk() {
        let world = world_with_origin_chunk();
        let bytes = world.serialize().unwrap();
        assert!(deserialize_chunk(&bytes, &mut RelocationTable::new()).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let fx = fixture();
        match World::deserialize(&[0u8; 10], &fx.protos) {
            Err(DeserializeError::Decode(_) | DeserializeError::InvalidMagic { .. }) => {}
            Err(other) => panic!("expected a decode error, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn world_round_trip_preserves_hash() {
        let fx = fixture();
        let (mut world, _) = world_with_chest(&fx);
        world
            .build(&fx.protos, WorldCoord::new(0, 0), TileLayer::Entity, Orientation::Right, fx.belt)
            .unwrap();
        let seg = crate::entity::belt::segment_at(&world, WorldCoord::new(0, 0)).unwrap();
        world.transport_mut().insert_item(seg, fx.gear, fixed(0.0)).unwrap();
        run_ticks(&mut world, &fx.protos, 3);

        let bytes = world.serialize().unwrap();
        let restored = World::deserialize(&bytes, &fx.protos).unwrap();
        assert_eq!(restored.state_hash(), world.state_hash());
        assert_eq!(restored.relocation().len(), world.relocation().len());
        assert_eq!(restored.relocation().next_id(), world.relocation().next_id());
    }

    #[test]
    fn restored_world_keeps_ticking_identically() {
        let fx = fixture();
        let mut world = world_with_origin_chunk();
        world.queue_chunk_generation(ChunkCoord::new(1, 0));
        let at = WorldCoord::new(3, 3);
        world
            .build(&fx.protos, at, TileLayer::Entity, Orientation::Up, fx.assembler)
            .unwrap();
        crate::entity::assembly::set_recipe(&mut world, &fx.protos, at, Some(fx.gear_recipe)).unwrap();
        for _ in 0..2 {
            crate::logistics::insert_item(&mut world, &fx.protos, at, fx.iron_plate).unwrap();
        }

        let mut restored = World::deserialize(&world.serialize().unwrap(), &fx.protos).unwrap();
        run_ticks(&mut world, &fx.protos, 40);
        run_ticks(&mut restored, &fx.protos, 40);
        assert_eq!(restored.subsystem_hashes(), world.subsystem_hashes());
        assert_eq!(restored.chunk_count(), 2);
    }

    #[test]
    fn listeners_survive_round_trip() {
        let fx = fixture();
        let mut world = world_with_origin_chunk();
        let drill = WorldCoord::new(5, 5);
        world
            .build(&fx.protos, drill, TileLayer::Entity, Orientation::Right, fx.drill)
            .unwrap();
        let mut restored = World::deserialize(&world.serialize().unwrap(), &fx.protos).unwrap();
        assert_eq!(restored.updates(), world.updates());

        // The restored drill still wakes when its output and a deposit appear.
        restored
            .build(&fx.protos, WorldCoord::new(6, 5), TileLayer::Entity, Orientation::Up, fx.chest)
            .unwrap();
        crate::entity::resource::place_resource(&mut restored, &fx.protos, drill, fx.iron_deposit, 2)
            .unwrap();
        run_ticks(&mut restored, &fx.protos, 60);
        assert_eq!(crate::entity::resource::amount_at(&restored, drill), 1);
    }

    #[test]
    fn hash_changes_with_state() {
        let fx = fixture();
        let (mut world, at) = world_with_chest(&fx);
        let before = world.state_hash();
        crate::logistics::insert_item(&mut world, &fx.protos, at, fx.gear).unwrap();
        let after = world.subsystem_hashes();
        assert_ne!(before, world.state_hash());
        assert_eq!(after.transport, World::default().subsystem_hashes().transport);
    }
}
