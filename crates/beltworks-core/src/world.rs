//! The world: chunk storage plus the subsystems driven by the logic tick.
//!
//! # Architecture
//!
//! The `World` owns:
//! - Chunks keyed by [`ChunkCoord`], allocated lazily
//! - A [`RelocationTable`] resolving unique-data ids to tile locations
//! - [`TransportLines`], the belt segment arena
//! - A [`DeferralTimer`] of pending entity notifications
//! - An [`UpdateDispatcher`] of entities listening on other tiles
//! - A [`WorldGenQueue`] of chunks awaiting generation
//! - A [`SimState`] (tick counter, accumulator)
//!
//! Prototypes are not owned; every entry point that needs them takes a
//! `&Prototypes`.
//!
//! # Logic tick
//!
//! Each [`World::on_logic_tick`] runs, in order:
//! 1. **World generation** -- generate at most one queued chunk
//! 2. **Deferred dispatch** -- fire live entries due at or before the tick
//! 3. **Transport** -- advance belt segments, hand off lead items

use crate::chunk::{Chunk, ChunkTile, ChunkTileLayer, TileLayer};
use crate::coord::{ChunkCoord, Orientation, WorldCoord, world_to_chunk};
use crate::deferral::{DeferralEntry, DeferralHandle, DeferralTimer, DispatchReport, ScheduleError};
use crate::entity::{self, BuildError};
use crate::fixed::Ticks;
use crate::id::{PrototypeId, UniqueDataId};
use crate::prototype::Prototypes;
use crate::relocation::{RelocationTable, TileLocation};
use crate::sim::{AdvanceResult, SimState, SimulationStrategy};
use crate::transport::{TransportConfig, TransportLines, TransportTickReport};
use crate::unique::UniqueVariant;
use crate::update::{TileEvent, TileUpdate, UpdateDispatcher};
use crate::worldgen::{self, WorldGenConfig, WorldGenQueue};
use log::{debug, info, trace};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Construction-time settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldConfig {
    pub strategy: SimulationStrategy,
    pub transport: TransportConfig,
    pub worldgen: WorldGenConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            strategy: SimulationStrategy::Tick,
            transport: TransportConfig::default(),
            worldgen: WorldGenConfig::default(),
        }
    }
}

/// What one logic tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Ticks,
    pub generated: Option<ChunkCoord>,
    pub deferrals: DispatchReport,
    pub transport: TransportTickReport,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct World {
    pub(crate) chunks: BTreeMap<ChunkCoord, Chunk>,
    pub(crate) relocation: RelocationTable,
    pub(crate) transport: TransportLines,
    pub(crate) deferral: DeferralTimer,
    pub(crate) updates: UpdateDispatcher,
    pub(crate) worldgen: WorldGenQueue,
    pub(crate) worldgen_config: WorldGenConfig,
    pub(crate) strategy: SimulationStrategy,
    pub sim_state: SimState,
    #[cfg(feature = "profiling")]
    pub(crate) last_profile: Option<crate::profiling::TickProfile>,
}

impl World {
    /// Create an empty world with default transport and generation settings.
    pub fn new(strategy: SimulationStrategy) -> Self {
        Self::with_config(WorldConfig {
            strategy,
            ..WorldConfig::default()
        })
    }

    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            chunks: BTreeMap::new(),
            relocation: RelocationTable::new(),
            transport: TransportLines::new(config.transport),
            deferral: DeferralTimer::new(),
            updates: UpdateDispatcher::new(),
            worldgen: WorldGenQueue::new(),
            worldgen_config: config.worldgen,
            strategy: config.strategy,
            sim_state: SimState::new(),
            #[cfg(feature = "profiling")]
            last_profile: None,
        }
    }

    /// Last processed tick.
    pub fn tick(&self) -> Ticks {
        self.sim_state.tick
    }

    pub fn strategy(&self) -> &SimulationStrategy {
        &self.strategy
    }

    pub fn relocation(&self) -> &RelocationTable {
        &self.relocation
    }

    pub fn transport(&self) -> &TransportLines {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut TransportLines {
        &mut self.transport
    }

    pub fn deferral(&self) -> &DeferralTimer {
        &self.deferral
    }

    pub fn updates(&self) -> &UpdateDispatcher {
        &self.updates
    }

    pub fn updates_mut(&mut self) -> &mut UpdateDispatcher {
        &mut self.updates
    }

    pub fn worldgen_queue(&self) -> &WorldGenQueue {
        &self.worldgen
    }

    #[cfg(feature = "profiling")]
    pub fn last_tick_profile(&self) -> Option<&crate::profiling::TickProfile> {
        self.last_profile.as_ref()
    }

    // -----------------------------------------------------------------------
    // Chunks and tiles
    // -----------------------------------------------------------------------

    /// The chunk at `coord`, if allocated. Never allocates.
    pub fn get_chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    pub fn get_chunk_mut(&mut self, coord: ChunkCoord) -> Option<&mut Chunk> {
        self.chunks.get_mut(&coord)
    }

    /// Allocate the chunk at `coord`, or return the existing one.
    pub fn emplace_chunk(&mut self, coord: ChunkCoord) -> &mut Chunk {
        self.chunks.entry(coord).or_insert_with(|| Chunk::new(coord))
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// The tile at `coord`; `None` when its chunk is not allocated.
    pub fn get_tile(&self, coord: WorldCoord) -> Option<&ChunkTile> {
        let (chunk, local) = world_to_chunk(coord);
        self.chunks.get(&chunk).map(|c| c.tile(local))
    }

    pub fn get_tile_mut(&mut self, coord: WorldCoord) -> Option<&mut ChunkTile> {
        let (chunk, local) = world_to_chunk(coord);
        self.chunks.get_mut(&chunk).map(|c| c.tile_mut(local))
    }

    pub fn layer(&self, coord: WorldCoord, layer: TileLayer) -> Option<&ChunkTileLayer> {
        self.get_tile(coord).map(|t| t.layer(layer))
    }

    pub fn layer_mut(&mut self, coord: WorldCoord, layer: TileLayer) -> Option<&mut ChunkTileLayer> {
        self.get_tile_mut(coord).map(|t| t.layer_mut(layer))
    }

    pub fn get_unique_data<T: UniqueVariant>(&self, coord: WorldCoord, layer: TileLayer) -> Option<&T> {
        self.layer(coord, layer)?.get_unique_data::<T>()
    }

    pub fn get_unique_data_mut<T: UniqueVariant>(
        &mut self,
        coord: WorldCoord,
        layer: TileLayer,
    ) -> Option<&mut T> {
        self.layer_mut(coord, layer)?.get_unique_data_mut::<T>()
    }

    /// Install `data` on a tile layer, replacing what was there, and register
    /// its new internal id.
    pub fn make_unique_data<T: UniqueVariant>(
        &mut self,
        coord: WorldCoord,
        layer: TileLayer,
        data: T,
    ) -> Result<UniqueDataId, BuildError> {
        let (chunk, local) = world_to_chunk(coord);
        let chunk = self
            .chunks
            .get_mut(&chunk)
            .ok_or(BuildError::ChunkAbsent(coord))?;
        Ok(chunk.tile_mut(local).layer_mut(layer).make_unique_data(
            data,
            &mut self.relocation,
            TileLocation::new(coord, layer),
        ))
    }

    /// Clear a tile layer: unique data, relocation entry and prototype.
    pub fn clear_layer(&mut self, coord: WorldCoord, layer: TileLayer) {
        let (chunk, local) = world_to_chunk(coord);
        if let Some(chunk) = self.chunks.get_mut(&chunk) {
            chunk.tile_mut(local).layer_mut(layer).clear(&mut self.relocation);
        }
    }

    /// Internal id of the unique data at a tile layer.
    pub fn unique_id(&self, coord: WorldCoord, layer: TileLayer) -> Option<UniqueDataId> {
        self.layer(coord, layer)?.unique_id()
    }

    /// Resolve a unique-data id to its tile, if the instance is still alive.
    ///
    /// Alive means the relocation table knows the id and the tile layer it
    /// points at still holds an instance with that id.
    pub fn resolve_unique(&self, id: UniqueDataId) -> Option<TileLocation> {
        let location = self.relocation.get(id)?;
        (self.unique_id(location.coord, location.layer) == Some(id)).then_some(location)
    }

    // -----------------------------------------------------------------------
    // Deferrals
    // -----------------------------------------------------------------------

    /// Schedule a notification for `owner`, `delay` ticks after the current
    /// tick.
    pub fn schedule_deferral(
        &mut self,
        owner: UniqueDataId,
        delay: Ticks,
        payload: u64,
    ) -> Result<DeferralHandle, ScheduleError> {
        self.deferral.schedule(self.sim_state.tick, delay, owner, payload)
    }

    pub fn cancel_deferral(&mut self, handle: DeferralHandle) -> bool {
        self.deferral.cancel(handle)
    }

    /// Fire deferred entries due at or before `tick`, routing each to its
    /// owner's category handler. Entries whose owner is gone are dropped and
    /// counted as cancelled, as are entries cancelled explicitly.
    pub fn dispatch_deferrals(&mut self, prototypes: &Prototypes, tick: Ticks) -> DispatchReport {
        let due = self.deferral.take_due(tick);
        due.fire_each(|entry| self.fire_deferral(prototypes, entry))
    }

    /// Deliver one entry. Returns `false` if its owner no longer exists.
    fn fire_deferral(&mut self, prototypes: &Prototypes, entry: &DeferralEntry) -> bool {
        let Some(location) = self.resolve_unique(entry.owner) else {
            trace!("dropping deferral {:?}: owner {:?} is gone", entry.id, entry.owner);
            return false;
        };
        let proto = self
            .layer(location.coord, location.layer)
            .and_then(|l| l.prototype)
            .and_then(|id| prototypes.get(id));
        let Some(proto) = proto else {
            trace!("dropping deferral {:?}: no prototype at {:?}", entry.id, location);
            return false;
        };
        match entity::capabilities(proto.kind.category()).on_deferral {
            Some(handler) => {
                handler(self, prototypes, proto, location, entry);
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Tile updates
    // -----------------------------------------------------------------------

    /// Tell every live listener of `coord` what happened on it. Listeners
    /// whose instance is gone are unregistered.
    pub fn dispatch_tile_update(
        &mut self,
        prototypes: &Prototypes,
        coord: WorldCoord,
        layer: TileLayer,
        update: TileUpdate,
    ) {
        let event = TileEvent { coord, layer, update };
        for listener in self.updates.listeners(coord).to_vec() {
            let Some(location) = self.resolve_unique(listener) else {
                trace!("pruning stale listener {listener:?} on {coord:?}");
                self.updates.unregister(coord, listener);
                continue;
            };
            let proto = self
                .layer(location.coord, location.layer)
                .and_then(|l| l.prototype)
                .and_then(|id| prototypes.get(id));
            if let Some(proto) = proto
                && let Some(handler) = entity::capabilities(proto.kind.category()).on_tile_update
            {
                handler(self, prototypes, proto, location, event);
            }
        }
    }

    // -----------------------------------------------------------------------
    // World generation
    // -----------------------------------------------------------------------

    /// Queue a chunk for generation. No-op if queued or already present.
    pub fn queue_chunk_generation(&mut self, coord: ChunkCoord) -> bool {
        let generated = self.chunks.contains_key(&coord);
        self.worldgen.push(coord, generated)
    }

    /// Generate the next queued chunk, if any.
    pub fn generate_one_chunk(&mut self, prototypes: &Prototypes) -> Option<ChunkCoord> {
        let coord = self.worldgen.pop()?;
        if self.chunks.contains_key(&coord) {
            debug!("chunk {coord:?} already present, skipping generation");
            return Some(coord);
        }

        debug!("generating chunk {coord:?}");
        let mut chunk = Chunk::new(coord);
        worldgen::generate_chunk(&mut chunk, prototypes, self.worldgen_config, &mut self.relocation);
        self.chunks.insert(coord, chunk);
        Some(coord)
    }

    // -----------------------------------------------------------------------
    // Build / remove
    // -----------------------------------------------------------------------

    /// Place `prototype` on a tile layer and run its build handler.
    pub fn build(
        &mut self,
        prototypes: &Prototypes,
        coord: WorldCoord,
        layer: TileLayer,
        orientation: Orientation,
        prototype: PrototypeId,
    ) -> Result<(), BuildError> {
        let proto = prototypes
            .get(prototype)
            .ok_or(BuildError::UnknownPrototype(prototype))?;
        let caps = entity::capabilities(proto.kind.category());
        let Some(on_build) = caps.on_build else {
            return Err(BuildError::NotPlaceable(proto.name.clone()));
        };

        let slot = self
            .layer_mut(coord, layer)
            .ok_or(BuildError::ChunkAbsent(coord))?;
        if slot.prototype.is_some() {
            return Err(BuildError::Occupied { coord, layer });
        }
        slot.prototype = Some(prototype);

        if let Err(e) = on_build(self, prototypes, proto, coord, layer, orientation) {
            self.clear_layer(coord, layer);
            return Err(e);
        }
        debug!("built '{}' at {coord:?} {layer:?}", proto.name);
        self.dispatch_tile_update(prototypes, coord, layer, TileUpdate::Placed);
        Ok(())
    }

    /// Run the remove handler of whatever occupies a tile layer, then clear
    /// the layer.
    pub fn remove(
        &mut self,
        prototypes: &Prototypes,
        coord: WorldCoord,
        layer: TileLayer,
    ) -> Result<(), BuildError> {
        let prototype = self
            .layer(coord, layer)
            .ok_or(BuildError::ChunkAbsent(coord))?
            .prototype
            .ok_or(BuildError::Empty { coord, layer })?;

        if let Some(proto) = prototypes.get(prototype) {
            if let Some(on_remove) = entity::capabilities(proto.kind.category()).on_remove {
                on_remove(self, prototypes, proto, coord, layer);
            }
            debug!("removed '{}' at {coord:?} {layer:?}", proto.name);
        }
        self.clear_layer(coord, layer);
        self.dispatch_tile_update(prototypes, coord, layer, TileUpdate::Removed);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Ticking
    // -----------------------------------------------------------------------

    /// Run one logic tick numbered `tick`: world generation, deferred
    /// dispatch, then transport.
    pub fn on_logic_tick(&mut self, prototypes: &Prototypes, tick: Ticks) -> TickReport {
        #[cfg(feature = "profiling")]
        let step_start = std::time::Instant::now();

        self.sim_state.tick = tick;

        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        let generated = self.generate_one_chunk(prototypes);
        #[cfg(feature = "profiling")]
        let worldgen_dur = phase_start.elapsed();

        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        let deferrals = self.dispatch_deferrals(prototypes, tick);
        #[cfg(feature = "profiling")]
        let deferral_dur = phase_start.elapsed();

        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        let transport = self.transport.update();
        #[cfg(feature = "profiling")]
        let transport_dur = phase_start.elapsed();

        #[cfg(feature = "profiling")]
        {
            self.last_profile = Some(crate::profiling::TickProfile {
                worldgen: worldgen_dur,
                deferral: deferral_dur,
                transport: transport_dur,
                total: step_start.elapsed(),
                tick,
            });
        }

        TickReport {
            tick,
            generated,
            deferrals,
            transport,
        }
    }

    /// Advance the simulation.
    ///
    /// In tick mode, runs exactly one tick (`dt` is ignored). In delta mode,
    /// accumulates `dt` and runs as many fixed steps as fit.
    pub fn advance(&mut self, prototypes: &Prototypes, dt: Ticks) -> AdvanceResult {
        let mut result = AdvanceResult::default();

        match self.strategy.clone() {
            SimulationStrategy::Tick => {
                self.step_internal(prototypes, &mut result);
            }
            SimulationStrategy::Delta { fixed_timestep } => {
                self.sim_state.accumulator += dt;
                let step_size = fixed_timestep.max(1);
                while self.sim_state.accumulator >= step_size {
                    self.sim_state.accumulator -= step_size;
                    self.step_internal(prototypes, &mut result);
                }
            }
        }

        result
    }

    /// Run a single tick (convenience for tick mode).
    pub fn step(&mut self, prototypes: &Prototypes) -> TickReport {
        let next = self.sim_state.tick + 1;
        self.on_logic_tick(prototypes, next)
    }

    fn step_internal(&mut self, prototypes: &Prototypes, result: &mut AdvanceResult) {
        self.step(prototypes);
        result.steps_run += 1;
    }

    // -----------------------------------------------------------------------
    // Reset
    // -----------------------------------------------------------------------

    /// Drop all chunks, unique data, segments, pending deferrals, listeners
    /// and queued generation. The clock restarts at tick 0.
    pub fn clear(&mut self) {
        info!(
            "clearing world: {} chunks, {} segments, {} pending deferrals",
            self.chunks.len(),
            self.transport.len(),
            self.deferral.pending_len()
        );
        for chunk in self.chunks.values_mut() {
            chunk.clear(&mut self.relocation);
        }
        self.chunks.clear();
        self.relocation.clear();
        self.transport.clear();
        self.deferral.clear();
        self.updates.clear();
        self.worldgen.clear();
        self.sim_state = SimState::new();
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(SimulationStrategy::Tick)
    }
}
