//! Chunk generation queue and terrain/resource placement.
//!
//! Chunks are generated one per logic tick from a FIFO queue so per-tick
//! cost stays bounded regardless of how many chunks are requested.
//! Placement samples one seeded fBm Perlin field per noise layer prototype:
//! base layers pick terrain, resource layers place deposits whose amount
//! scales with how far the sample sits inside its band.

use crate::chunk::{Chunk, TileLayer};
use crate::coord::{CHUNK_EDGE, ChunkCoord, local_to_world};
use crate::prototype::{NoiseLayerProto, Prototypes};
use crate::relocation::{RelocationTable, TileLocation};
use crate::unique::ResourceData;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// FIFO of chunks waiting for generation. Each coordinate appears at most
/// once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldGenQueue {
    pending: VecDeque<ChunkCoord>,
    queued: BTreeSet<ChunkCoord>,
}

impl WorldGenQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `coord` unless it is already queued or `generated`. Returns
    /// whether it was added.
    pub fn push(&mut self, coord: ChunkCoord, generated: bool) -> bool {
        if generated || !self.queued.insert(coord) {
            return false;
        }
        self.pending.push_back(coord);
        true
    }

    pub fn pop(&mut self) -> Option<ChunkCoord> {
        let coord = self.pending.pop_front()?;
        self.queued.remove(&coord);
        Some(coord)
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.queued.contains(&coord)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.queued.clear();
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Seed for world generation. Each noise layer offsets it by its index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldGenConfig {
    pub seed: u32,
}

/// A noise field for one layer.
fn noise_field(layer: &NoiseLayerProto, seed: u32) -> Fbm<Perlin> {
    Fbm::<Perlin>::new(seed)
        .set_octaves(layer.octaves)
        .set_frequency(layer.frequency)
        .set_persistence(layer.persistence)
}

/// Sample point for a tile. A chunk spans one unit of noise space centred
/// on its chunk coordinate, so neighbouring chunks line up seamlessly.
fn sample_point(x: i32, y: i32) -> [f64; 2] {
    let edge = f64::from(CHUNK_EDGE);
    [f64::from(x) / edge - 0.5, f64::from(y) / edge - 0.5]
}

/// Band of `layer` containing `value`: `(start, end, index)`.
fn band(layer: &NoiseLayerProto, value: f64) -> Option<(f64, f64, usize)> {
    let mut start = layer.start_value;
    if value < start {
        return None;
    }
    for (i, (upper, _)) in layer.ranges.iter().enumerate() {
        if value < *upper {
            return Some((start, *upper, i));
        }
        start = *upper;
    }
    None
}

/// Base layers never leave a hole: out-of-range values clamp to the first
/// or last band.
fn terrain_band(layer: &NoiseLayerProto, value: f64) -> Option<usize> {
    if layer.ranges.is_empty() {
        return None;
    }
    Some(band(layer, value).map_or_else(
        || if value < layer.start_value { 0 } else { layer.ranges.len() - 1 },
        |(_, _, i)| i,
    ))
}

/// Resource amount for a sample inside `[start, end)`, at least 1.
pub fn resource_amount(value: f64, start: f64, end: f64, richness: f64) -> u32 {
    let span = end - start;
    if span <= 0.0 {
        return 1;
    }
    let amount = ((value - start) * richness / span).floor();
    if amount.is_finite() && amount >= 1.0 {
        amount.min(f64::from(u32::MAX)) as u32
    } else {
        1
    }
}

/// Populate the base and resource layers of `chunk`.
///
/// Base noise layers run first (later layers overwrite earlier ones), then
/// resource layers. Resources are never placed on water or on a tile that
/// already holds a resource.
pub fn generate_chunk(
    chunk: &mut Chunk,
    prototypes: &Prototypes,
    config: WorldGenConfig,
    relocation: &mut RelocationTable,
) {
    let coord = chunk.coord();
    let layers: Vec<_> = prototypes.noise_layers().map(|(_, l)| l).collect();

    let base = layers.iter().filter(|l| l.target == TileLayer::Base);
    let resources = layers.iter().filter(|l| l.target == TileLayer::Resource);
    let mut seed_offset = 0u32;

    for layer in base {
        let field = noise_field(layer, config.seed.wrapping_add(seed_offset));
        seed_offset += 1;

        for (local, tile) in chunk.tiles_mut() {
            let world = local_to_world(coord, local);
            let value = field.get(sample_point(world.x, world.y));
            if let Some(i) = terrain_band(layer, value) {
                tile.layer_mut(TileLayer::Base).prototype = Some(layer.ranges[i].1);
            }
        }
    }

    for layer in resources {
        let field = noise_field(layer, config.seed.wrapping_add(seed_offset));
        seed_offset += 1;

        for (local, tile) in chunk.tiles_mut() {
            let world = local_to_world(coord, local);
            let value = field.get(sample_point(world.x, world.y));
            let Some((start, end, i)) = band(layer, value) else {
                continue;
            };
            if tile
                .prototype(TileLayer::Base)
                .is_some_and(|t| prototypes.is_water(t))
            {
                continue;
            }
            let slot = tile.layer_mut(TileLayer::Resource);
            if slot.prototype.is_some() {
                continue;
            }

            slot.prototype = Some(layer.ranges[i].1);
            slot.make_unique_data(
                ResourceData {
                    amount: resource_amount(value, start, end, layer.richness),
                },
                relocation,
                TileLocation::new(world, TileLayer::Resource),
            );
        }
    }
}
