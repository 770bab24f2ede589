//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::chunk::TileLayer;
use crate::coord::ChunkCoord;
use crate::fixed::Fixed64;
use crate::id::PrototypeId;
use crate::prototype::*;
use crate::sim::SimulationStrategy;
use crate::transport::TransportConfig;
use crate::world::{World, WorldConfig};
use crate::worldgen::WorldGenConfig;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Prototype fixture
// ===========================================================================

pub const CHEST_SLOTS: usize = 4;

/// Belt speed in tiles per tick. A power of two so offsets stay exact.
pub const BELT_SPEED: f64 = 0.125;

/// A small, validated prototype set covering every category.
pub struct Fixture {
    pub protos: Prototypes,
    pub iron_ore: PrototypeId,
    pub iron_plate: PrototypeId,
    pub gear: PrototypeId,
    pub grass: PrototypeId,
    pub water: PrototypeId,
    pub iron_deposit: PrototypeId,
    pub chest: PrototypeId,
    pub belt: PrototypeId,
    pub assembler: PrototypeId,
    pub drill: PrototypeId,
    pub inserter: PrototypeId,
    pub gear_recipe: PrototypeId,
    /// One ore plus one plate into a gear; two ingredient slots.
    pub mixed_recipe: PrototypeId,
    pub terrain: PrototypeId,
    pub iron_field: PrototypeId,
}

pub fn fixture() -> Fixture {
    let mut b = PrototypesBuilder::new();

    let iron_ore = b.register("iron-ore", PrototypeKind::Item(ItemProto { stack_size: 50 }));
    let iron_plate = b.register("iron-plate", PrototypeKind::Item(ItemProto { stack_size: 100 }));
    let gear = b.register("iron-gear", PrototypeKind::Item(ItemProto { stack_size: 100 }));

    let grass = b.register("grass", PrototypeKind::Tile(TileProto { is_water: false }));
    let water = b.register("water", PrototypeKind::Tile(TileProto { is_water: true }));

    let iron_deposit = b.register(
        "iron-deposit",
        PrototypeKind::Resource(ResourceProto {
            product: iron_ore,
            pickup_time: 1.0,
        }),
    );

    let chest = b.register(
        "wooden-chest",
        PrototypeKind::Container(ContainerProto {
            max_health: 100,
            inventory_size: CHEST_SLOTS as u16,
        }),
    );
    let belt = b.register(
        "transport-belt",
        PrototypeKind::TransportBelt(BeltProto {
            max_health: 100,
            speed: fixed(BELT_SPEED),
        }),
    );
    let assembler = b.register(
        "assembling-machine",
        PrototypeKind::AssemblyMachine(AssemblyMachineProto {
            max_health: 300,
            crafting_speed: 1.0,
        }),
    );
    let drill = b.register(
        "mining-drill",
        PrototypeKind::MiningDrill(MiningDrillProto {
            max_health: 300,
            mining_speed: 1.0,
            mining_radius: 1,
        }),
    );
    let inserter = b.register(
        "inserter",
        PrototypeKind::Inserter(InserterProto {
            max_health: 150,
            tile_reach: 1,
            swing_time: 0.2,
        }),
    );

    let gear_recipe = b.register(
        "iron-gear-recipe",
        PrototypeKind::Recipe(RecipeProto {
            ingredients: vec![(iron_plate, 2)],
            product: (gear, 1),
            crafting_time: 0.5,
        }),
    );

    let mixed_recipe = b.register(
        "mixed-gear-recipe",
        PrototypeKind::Recipe(RecipeProto {
            ingredients: vec![(iron_ore, 1), (iron_plate, 1)],
            product: (gear, 1),
            crafting_time: 0.5,
        }),
    );

    let terrain = b.register(
        "terrain",
        PrototypeKind::NoiseLayer(NoiseLayerProto {
            target: TileLayer::Base,
            octaves: 2,
            frequency: 1.0,
            persistence: 0.5,
            start_value: -1.0,
            ranges: vec![(-0.3, water), (1.0, grass)],
            richness: 0.0,
        }),
    );
    let iron_field = b.register(
        "iron-field",
        PrototypeKind::NoiseLayer(NoiseLayerProto {
            target: TileLayer::Resource,
            octaves: 2,
            frequency: 1.0,
            persistence: 0.5,
            start_value: 0.2,
            ranges: vec![(1.0, iron_deposit)],
            richness: 1000.0,
        }),
    );

    let protos = b.build().expect("fixture prototypes are valid");

    Fixture {
        protos,
        iron_ore,
        iron_plate,
        gear,
        grass,
        water,
        iron_deposit,
        chest,
        belt,
        assembler,
        drill,
        inserter,
        gear_recipe,
        mixed_recipe,
        terrain,
        iron_field,
    }
}

// ===========================================================================
// World helpers
// ===========================================================================

/// Tick-mode world with the given belt spacing and seed.
pub fn world_with(spacing: f64, seed: u32) -> World {
    World::with_config(WorldConfig {
        strategy: SimulationStrategy::Tick,
        transport: TransportConfig {
            spacing: fixed(spacing),
        },
        worldgen: WorldGenConfig { seed },
    })
}

/// Tick-mode world with the chunk at the origin allocated (and empty).
pub fn world_with_origin_chunk() -> World {
    let mut world = World::default();
    world.emplace_chunk(ChunkCoord::new(0, 0));
    world
}

/// Run `n` ticks.
pub fn run_ticks(world: &mut World, protos: &Prototypes, n: u64) {
    for _ in 0..n {
        world.step(protos);
    }
}
