//! Serde data file structs for prototype definitions.
//!
//! These structs define the on-disk format for items, tiles, resources,
//! entities, recipes and noise layers. They are deserialized from RON, JSON,
//! or TOML data files and then resolved into core prototypes by the loader.
//! Cross-references are by name.

use serde::Deserialize;

// ===========================================================================
// Items, tiles, resources
// ===========================================================================

/// An item definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemData {
    pub name: String,
    #[serde(default = "default_stack_size")]
    pub stack_size: u32,
}

fn default_stack_size() -> u32 {
    50
}

/// A terrain tile definition.
#[derive(Debug, Clone, Deserialize)]
pub struct TileData {
    pub name: String,
    #[serde(default)]
    pub is_water: bool,
}

/// A resource deposit definition.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceData {
    pub name: String,
    /// Item name produced per mining cycle.
    pub product: String,
    #[serde(default = "default_pickup_time")]
    pub pickup_time: f64,
}

fn default_pickup_time() -> f64 {
    1.0
}

// ===========================================================================
// Entities
// ===========================================================================

/// A placeable entity definition.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityData {
    pub name: String,
    #[serde(default = "default_max_health")]
    pub max_health: u32,
    pub kind: EntityKindData,
}

fn default_max_health() -> u32 {
    100
}

/// Category-specific entity fields.
#[derive(Debug, Clone, Deserialize)]
pub enum EntityKindData {
    Container {
        inventory_size: u16,
    },
    TransportBelt {
        /// Tiles per tick.
        speed: f64,
    },
    AssemblyMachine {
        #[serde(default = "default_speed")]
        crafting_speed: f64,
    },
    MiningDrill {
        #[serde(default = "default_speed")]
        mining_speed: f64,
        #[serde(default = "default_mining_radius")]
        mining_radius: u8,
    },
    Inserter {
        #[serde(default = "default_tile_reach")]
        tile_reach: u8,
        swing_time: f64,
    },
}

fn default_speed() -> f64 {
    1.0
}

fn default_mining_radius() -> u8 {
    1
}

fn default_tile_reach() -> u8 {
    1
}

// ===========================================================================
// Recipes
// ===========================================================================

/// A recipe definition. Ingredients and product are `(item, count)` pairs.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeData {
    pub name: String,
    pub ingredients: Vec<(String, u32)>,
    pub product: (String, u32),
    pub crafting_time: f64,
}

// ===========================================================================
// World generation
// ===========================================================================

/// Which tile layer a noise layer fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseTargetData {
    Base,
    Resource,
}

/// A noise layer definition.
#[derive(Debug, Clone, Deserialize)]
pub struct NoiseLayerData {
    pub name: String,
    pub target: NoiseTargetData,
    #[serde(default = "default_octaves")]
    pub octaves: usize,
    #[serde(default = "default_frequency")]
    pub frequency: f64,
    #[serde(default = "default_persistence")]
    pub persistence: f64,
    #[serde(default = "default_start_value")]
    pub start_value: f64,
    /// Ascending `(upper bound, tile or resource name)` pairs.
    pub ranges: Vec<(f64, String)>,
    #[serde(default)]
    pub richness: f64,
}

fn default_octaves() -> usize {
    4
}

fn default_frequency() -> f64 {
    0.25
}

fn default_persistence() -> f64 {
    0.5
}

fn default_start_value() -> f64 {
    -1.0
}

// ===========================================================================
// TOML wrappers
// ===========================================================================

/// TOML has no top-level arrays; each file wraps its list in a table key.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlItems {
    pub items: Vec<ItemData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlEntities {
    pub entities: Vec<EntityData>,
}
