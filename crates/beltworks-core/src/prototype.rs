//! Immutable prototype registry.
//!
//! Prototypes are tagged variant records ([`PrototypeKind`]) registered
//! through a [`PrototypesBuilder`] and frozen by [`PrototypesBuilder::build`],
//! which runs post-load validation. Behavior attached to a category lives in
//! the capability table (`crate::entity::capabilities`), not on the record.

use crate::chunk::TileLayer;
use crate::deferral::ticks_from_seconds;
use crate::fixed::{Fixed64, Ticks};
use crate::id::PrototypeId;
use std::collections::HashMap;

// ===========================================================================
// Prototype records
// ===========================================================================

/// Category of a prototype. Drives capability lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Item,
    Tile,
    Resource,
    Recipe,
    NoiseLayer,
    Container,
    TransportBelt,
    AssemblyMachine,
    MiningDrill,
    Inserter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemProto {
    pub stack_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileProto {
    pub is_water: bool,
}

/// A minable deposit placed on the resource layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceProto {
    /// Item produced per mining cycle.
    pub product: PrototypeId,
    /// Seconds to mine one item at mining speed 1.
    pub pickup_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeProto {
    pub ingredients: Vec<(PrototypeId, u32)>,
    pub product: (PrototypeId, u32),
    /// Seconds at crafting speed 1.
    pub crafting_time: f64,
}

/// Maps a noise value to tile or resource prototypes during world generation.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseLayerProto {
    /// `Base` layers pick terrain; `Resource` layers place deposits.
    pub target: TileLayer,
    pub octaves: usize,
    pub frequency: f64,
    pub persistence: f64,
    /// Noise values below this produce nothing.
    pub start_value: f64,
    /// Ascending upper bounds paired with the prototype chosen below them.
    pub ranges: Vec<(f64, PrototypeId)>,
    /// Resource amount at the strongest noise value.
    pub richness: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerProto {
    pub max_health: u32,
    pub inventory_size: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeltProto {
    pub max_health: u32,
    /// Tiles per tick.
    pub speed: Fixed64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyMachineProto {
    pub max_health: u32,
    pub crafting_speed: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MiningDrillProto {
    pub max_health: u32,
    pub mining_speed: f64,
    /// Tiles mined in each direction around the drill.
    pub mining_radius: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InserterProto {
    pub max_health: u32,
    /// Tiles between the inserter and its pickup/drop-off tiles.
    pub tile_reach: u8,
    /// Seconds for a half swing (pickup to drop-off).
    pub swing_time: f64,
}

/// Tagged prototype payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PrototypeKind {
    Item(ItemProto),
    Tile(TileProto),
    Resource(ResourceProto),
    Recipe(RecipeProto),
    NoiseLayer(NoiseLayerProto),
    Container(ContainerProto),
    TransportBelt(BeltProto),
    AssemblyMachine(AssemblyMachineProto),
    MiningDrill(MiningDrillProto),
    Inserter(InserterProto),
}

impl PrototypeKind {
    pub fn category(&self) -> Category {
        match self {
            PrototypeKind::Item(_) => Category::Item,
            PrototypeKind::Tile(_) => Category::Tile,
            PrototypeKind::Resource(_) => Category::Resource,
            PrototypeKind::Recipe(_) => Category::Recipe,
            PrototypeKind::NoiseLayer(_) => Category::NoiseLayer,
            PrototypeKind::Container(_) => Category::Container,
            PrototypeKind::TransportBelt(_) => Category::TransportBelt,
            PrototypeKind::AssemblyMachine(_) => Category::AssemblyMachine,
            PrototypeKind::MiningDrill(_) => Category::MiningDrill,
            PrototypeKind::Inserter(_) => Category::Inserter,
        }
    }
}

/// A registered prototype.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub id: PrototypeId,
    pub name: String,
    pub kind: PrototypeKind,
}

// ===========================================================================
// Errors
// ===========================================================================

/// Post-load validation failures. Fatal at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PrototypeError {
    #[error("duplicate prototype name '{0}'")]
    DuplicateName(String),
    #[error("prototype '{name}': {reason}")]
    Invalid { name: String, reason: String },
    #[error("prototype '{name}' references {id:?}, expected a {expected:?}")]
    BadReference {
        name: String,
        id: PrototypeId,
        expected: Category,
    },
    #[error("not found: {0}")]
    NotFound(String),
}

// ===========================================================================
// Builder
// ===========================================================================

/// Collects prototypes before validation.
#[derive(Debug, Default)]
pub struct PrototypesBuilder {
    prototypes: Vec<Prototype>,
    by_name: HashMap<String, PrototypeId>,
    duplicates: Vec<String>,
}

impl PrototypesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prototype and return its id. Ids are dense, in
    /// registration order. Duplicate names are reported by `build()`.
    pub fn register(&mut self, name: &str, kind: PrototypeKind) -> PrototypeId {
        let id = PrototypeId(self.prototypes.len() as u32);
        if self.by_name.insert(name.to_string(), id).is_some() {
            self.duplicates.push(name.to_string());
        }
        self.prototypes.push(Prototype {
            id,
            name: name.to_string(),
            kind,
        });
        id
    }

    /// Modify a registered prototype in place.
    pub fn mutate<F>(&mut self, name: &str, f: F) -> Result<(), PrototypeError>
    where
        F: FnOnce(&mut PrototypeKind),
    {
        let id = self
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| PrototypeError::NotFound(name.to_string()))?;
        f(&mut self.prototypes[id.0 as usize].kind);
        Ok(())
    }

    pub fn id(&self, name: &str) -> Option<PrototypeId> {
        self.by_name.get(name).copied()
    }

    /// Validate every prototype and freeze the registry.
    pub fn build(self) -> Result<Prototypes, PrototypeError> {
        if let Some(name) = self.duplicates.into_iter().next() {
            return Err(PrototypeError::DuplicateName(name));
        }
        let prototypes = Prototypes {
            prototypes: self.prototypes,
            by_name: self.by_name,
        };
        for proto in &prototypes.prototypes {
            prototypes.validate(proto)?;
        }
        Ok(prototypes)
    }
}

// ===========================================================================
// Registry
// ===========================================================================

/// Frozen, validated prototype set. Shared read-only by every world.
#[derive(Debug, Clone, Default)]
pub struct Prototypes {
    prototypes: Vec<Prototype>,
    by_name: HashMap<String, PrototypeId>,
}

impl Prototypes {
    pub fn get(&self, id: PrototypeId) -> Option<&Prototype> {
        self.prototypes.get(id.0 as usize)
    }

    pub fn id(&self, name: &str) -> Option<PrototypeId> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&Prototype> {
        self.id(name).and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prototype> {
        self.prototypes.iter()
    }

    pub fn category(&self, id: PrototypeId) -> Option<Category> {
        self.get(id).map(|p| p.kind.category())
    }

    /// Stack size of an item prototype. Non-items stack to 1.
    pub fn stack_size(&self, item: PrototypeId) -> u32 {
        match self.get(item).map(|p| &p.kind) {
            Some(PrototypeKind::Item(i)) => i.stack_size,
            _ => 1,
        }
    }

    pub fn is_water(&self, tile: PrototypeId) -> bool {
        matches!(
            self.get(tile).map(|p| &p.kind),
            Some(PrototypeKind::Tile(TileProto { is_water: true }))
        )
    }

    /// Noise layers in registration order.
    pub fn noise_layers(&self) -> impl Iterator<Item = (&Prototype, &NoiseLayerProto)> {
        self.prototypes.iter().filter_map(|p| match &p.kind {
            PrototypeKind::NoiseLayer(n) => Some((p, n)),
            _ => None,
        })
    }

    /// Ticks one craft of `recipe` takes on a machine with `crafting_speed`.
    pub fn crafting_ticks(&self, recipe: &RecipeProto, crafting_speed: f64) -> Ticks {
        let seconds = recipe.crafting_time / crafting_speed;
        ticks_from_seconds(seconds).unwrap_or(1)
    }

    // -----------------------------------------------------------------------
    // Post-load validation
    // -----------------------------------------------------------------------

    fn validate(&self, proto: &Prototype) -> Result<(), PrototypeError> {
        let invalid = |reason: &str| PrototypeError::Invalid {
            name: proto.name.clone(),
            reason: reason.to_string(),
        };
        let ensure = |ok: bool, reason: &str| if ok { Ok(()) } else { Err(invalid(reason)) };

        match &proto.kind {
            PrototypeKind::Item(item) => ensure(item.stack_size > 0, "stack size must be > 0"),
            PrototypeKind::Tile(_) => Ok(()),
            PrototypeKind::Resource(res) => {
                self.expect_category(proto, res.product, Category::Item)?;
                ticks_from_seconds(res.pickup_time)
                    .map(|_| ())
                    .map_err(|e| invalid(&format!("pickup time: {e}")))
            }
            PrototypeKind::Recipe(recipe) => {
                ensure(recipe.product.1 > 0, "product count must be > 0")?;
                self.expect_category(proto, recipe.product.0, Category::Item)?;
                ensure(
                    recipe.product.1 <= self.stack_size(recipe.product.0),
                    "product count exceeds its stack size",
                )?;
                for (i, (item, count)) in recipe.ingredients.iter().enumerate() {
                    self.expect_category(proto, *item, Category::Item)?;
                    ensure(*count > 0, "ingredient count must be > 0")?;
                    // Each ingredient owns one machine slot.
                    ensure(
                        *count <= self.stack_size(*item),
                        "ingredient count exceeds its stack size",
                    )?;
                    ensure(
                        recipe.ingredients[..i].iter().all(|(other, _)| other != item),
                        "ingredient listed twice",
                    )?;
                }
                ticks_from_seconds(recipe.crafting_time)
                    .map(|_| ())
                    .map_err(|e| invalid(&format!("crafting time: {e}")))
            }
            PrototypeKind::NoiseLayer(layer) => {
                ensure(!layer.ranges.is_empty(), "noise layer needs at least one range")?;
                ensure(layer.octaves > 0, "octaves must be > 0")?;
                ensure(
                    matches!(layer.target, TileLayer::Base | TileLayer::Resource),
                    "noise layer must target the base or resource layer",
                )?;
                let expected = match layer.target {
                    TileLayer::Resource => Category::Resource,
                    _ => Category::Tile,
                };
                for (_, id) in &layer.ranges {
                    self.expect_category(proto, *id, expected)?;
                }
                if layer.target == TileLayer::Resource {
                    ensure(layer.richness > 0.0, "richness must be > 0")?;
                    ensure(layer.start_value < 1.0, "start value must be < 1")?;
                }
                Ok(())
            }
            PrototypeKind::Container(c) => {
                ensure(c.max_health > 0, "max health must be > 0")?;
                ensure(c.inventory_size > 0, "inventory size must be > 0")
            }
            PrototypeKind::TransportBelt(b) => {
                ensure(b.max_health > 0, "max health must be > 0")?;
                ensure(b.speed > Fixed64::ZERO, "speed must be > 0")
            }
            PrototypeKind::AssemblyMachine(a) => {
                ensure(a.max_health > 0, "max health must be > 0")?;
                ensure(a.crafting_speed > 0.0, "crafting speed must be > 0")
            }
            PrototypeKind::MiningDrill(d) => {
                ensure(d.max_health > 0, "max health must be > 0")?;
                ensure(d.mining_speed > 0.0, "mining speed must be > 0")
            }
            PrototypeKind::Inserter(i) => {
                ensure(i.max_health > 0, "max health must be > 0")?;
                ensure(i.tile_reach > 0, "tile reach must be > 0")?;
                ticks_from_seconds(i.swing_time)
                    .map(|_| ())
                    .map_err(|e| invalid(&format!("swing time: {e}")))
            }
        }
    }

    fn expect_category(
        &self,
        proto: &Prototype,
        id: PrototypeId,
        expected: Category,
    ) -> Result<(), PrototypeError> {
        if self.category(id) == Some(expected) {
            Ok(())
        } else {
            Err(PrototypeError::BadReference {
                name: proto.name.clone(),
                id,
                expected,
            })
        }
    }
}
