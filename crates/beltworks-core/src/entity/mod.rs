//! Entity behaviors, attached to prototypes through a capability table.
//!
//! Prototype records carry data only. What a category *does* on build,
//! remove, deferred notification and updates to watched tiles is looked up
//! here by [`Category`], one
//! static [`Capabilities`] entry per category. A `None` handler means the
//! category does not take part in that event.

pub mod assembly;
pub mod belt;
pub mod container;
pub mod drill;
pub mod inserter;
pub mod resource;

use crate::chunk::TileLayer;
use crate::coord::{Orientation, WorldCoord};
use crate::deferral::{DeferralEntry, ScheduleError};
use crate::id::PrototypeId;
use crate::prototype::{Category, Prototype, Prototypes};
use crate::relocation::TileLocation;
use crate::transport::TransportError;
use crate::update::TileEvent;
use crate::world::World;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by build, remove and entity configuration calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("chunk containing {0:?} is not generated")]
    ChunkAbsent(WorldCoord),
    #[error("{layer:?} layer at {coord:?} is occupied")]
    Occupied { coord: WorldCoord, layer: TileLayer },
    #[error("{layer:?} layer at {coord:?} is empty")]
    Empty { coord: WorldCoord, layer: TileLayer },
    #[error("unknown prototype {0:?}")]
    UnknownPrototype(PrototypeId),
    #[error("prototype '{0}' cannot be placed")]
    NotPlaceable(String),
    #[error("no {expected:?} at {coord:?}")]
    WrongEntity { coord: WorldCoord, expected: Category },
    #[error("{0:?} is not a recipe")]
    NotARecipe(PrototypeId),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// ---------------------------------------------------------------------------
// Capability table
// ---------------------------------------------------------------------------

/// Runs after the prototype reference is written to the tile layer. An error
/// makes the caller clear the layer again.
pub type BuildFn = fn(
    &mut World,
    &Prototypes,
    &Prototype,
    WorldCoord,
    TileLayer,
    Orientation,
) -> Result<(), BuildError>;

/// Runs before the tile layer is cleared.
pub type RemoveFn = fn(&mut World, &Prototypes, &Prototype, WorldCoord, TileLayer);

/// Runs when a deferral owned by a live instance of the category fires.
pub type DeferralFn = fn(&mut World, &Prototypes, &Prototype, TileLocation, &DeferralEntry);

/// Runs when a tile the instance listens on has something built on or
/// removed from it.
pub type TileUpdateFn = fn(&mut World, &Prototypes, &Prototype, TileLocation, TileEvent);

#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub on_build: Option<BuildFn>,
    pub on_remove: Option<RemoveFn>,
    pub on_deferral: Option<DeferralFn>,
    pub on_tile_update: Option<TileUpdateFn>,
}

impl Capabilities {
    /// Whether instances can be placed with `World::build`.
    pub fn placeable(&self) -> bool {
        self.on_build.is_some()
    }
}

static INERT: Capabilities = Capabilities {
    on_build: None,
    on_remove: None,
    on_deferral: None,
    on_tile_update: None,
};

static CONTAINER: Capabilities = Capabilities {
    on_build: Some(container::on_build),
    on_remove: None,
    on_deferral: None,
    on_tile_update: None,
};

static TRANSPORT_BELT: Capabilities = Capabilities {
    on_build: Some(belt::on_build),
    on_remove: Some(belt::on_remove),
    on_deferral: None,
    on_tile_update: None,
};

static ASSEMBLY_MACHINE: Capabilities = Capabilities {
    on_build: Some(assembly::on_build),
    on_remove: Some(assembly::on_remove),
    on_deferral: Some(assembly::on_deferral),
    on_tile_update: None,
};

static MINING_DRILL: Capabilities = Capabilities {
    on_build: Some(drill::on_build),
    on_remove: Some(drill::on_remove),
    on_deferral: Some(drill::on_deferral),
    on_tile_update: Some(drill::on_tile_update),
};

static INSERTER: Capabilities = Capabilities {
    on_build: Some(inserter::on_build),
    on_remove: Some(inserter::on_remove),
    on_deferral: Some(inserter::on_deferral),
    on_tile_update: Some(inserter::on_tile_update),
};

/// Behavior table entry for a category.
pub fn capabilities(category: Category) -> &'static Capabilities {
    match category {
        Category::Container => &CONTAINER,
        Category::TransportBelt => &TRANSPORT_BELT,
        Category::AssemblyMachine => &ASSEMBLY_MACHINE,
        Category::MiningDrill => &MINING_DRILL,
        Category::Inserter => &INSERTER,
        Category::Item
        | Category::Tile
        | Category::Resource
        | Category::Recipe
        | Category::NoiseLayer => &INERT,
    }
}

/// Prototype of the entity on the entity layer at `coord`.
pub(crate) fn entity_prototype<'p>(
    world: &World,
    prototypes: &'p Prototypes,
    coord: WorldCoord,
) -> Option<&'p Prototype> {
    let id = world.layer(coord, TileLayer::Entity)?.prototype?;
    prototypes.get(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_entities_are_placeable() {
        assert!(capabilities(Category::Container).placeable());
        assert!(capabilities(Category::TransportBelt).placeable());
        assert!(capabilities(Category::Inserter).placeable());
        assert!(!capabilities(Category::Item).placeable());
        assert!(!capabilities(Category::Resource).placeable());
        assert!(!capabilities(Category::Recipe).placeable());
    }

    #[test]
    fn passive_entities_take_no_deferrals() {
        assert!(capabilities(Category::Container).on_deferral.is_none());
        assert!(capabilities(Category::TransportBelt).on_deferral.is_none());
        assert!(capabilities(Category::AssemblyMachine).on_deferral.is_some());
    }

    #[test]
    fn drills_and_inserters_listen_on_tiles() {
        assert!(capabilities(Category::MiningDrill).on_tile_update.is_some());
        assert!(capabilities(Category::Inserter).on_tile_update.is_some());
        assert!(capabilities(Category::Container).on_tile_update.is_none());
    }
}
