use crate::chunk::TileLayer;
use crate::coord::WorldCoord;
use crate::entity::BuildError;
use crate::id::{PrototypeId, UniqueDataId};
use crate::prototype::{Category, Prototypes};
use crate::unique::ResourceData;
use crate::update::TileUpdate;
use crate::world::World;
use log::debug;

/// Place a deposit of `amount` on the resource layer, replacing whatever was
/// there, and wake listeners of the tile.
pub fn place_resource(
    world: &mut World,
    prototypes: &Prototypes,
    coord: WorldCoord,
    resource: PrototypeId,
    amount: u32,
) -> Result<UniqueDataId, BuildError> {
    if prototypes.category(resource) != Some(Category::Resource) {
        return Err(BuildError::UnknownPrototype(resource));
    }
    let slot = world
        .layer_mut(coord, TileLayer::Resource)
        .ok_or(BuildError::ChunkAbsent(coord))?;
    slot.prototype = Some(resource);
    let id = world.make_unique_data(coord, TileLayer::Resource, ResourceData { amount: amount.max(1) })?;
    world.dispatch_tile_update(prototypes, coord, TileLayer::Resource, TileUpdate::Placed);
    Ok(id)
}

/// Remaining amount at `coord`, 0 if there is no deposit.
pub fn amount_at(world: &World, coord: WorldCoord) -> u32 {
    world
        .get_unique_data::<ResourceData>(coord, TileLayer::Resource)
        .map_or(0, |r| r.amount)
}

/// Take one unit from the deposit at `coord`. An exhausted deposit is
/// cleared from the tile. Returns whether a unit was taken.
pub fn deplete(world: &mut World, coord: WorldCoord) -> bool {
    let Some(resource) = world.get_unique_data_mut::<ResourceData>(coord, TileLayer::Resource) else {
        return false;
    };
    if resource.amount == 0 {
        return false;
    }
    resource.amount -= 1;
    if resource.amount == 0 {
        debug!("resource at {coord:?} exhausted");
        world.clear_layer(coord, TileLayer::Resource);
    }
    true
}
