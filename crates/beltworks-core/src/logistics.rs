//! Item hand-over between entities.
//!
//! Drills and inserters do not know what sits on the tile they feed or pull
//! from. These helpers dispatch on the entity-layer category of the target
//! tile: containers use their inventory, belts the stretch of their segment
//! under the tile, assembly
//! machines their ingredient (in) and product (out) inventories.

use crate::chunk::TileLayer;
use crate::coord::WorldCoord;
use crate::entity::{assembly, belt, entity_prototype};
use crate::fixed::Fixed64;
use crate::id::PrototypeId;
use crate::inventory::InventoryError;
use crate::prototype::{Category, Prototypes};
use crate::transport::TransportError;
use crate::unique::{AssemblyMachineData, ContainerData};
use crate::world::World;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogisticsError {
    #[error("no entity at {0:?}")]
    NoEntity(WorldCoord),
    #[error("entity at {coord:?} does not accept {item:?}")]
    Rejected { coord: WorldCoord, item: PrototypeId },
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Where on a belt tile dropped items land: the middle of the tile that
/// starts at `start`.
fn belt_drop_offset(start: Fixed64) -> Fixed64 {
    start + Fixed64::ONE / 2
}

fn category_at(world: &World, prototypes: &Prototypes, coord: WorldCoord) -> Option<Category> {
    entity_prototype(world, prototypes, coord).map(|p| p.kind.category())
}

/// Whether the entity at `coord` would take one `item` right now.
pub fn can_accept(world: &World, prototypes: &Prototypes, coord: WorldCoord, item: PrototypeId) -> bool {
    match category_at(world, prototypes, coord) {
        Some(Category::Container) => world
            .get_unique_data::<ContainerData>(coord, TileLayer::Entity)
            .is_some_and(|c| c.inventory.can_add(item, 1, prototypes.stack_size(item))),
        Some(Category::TransportBelt) => belt::tile_span(world, coord)
            .and_then(|(segment, start)| world.transport().get(segment).map(|s| (s, start)))
            .is_some_and(|(s, start)| s.can_insert(belt_drop_offset(start), world.transport().spacing())),
        Some(Category::AssemblyMachine) => assembly::accepts_ingredient(world, prototypes, coord, item),
        _ => false,
    }
}

/// Give one `item` to the entity at `coord`.
pub fn insert_item(
    world: &mut World,
    prototypes: &Prototypes,
    coord: WorldCoord,
    item: PrototypeId,
) -> Result<(), LogisticsError> {
    match category_at(world, prototypes, coord) {
        Some(Category::Container) => {
            let chest = world
                .get_unique_data_mut::<ContainerData>(coord, TileLayer::Entity)
                .ok_or(LogisticsError::NoEntity(coord))?;
            chest.inventory.try_add(item, 1, prototypes.stack_size(item))?;
            Ok(())
        }
        Some(Category::TransportBelt) => {
            let (segment, start) = belt::tile_span(world, coord).ok_or(LogisticsError::NoEntity(coord))?;
            world
                .transport_mut()
                .insert_item(segment, item, belt_drop_offset(start))?;
            Ok(())
        }
        Some(Category::AssemblyMachine) => {
            if !assembly::accepts_ingredient(world, prototypes, coord, item) {
                return Err(LogisticsError::Rejected { coord, item });
            }
            let machine = world
                .get_unique_data_mut::<AssemblyMachineData>(coord, TileLayer::Entity)
                .ok_or(LogisticsError::NoEntity(coord))?;
            machine
                .ingredients
                .try_add(item, 1, prototypes.stack_size(item))?;
            assembly::try_begin_crafting(world, prototypes, coord);
            Ok(())
        }
        Some(_) => Err(LogisticsError::Rejected { coord, item }),
        None => Err(LogisticsError::NoEntity(coord)),
    }
}

/// The item [`pick_up_item`] would return, without taking it.
pub fn peek_item(world: &World, prototypes: &Prototypes, coord: WorldCoord) -> Option<PrototypeId> {
    match category_at(world, prototypes, coord)? {
        Category::Container => world
            .get_unique_data::<ContainerData>(coord, TileLayer::Entity)?
            .inventory
            .first_item(),
        Category::TransportBelt => {
            let (segment, start) = belt::tile_span(world, coord)?;
            world
                .transport()
                .get(segment)?
                .lead_in(start, start + Fixed64::ONE)
                .map(|i| i.item)
        }
        Category::AssemblyMachine => world
            .get_unique_data::<AssemblyMachineData>(coord, TileLayer::Entity)?
            .product
            .first_item(),
        _ => None,
    }
}

/// Take one item out of the entity at `coord`. Belts give up the item
/// furthest along on that tile; assembly machines their product.
pub fn pick_up_item(world: &mut World, prototypes: &Prototypes, coord: WorldCoord) -> Option<PrototypeId> {
    match category_at(world, prototypes, coord)? {
        Category::Container => {
            let chest = world.get_unique_data_mut::<ContainerData>(coord, TileLayer::Entity)?;
            let item = chest.inventory.first_item()?;
            chest.inventory.remove(item, 1).ok()?;
            Some(item)
        }
        Category::TransportBelt => {
            let (segment, start) = belt::tile_span(world, coord)?;
            world
                .transport_mut()
                .take_lead_in(segment, start, start + Fixed64::ONE)
                .map(|i| i.item)
        }
        Category::AssemblyMachine => {
            let machine = world.get_unique_data_mut::<AssemblyMachineData>(coord, TileLayer::Entity)?;
            let item = machine.product.first_item()?;
            machine.product.remove(item, 1).ok()?;
            // Freed product space may unblock the next craft.
            assembly::try_begin_crafting(world, prototypes, coord);
            Some(item)
        }
        _ => None,
    }
}
