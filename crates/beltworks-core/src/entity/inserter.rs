//! Inserters move one item per swing from the tile behind them to the tile
//! in front. An empty hand only grabs an item the drop-off tile would take.
//!
//! An inserter swings only while entities stand on both its pickup and
//! drop-off tiles. Otherwise it idles, listening on both tiles, until
//! something is built there.

use crate::chunk::TileLayer;
use crate::coord::{Orientation, WorldCoord};
use crate::deferral::DeferralEntry;
use crate::entity::{BuildError, entity_prototype};
use crate::fixed::seconds_to_ticks;
use crate::logistics;
use crate::prototype::{Category, Prototype, PrototypeKind, Prototypes};
use crate::relocation::TileLocation;
use crate::unique::InserterData;
use crate::update::{TileEvent, TileUpdate};
use crate::world::World;
use log::{trace, warn};

const SWING: u64 = 0;

/// Pickup and drop-off tiles of an inserter at `coord`.
pub fn reach_tiles(coord: WorldCoord, orientation: Orientation, reach: u8) -> (WorldCoord, WorldCoord) {
    let reach = i32::from(reach);
    (
        coord.incremented(orientation, -reach),
        coord.incremented(orientation, reach),
    )
}

/// Whether both ends of the inserter's reach hold an entity.
fn has_endpoints(world: &World, prototypes: &Prototypes, pickup: WorldCoord, dropoff: WorldCoord) -> bool {
    entity_prototype(world, prototypes, pickup).is_some() && entity_prototype(world, prototypes, dropoff).is_some()
}

fn schedule_swing(world: &mut World, coord: WorldCoord, swing_time: f64) {
    let Some(owner) = world.unique_id(coord, TileLayer::Entity) else {
        return;
    };
    let ticks = seconds_to_ticks(swing_time).max(1);
    match world.schedule_deferral(owner, ticks, SWING) {
        Ok(handle) => {
            if let Some(data) = world.get_unique_data_mut::<InserterData>(coord, TileLayer::Entity) {
                data.swing = Some(handle);
            }
        }
        Err(e) => warn!("inserter at {coord:?} cannot schedule swing: {e}"),
    }
}

pub(crate) fn on_build(
    world: &mut World,
    prototypes: &Prototypes,
    proto: &Prototype,
    coord: WorldCoord,
    layer: TileLayer,
    orientation: Orientation,
) -> Result<(), BuildError> {
    let PrototypeKind::Inserter(inserter) = &proto.kind else {
        return Err(BuildError::WrongEntity {
            coord,
            expected: Category::Inserter,
        });
    };
    let id = world.make_unique_data(
        coord,
        layer,
        InserterData {
            orientation,
            held: None,
            swing: None,
        },
    )?;
    let (pickup, dropoff) = reach_tiles(coord, orientation, inserter.tile_reach);
    world.updates_mut().register(pickup, id);
    world.updates_mut().register(dropoff, id);
    if has_endpoints(world, prototypes, pickup, dropoff) {
        schedule_swing(world, coord, inserter.swing_time);
    }
    Ok(())
}

pub(crate) fn on_remove(
    world: &mut World,
    _prototypes: &Prototypes,
    proto: &Prototype,
    coord: WorldCoord,
    layer: TileLayer,
) {
    let Some(data) = world.get_unique_data::<InserterData>(coord, layer).cloned() else {
        return;
    };
    if let Some(handle) = data.swing {
        world.cancel_deferral(handle);
    }
    if let (PrototypeKind::Inserter(inserter), Some(id)) = (&proto.kind, world.unique_id(coord, layer)) {
        let (pickup, dropoff) = reach_tiles(coord, data.orientation, inserter.tile_reach);
        world.updates_mut().unregister(pickup, id);
        world.updates_mut().unregister(dropoff, id);
    }
}

pub(crate) fn on_tile_update(
    world: &mut World,
    prototypes: &Prototypes,
    proto: &Prototype,
    location: TileLocation,
    event: TileEvent,
) {
    let PrototypeKind::Inserter(inserter) = &proto.kind else {
        return;
    };
    if event.layer != TileLayer::Entity || event.update != TileUpdate::Placed {
        return;
    }
    let coord = location.coord;
    let Some(data) = world.get_unique_data::<InserterData>(coord, location.layer) else {
        return;
    };
    if data.swing.is_some() {
        return;
    }
    let (pickup, dropoff) = reach_tiles(coord, data.orientation, inserter.tile_reach);
    if has_endpoints(world, prototypes, pickup, dropoff) {
        trace!("inserter at {coord:?} woken by {:?}", event.coord);
        schedule_swing(world, coord, inserter.swing_time);
    }
}

pub(crate) fn on_deferral(
    world: &mut World,
    prototypes: &Prototypes,
    proto: &Prototype,
    location: TileLocation,
    entry: &DeferralEntry,
) {
    let PrototypeKind::Inserter(inserter) = &proto.kind else {
        return;
    };
    if entry.payload != SWING {
        return;
    }
    let coord = location.coord;
    let Some(data) = world.get_unique_data_mut::<InserterData>(coord, location.layer) else {
        return;
    };
    data.swing = None;
    let held = data.held;
    let (pickup, dropoff) = reach_tiles(coord, data.orientation, inserter.tile_reach);

    let held_after = match held {
        Some(item) => match logistics::insert_item(world, prototypes, dropoff, item) {
            Ok(()) => None,
            Err(e) => {
                trace!("inserter at {coord:?} waiting to drop: {e}");
                Some(item)
            }
        },
        None => {
            let grab = logistics::peek_item(world, prototypes, pickup)
                .is_some_and(|item| logistics::can_accept(world, prototypes, dropoff, item));
            if grab {
                logistics::pick_up_item(world, prototypes, pickup)
            } else {
                None
            }
        }
    };

    if let Some(data) = world.get_unique_data_mut::<InserterData>(coord, location.layer) {
        data.held = held_after;
    }
    if has_endpoints(world, prototypes, pickup, dropoff) {
        schedule_swing(world, coord, inserter.swing_time);
    } else {
        trace!("inserter at {coord:?} lost an endpoint, idling");
    }
}
