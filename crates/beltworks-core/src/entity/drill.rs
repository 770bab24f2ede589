//! Mining drills.
//!
//! A drill mines the first non-empty resource tile in its radius (row-major
//! scan). Each cycle lasts `pickup_time / mining_speed` and ends with one
//! product offered to the tile in front of the drill. The deposit only loses
//! a unit once the output is accepted; a full output is retried every tick.
//!
//! With nothing to mine, or no entity in front to take the product, the
//! drill goes idle. It listens on its output tile and mining area, and
//! wakes when a deposit is placed or an output entity is built. Losing the
//! output entity cancels the running cycle.

use crate::chunk::TileLayer;
use crate::coord::{Orientation, WorldCoord};
use crate::deferral::DeferralEntry;
use crate::entity::{BuildError, entity_prototype, resource};
use crate::fixed::seconds_to_ticks;
use crate::id::PrototypeId;
use crate::logistics;
use crate::prototype::{Category, MiningDrillProto, Prototype, PrototypeKind, Prototypes, ResourceProto};
use crate::relocation::TileLocation;
use crate::unique::{MiningDrillData, ResourceData};
use crate::update::{TileEvent, TileUpdate};
use crate::world::World;
use log::{debug, trace, warn};

const MINE: u64 = 0;
const RETRY_OUTPUT: u64 = 1;

fn resource_proto<'p>(
    world: &World,
    prototypes: &'p Prototypes,
    coord: WorldCoord,
) -> Option<&'p ResourceProto> {
    let id = world.layer(coord, TileLayer::Resource)?.prototype?;
    match &prototypes.get(id)?.kind {
        PrototypeKind::Resource(r) => Some(r),
        _ => None,
    }
}

/// Tiles within `radius` of `center`, row by row.
fn mining_area(center: WorldCoord, radius: u8) -> impl Iterator<Item = WorldCoord> {
    let r = i32::from(radius);
    (-r..=r).flat_map(move |dy| (-r..=r).map(move |dx| WorldCoord::new(center.x + dx, center.y + dy)))
}

/// Tiles a drill listens on: its output and its mining area.
fn watched_tiles(coord: WorldCoord, orientation: Orientation, radius: u8) -> impl Iterator<Item = WorldCoord> {
    std::iter::once(coord.incremented(orientation, 1)).chain(mining_area(coord, radius))
}

/// First tile within `radius` of `center` holding a non-empty deposit.
pub fn find_resource(world: &World, center: WorldCoord, radius: u8) -> Option<WorldCoord> {
    mining_area(center, radius).find(|&c| {
        world
            .get_unique_data::<ResourceData>(c, TileLayer::Resource)
            .is_some_and(|res| res.amount > 0)
    })
}

/// Tile the drill at `coord` outputs into.
pub fn output_tile(world: &World, coord: WorldCoord) -> Option<WorldCoord> {
    world
        .get_unique_data::<MiningDrillData>(coord, TileLayer::Entity)
        .map(|d| coord.incremented(d.orientation, 1))
}

pub(crate) fn on_build(
    world: &mut World,
    prototypes: &Prototypes,
    proto: &Prototype,
    coord: WorldCoord,
    layer: TileLayer,
    orientation: Orientation,
) -> Result<(), BuildError> {
    let PrototypeKind::MiningDrill(drill) = &proto.kind else {
        return Err(BuildError::WrongEntity {
            coord,
            expected: Category::MiningDrill,
        });
    };
    let id = world.make_unique_data(
        coord,
        layer,
        MiningDrillData {
            orientation,
            resource: None,
            pending_output: None,
            cycle: None,
        },
    )?;
    for tile in watched_tiles(coord, orientation, drill.mining_radius) {
        world.updates_mut().register(tile, id);
    }
    start_cycle(world, prototypes, coord);
    Ok(())
}

pub(crate) fn on_remove(
    world: &mut World,
    _prototypes: &Prototypes,
    proto: &Prototype,
    coord: WorldCoord,
    layer: TileLayer,
) {
    let Some(data) = world.get_unique_data::<MiningDrillData>(coord, layer).cloned() else {
        return;
    };
    if let Some(handle) = data.cycle {
        world.cancel_deferral(handle);
    }
    if let (PrototypeKind::MiningDrill(drill), Some(id)) = (&proto.kind, world.unique_id(coord, layer)) {
        for tile in watched_tiles(coord, data.orientation, drill.mining_radius) {
            world.updates_mut().unregister(tile, id);
        }
    }
}

fn drill_proto<'p>(world: &World, prototypes: &'p Prototypes, coord: WorldCoord) -> Option<&'p MiningDrillProto> {
    match &entity_prototype(world, prototypes, coord)?.kind {
        PrototypeKind::MiningDrill(drill) => Some(drill),
        _ => None,
    }
}

/// Whether an entity stands on the drill's output tile.
fn has_output(world: &World, prototypes: &Prototypes, coord: WorldCoord) -> bool {
    output_tile(world, coord).is_some_and(|out| entity_prototype(world, prototypes, out).is_some())
}

/// Begin a mining cycle on the nearest deposit. Returns `false` (idle) when
/// the drill is busy, has no output entity, or nothing is left to mine.
pub fn start_cycle(world: &mut World, prototypes: &Prototypes, coord: WorldCoord) -> bool {
    let Some(drill) = drill_proto(world, prototypes, coord) else {
        return false;
    };
    let Some(owner) = world.unique_id(coord, TileLayer::Entity) else {
        return false;
    };
    if world
        .get_unique_data::<MiningDrillData>(coord, TileLayer::Entity)
        .is_none_or(|d| d.cycle.is_some())
    {
        return false;
    }
    if !has_output(world, prototypes, coord) {
        debug!("mining drill at {coord:?} has no output, idling");
        return false;
    }

    let target = find_resource(world, coord, drill.mining_radius);
    let pickup_time = target.and_then(|t| resource_proto(world, prototypes, t)).map(|r| r.pickup_time);
    let (Some(target), Some(pickup_time)) = (target, pickup_time) else {
        debug!("mining drill at {coord:?} has nothing to mine");
        if let Some(d) = world.get_unique_data_mut::<MiningDrillData>(coord, TileLayer::Entity) {
            d.resource = None;
        }
        return false;
    };

    let ticks = seconds_to_ticks(pickup_time / drill.mining_speed).max(1);
    let handle = match world.schedule_deferral(owner, ticks, MINE) {
        Ok(handle) => handle,
        Err(e) => {
            warn!("mining drill at {coord:?} cannot schedule cycle: {e}");
            return false;
        }
    };
    if let Some(d) = world.get_unique_data_mut::<MiningDrillData>(coord, TileLayer::Entity) {
        d.resource = Some(target);
        d.cycle = Some(handle);
    }
    true
}

/// Offer the pending product to the output tile. On success the deposit
/// loses a unit and the next cycle starts. A refusing output is retried next
/// tick; a missing one leaves the drill idle holding the product.
fn try_output(world: &mut World, prototypes: &Prototypes, coord: WorldCoord, item: PrototypeId) {
    let Some(out) = output_tile(world, coord) else {
        return;
    };

    if logistics::insert_item(world, prototypes, out, item).is_ok() {
        let source = world
            .get_unique_data_mut::<MiningDrillData>(coord, TileLayer::Entity)
            .and_then(|d| {
                d.pending_output = None;
                d.resource
            });
        if let Some(source) = source {
            resource::deplete(world, source);
        }
        start_cycle(world, prototypes, coord);
        return;
    }

    if entity_prototype(world, prototypes, out).is_none() {
        debug!("mining drill at {coord:?} lost its output, idling");
        return;
    }
    trace!("mining drill at {coord:?} output blocked");
    let Some(owner) = world.unique_id(coord, TileLayer::Entity) else {
        return;
    };
    match world.schedule_deferral(owner, 1, RETRY_OUTPUT) {
        Ok(handle) => {
            if let Some(d) = world.get_unique_data_mut::<MiningDrillData>(coord, TileLayer::Entity) {
                d.cycle = Some(handle);
            }
        }
        Err(e) => warn!("mining drill at {coord:?} cannot schedule retry: {e}"),
    }
}

pub(crate) fn on_deferral(
    world: &mut World,
    prototypes: &Prototypes,
    _proto: &Prototype,
    location: TileLocation,
    entry: &DeferralEntry,
) {
    let coord = location.coord;
    let Some(drill) = world.get_unique_data_mut::<MiningDrillData>(coord, location.layer) else {
        return;
    };
    drill.cycle = None;
    let resource = drill.resource;
    let pending = drill.pending_output;

    match entry.payload {
        MINE => {
            let product = resource
                .filter(|&r| resource::amount_at(world, r) > 0)
                .and_then(|r| resource_proto(world, prototypes, r))
                .map(|r| r.product);
            let Some(product) = product else {
                // Deposit vanished mid-cycle; look for another.
                start_cycle(world, prototypes, coord);
                return;
            };
            if let Some(d) = world.get_unique_data_mut::<MiningDrillData>(coord, location.layer) {
                d.pending_output = Some(product);
            }
            try_output(world, prototypes, coord, product);
        }
        RETRY_OUTPUT => match pending {
            Some(item) => try_output(world, prototypes, coord, item),
            None => {
                start_cycle(world, prototypes, coord);
            }
        },
        other => trace!("mining drill at {coord:?} ignoring payload {other}"),
    }
}

pub(crate) fn on_tile_update(
    world: &mut World,
    prototypes: &Prototypes,
    _proto: &Prototype,
    location: TileLocation,
    event: TileEvent,
) {
    let coord = location.coord;
    let Some(drill) = world.get_unique_data::<MiningDrillData>(coord, location.layer) else {
        return;
    };
    let at_output = event.layer == TileLayer::Entity && event.coord == coord.incremented(drill.orientation, 1);
    let (cycle, pending) = (drill.cycle, drill.pending_output);

    match event.update {
        TileUpdate::Removed if at_output => {
            if let Some(handle) = cycle {
                world.cancel_deferral(handle);
                if let Some(d) = world.get_unique_data_mut::<MiningDrillData>(coord, location.layer) {
                    d.cycle = None;
                }
                debug!("mining drill at {coord:?} output removed, cycle cancelled");
            }
        }
        TileUpdate::Placed if at_output || event.layer == TileLayer::Resource => {
            if cycle.is_some() {
                return;
            }
            trace!("mining drill at {coord:?} woken by {event:?}");
            match pending {
                Some(item) => try_output(world, prototypes, coord, item),
                None => {
                    start_cycle(world, prototypes, coord);
                }
            }
        }
        _ => {}
    }
}
