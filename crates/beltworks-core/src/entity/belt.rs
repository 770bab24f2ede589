//! Transport belt placement.
//!
//! A straight run of same-speed belts facing the same way shares one
//! [`Segment`], one unit of length per tile. Placing a belt extends the run
//! behind or ahead of it, joining both when it fills the gap between them;
//! removing one cuts the run in two. The end of a run links to the belt it
//! points at (head-on or from the side), and belts pointing into a new tile
//! are relinked to it, so no separate rebuild pass is needed.

use crate::chunk::TileLayer;
use crate::coord::{Orientation, WorldCoord};
use crate::entity::BuildError;
use crate::fixed::Fixed64;
use crate::id::SegmentId;
use crate::prototype::{Category, Prototype, PrototypeKind, Prototypes};
use crate::transport::{InsertSide, Segment, TransportError};
use crate::unique::BeltData;
use crate::world::World;
use log::{trace, warn};

/// How a belt facing `source` feeds a belt facing `target`. Head-on belts
/// do not connect.
pub fn insert_side(source: Orientation, target: Orientation) -> Option<InsertSide> {
    if source == target {
        Some(InsertSide::Straight)
    } else if source == target.rotate_cw() {
        Some(InsertSide::Left)
    } else if source == target.rotate_ccw() {
        Some(InsertSide::Right)
    } else {
        None
    }
}

/// The belt on the entity layer at `coord`, if any.
pub fn belt_at(world: &World, coord: WorldCoord) -> Option<&BeltData> {
    world.get_unique_data::<BeltData>(coord, TileLayer::Entity)
}

/// Segment of the belt at `coord`.
pub fn segment_at(world: &World, coord: WorldCoord) -> Option<SegmentId> {
    belt_at(world, coord).map(|b| b.segment)
}

/// Segment of the belt at `coord` and the offset where its tile begins.
pub fn tile_span(world: &World, coord: WorldCoord) -> Option<(SegmentId, Fixed64)> {
    belt_at(world, coord).map(|b| (b.segment, tile_start(b.index)))
}

fn tile_start(index: u32) -> Fixed64 {
    Fixed64::from_num(index)
}

/// Length of a segment in tiles.
fn run_tiles(world: &World, segment: SegmentId) -> u32 {
    world
        .transport()
        .get(segment)
        .map_or(0, |s| s.length().to_num::<u32>())
}

/// The belt at `coord` if it would continue a run facing `orientation` at
/// `speed`.
fn run_neighbor(world: &World, coord: WorldCoord, orientation: Orientation, speed: Fixed64) -> Option<BeltData> {
    belt_at(world, coord)
        .filter(|b| b.orientation == orientation)
        .filter(|b| world.transport().get(b.segment).is_some_and(|s| s.speed() == speed))
        .cloned()
}

/// Point `count` consecutive belt tiles, starting at `first`, at
/// `segment` with indices counting up from `start_index`.
fn reindex(
    world: &mut World,
    first: WorldCoord,
    orientation: Orientation,
    count: u32,
    segment: SegmentId,
    start_index: u32,
) {
    let mut at = first;
    for index in start_index..start_index + count {
        if let Some(belt) = world.get_unique_data_mut::<BeltData>(at, TileLayer::Entity) {
            belt.segment = segment;
            belt.index = index;
        }
        at = at.incremented(orientation, 1);
    }
}

pub(crate) fn on_build(
    world: &mut World,
    _prototypes: &Prototypes,
    proto: &Prototype,
    coord: WorldCoord,
    layer: TileLayer,
    orientation: Orientation,
) -> Result<(), BuildError> {
    let PrototypeKind::TransportBelt(belt) = &proto.kind else {
        return Err(BuildError::WrongEntity {
            coord,
            expected: Category::TransportBelt,
        });
    };

    let ahead = coord.incremented(orientation, 1);
    let upstream = run_neighbor(world, coord.incremented(orientation, -1), orientation, belt.speed);
    let downstream = run_neighbor(world, ahead, orientation, belt.speed);

    let (segment, index) = match (upstream, downstream) {
        (Some(up), Some(down)) => {
            let up_tiles = run_tiles(world, up.segment);
            let down_tiles = run_tiles(world, down.segment);
            world.transport_mut().join(up.segment, down.segment, Fixed64::ONE)?;
            reindex(world, ahead, orientation, down_tiles, up.segment, up_tiles + 1);
            (up.segment, up_tiles)
        }
        (Some(up), None) => {
            let up_tiles = run_tiles(world, up.segment);
            world.transport_mut().grow_end(up.segment, Fixed64::ONE)?;
            (up.segment, up_tiles)
        }
        (None, Some(down)) => {
            let down_tiles = run_tiles(world, down.segment);
            world.transport_mut().grow_start(down.segment, Fixed64::ONE)?;
            reindex(world, ahead, orientation, down_tiles, down.segment, 1);
            (down.segment, 0)
        }
        (None, None) => {
            let segment = world
                .transport_mut()
                .register(Segment::new(Fixed64::ONE, belt.speed, orientation));
            (segment, 0)
        }
    };

    let data = BeltData {
        segment,
        orientation,
        index,
    };
    if let Err(e) = world.make_unique_data(coord, layer, data.clone()) {
        detach(world, coord, &data);
        return Err(e);
    }
    if let Err(e) = link(world, coord, &data) {
        detach(world, coord, &data);
        return Err(e.into());
    }
    trace!("belt {coord:?} is tile {index} of {segment:?}");
    Ok(())
}

/// Link the new tile's run to what it points at, and belts pointing into
/// the tile to its run.
fn link(world: &mut World, coord: WorldCoord, data: &BeltData) -> Result<(), TransportError> {
    let orientation = data.orientation;

    // Downstream: only the last tile of a run has a target.
    if data.index + 1 == run_tiles(world, data.segment) {
        let ahead = coord.incremented(orientation, 1);
        if let Some(next) = belt_at(world, ahead).cloned()
            && let Some(side) = insert_side(orientation, next.orientation)
        {
            world
                .transport_mut()
                .set_target_at(data.segment, Some(next.segment), side, tile_start(next.index))?;
            trace!("belt {coord:?} feeds {ahead:?} ({side:?})");
        }
    }

    // Upstream: neighbors pointing into this tile from another run.
    for direction in Orientation::all() {
        let neighbor = coord.incremented(direction, 1);
        let Some(source) = belt_at(world, neighbor).cloned() else {
            continue;
        };
        if source.segment == data.segment || neighbor.incremented(source.orientation, 1) != coord {
            continue;
        }
        if let Some(side) = insert_side(source.orientation, orientation) {
            world.transport_mut().set_target_at(
                source.segment,
                Some(data.segment),
                side,
                tile_start(data.index),
            )?;
            trace!("belt {neighbor:?} feeds {coord:?} ({side:?})");
        }
    }
    Ok(())
}

/// Cut the tile out of its run. Items on the tile are lost; the run behind
/// it is left without a target.
fn detach(world: &mut World, coord: WorldCoord, data: &BeltData) {
    let tiles = run_tiles(world, data.segment);
    match world
        .transport_mut()
        .cut(data.segment, tile_start(data.index), Fixed64::ONE)
    {
        Ok(cut) => {
            if let Some(tail) = cut.downstream {
                let ahead = coord.incremented(data.orientation, 1);
                let count = tiles.saturating_sub(data.index + 1);
                reindex(world, ahead, data.orientation, count, tail, 0);
            }
        }
        Err(e) => warn!("belt at {coord:?} could not leave {:?}: {e}", data.segment),
    }
}

pub(crate) fn on_remove(
    world: &mut World,
    _prototypes: &Prototypes,
    _proto: &Prototype,
    coord: WorldCoord,
    layer: TileLayer,
) {
    if let Some(data) = world.get_unique_data::<BeltData>(coord, layer).cloned() {
        detach(world, coord, &data);
    }
}
