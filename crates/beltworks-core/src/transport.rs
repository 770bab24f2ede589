//! Transport line engine: belt segments as 1D ordered item queues.
//!
//! A [`Segment`] holds items sorted by offset (ascending; the back of the
//! queue is the lead item closest to the segment end). Segments live in a
//! slotmap arena owned by [`TransportLines`] and are updated in registration
//! order, one tick at a time:
//!
//! 1. **Advance**: every item moves forward by the segment speed, clamped to
//!    the item ahead minus the spacing. Items never move backward.
//! 2. **Hand-off**: a lead item that reached the segment end moves to the
//!    source's landing offset on the downstream segment (0 for a head-on
//!    feed, the tile start for a side-load) if there is room there.
//!    Otherwise it stalls at `length - ε` and the queue behind it backs up.
//! 3. **Merge arbitration**: when several sources have a ready lead for the
//!    same landing point in one tick, the source served last yields (round
//!    robin). A source with nothing ready never blocks the others.
//!
//! A straight belt run is one segment, one unit of length per tile. Runs
//! grow, join and get cut as belts are placed and removed; see
//! [`TransportLines::grow_start`], [`TransportLines::join`] and
//! [`TransportLines::cut`]. Belt curvature is a placement/rendering
//! concern; the queue is always 1D.

use crate::coord::Orientation;
use crate::fixed::{Fixed64, f64_to_fixed64};
use crate::id::{PrototypeId, SegmentId};
use log::trace;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::{HashMap, VecDeque};

/// Distance a stalled lead item keeps from the segment end.
pub const STALL_EPSILON: Fixed64 = Fixed64::DELTA;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// World-wide transport constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Minimum distance between two items on one segment.
    pub spacing: Fixed64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            spacing: f64_to_fixed64(0.25),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised when placing an item on a segment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("segment is full ({capacity} items)")]
    SegmentFull { capacity: usize },
    #[error("no room at offset {offset}: an item is closer than the minimum spacing")]
    NoRoom { offset: Fixed64 },
    #[error("offset {offset} outside segment of length {length}")]
    OffsetOutOfRange { offset: Fixed64, length: Fixed64 },
    #[error("unknown segment {0:?}")]
    UnknownSegment(SegmentId),
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// Which side of the downstream segment a segment feeds into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InsertSide {
    /// Feeds the downstream segment head-on.
    #[default]
    Straight,
    /// Side-loads from the downstream's left.
    Left,
    /// Side-loads from the downstream's right.
    Right,
}

/// An item riding a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeltItem {
    pub item: PrototypeId,
    pub offset: Fixed64,
}

/// A contiguous belt run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub direction: Orientation,
    length: Fixed64,
    speed: Fixed64,
    /// Sorted by ascending offset. The back is the lead item.
    items: VecDeque<BeltItem>,
    /// Downstream segment receiving this segment's lead item.
    pub target: Option<SegmentId>,
    /// Side of `target` this segment feeds.
    pub side: InsertSide,
    /// Offset on `target` where handed-off items land.
    pub landing: Fixed64,
    /// Upstream source that won the last hand-off into this segment.
    last_served: Option<SegmentId>,
}

impl Segment {
    pub fn new(length: Fixed64, speed: Fixed64, direction: Orientation) -> Self {
        Self {
            direction,
            length,
            speed,
            items: VecDeque::new(),
            target: None,
            side: InsertSide::Straight,
            landing: Fixed64::ZERO,
            last_served: None,
        }
    }

    pub fn length(&self) -> Fixed64 {
        self.length
    }

    pub fn speed(&self) -> Fixed64 {
        self.speed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items from the segment start toward the end.
    pub fn items(&self) -> impl DoubleEndedIterator<Item = &BeltItem> {
        self.items.iter()
    }

    /// The item closest to the segment end.
    pub fn lead(&self) -> Option<&BeltItem> {
        self.items.back()
    }

    pub fn last_served(&self) -> Option<SegmentId> {
        self.last_served
    }

    /// Maximum number of items that fit with `spacing` between them.
    pub fn capacity(&self, spacing: Fixed64) -> usize {
        if spacing <= Fixed64::ZERO {
            return usize::MAX;
        }
        self.length.checked_div(spacing).map_or(0, |n| n.ceil().to_num::<usize>())
    }

    /// Whether an item can enter at offset 0 by hand-off.
    pub fn has_room_at_start(&self, spacing: Fixed64) -> bool {
        self.has_room_at(Fixed64::ZERO, spacing)
    }

    /// Whether a handed-off item can land at `offset`: the item behind is at
    /// least `spacing` back and the item ahead strictly more than `spacing`
    /// forward.
    pub fn has_room_at(&self, offset: Fixed64, spacing: Fixed64) -> bool {
        if offset < Fixed64::ZERO || offset >= self.length {
            return false;
        }
        let index = self.items.partition_point(|i| i.offset < offset);
        let behind_ok = index == 0 || offset - self.items[index - 1].offset >= spacing;
        let ahead_ok = self.items.get(index).is_none_or(|i| i.offset - offset > spacing);
        behind_ok && ahead_ok
    }

    /// The item furthest along within `[start, end)`.
    pub fn lead_in(&self, start: Fixed64, end: Fixed64) -> Option<&BeltItem> {
        let index = self.items.partition_point(|i| i.offset < end);
        index
            .checked_sub(1)
            .and_then(|i| self.items.get(i))
            .filter(|i| i.offset >= start)
    }

    /// Place `item` at `offset`, keeping at least `spacing` to both
    /// neighbors. Existing items are untouched on failure.
    pub fn insert(
        &mut self,
        item: PrototypeId,
        offset: Fixed64,
        spacing: Fixed64,
    ) -> Result<(), TransportError> {
        let index = self.insertion_index(offset, spacing)?;
        self.items.insert(index, BeltItem { item, offset });
        Ok(())
    }

    /// Whether [`insert`](Self::insert) at `offset` would succeed.
    pub fn can_insert(&self, offset: Fixed64, spacing: Fixed64) -> bool {
        self.insertion_index(offset, spacing).is_ok()
    }

    fn insertion_index(&self, offset: Fixed64, spacing: Fixed64) -> Result<usize, TransportError> {
        if offset < Fixed64::ZERO || offset >= self.length {
            return Err(TransportError::OffsetOutOfRange {
                offset,
                length: self.length,
            });
        }
        let capacity = self.capacity(spacing);
        if self.items.len() >= capacity {
            return Err(TransportError::SegmentFull { capacity });
        }

        let index = self.items.partition_point(|i| i.offset < offset);
        let behind_ok = index == 0 || offset - self.items[index - 1].offset >= spacing;
        let ahead_ok = index == self.items.len() || self.items[index].offset - offset >= spacing;
        if !(behind_ok && ahead_ok) {
            return Err(TransportError::NoRoom { offset });
        }
        Ok(index)
    }

    /// Remove and return the lead item.
    pub fn take_lead(&mut self) -> Option<BeltItem> {
        self.items.pop_back()
    }

    /// Remove and return the item furthest along within `[start, end)`.
    pub fn take_lead_in(&mut self, start: Fixed64, end: Fixed64) -> Option<BeltItem> {
        let index = self.items.partition_point(|i| i.offset < end).checked_sub(1)?;
        if self.items.get(index)?.offset < start {
            return None;
        }
        self.items.remove(index)
    }

    fn land(&mut self, item: PrototypeId, offset: Fixed64) {
        let index = self.items.partition_point(|i| i.offset < offset);
        self.items.insert(index, BeltItem { item, offset });
    }

    /// Move items forward by one tick. Returns `true` when the lead item
    /// reached the segment end and is waiting for a hand-off.
    fn advance(&mut self, spacing: Fixed64, has_target: bool) -> bool {
        let end = self.length;
        let stall = end - STALL_EPSILON;
        let mut limit = if has_target { end } else { stall };

        for belt_item in self.items.iter_mut().rev() {
            let desired = belt_item.offset.saturating_add(self.speed);
            let moved = desired.min(limit).max(belt_item.offset);
            belt_item.offset = moved;
            // A ready lead may still stall, so trailing items keep their
            // distance from the stall position.
            limit = moved.min(stall) - spacing;
        }

        has_target && self.items.back().is_some_and(|lead| lead.offset >= end)
    }

    /// Pull a waiting lead item back to the stall position.
    fn stall(&mut self) {
        let stall = self.length - STALL_EPSILON;
        if let Some(lead) = self.items.back_mut()
            && lead.offset > stall
        {
            lead.offset = stall;
        }
    }
}

// ---------------------------------------------------------------------------
// TransportLines
// ---------------------------------------------------------------------------

/// Segments left over by [`TransportLines::cut`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CutResult {
    /// Holds `[0, start)`; always the original id.
    pub upstream: Option<SegmentId>,
    /// Holds what was `[start + len, length)`, re-based to offset 0.
    pub downstream: Option<SegmentId>,
}

/// Counters from one [`TransportLines::update`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportTickReport {
    /// Segments that had at least one item.
    pub active_segments: usize,
    pub handoffs: usize,
    pub stalls: usize,
}

/// Arena of all transport segments plus their update order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportLines {
    config: TransportConfig,
    segments: SlotMap<SegmentId, Segment>,
    /// Registration order. Updates walk this list.
    order: Vec<SegmentId>,
}

impl TransportLines {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            segments: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    pub fn config(&self) -> TransportConfig {
        self.config
    }

    pub fn spacing(&self) -> Fixed64 {
        self.config.spacing
    }

    /// Add a segment at the end of the update order.
    pub fn register(&mut self, segment: Segment) -> SegmentId {
        let id = self.segments.insert(segment);
        self.order.push(id);
        id
    }

    /// Remove a segment. Links pointing at it are cleared.
    pub fn remove(&mut self, id: SegmentId) -> Option<Segment> {
        let removed = self.segments.remove(id)?;
        self.order.retain(|&s| s != id);
        for (_, segment) in self.segments.iter_mut() {
            if segment.target == Some(id) {
                segment.target = None;
            }
            if segment.last_served == Some(id) {
                segment.last_served = None;
            }
        }
        Some(removed)
    }

    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id)
    }

    pub fn get_mut(&mut self, id: SegmentId) -> Option<&mut Segment> {
        self.segments.get_mut(id)
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.segments.contains_key(id)
    }

    /// Link `source` to feed the start of `target` from `side`. `None`
    /// unlinks.
    pub fn set_target(
        &mut self,
        source: SegmentId,
        target: Option<SegmentId>,
        side: InsertSide,
    ) -> Result<(), TransportError> {
        self.set_target_at(source, target, side, Fixed64::ZERO)
    }

    /// Link `source` to feed `target` at offset `landing`.
    pub fn set_target_at(
        &mut self,
        source: SegmentId,
        target: Option<SegmentId>,
        side: InsertSide,
        landing: Fixed64,
    ) -> Result<(), TransportError> {
        if let Some(t) = target {
            let length = self
                .segments
                .get(t)
                .ok_or(TransportError::UnknownSegment(t))?
                .length;
            if landing < Fixed64::ZERO || landing >= length {
                return Err(TransportError::OffsetOutOfRange {
                    offset: landing,
                    length,
                });
            }
        }
        let segment = self
            .segments
            .get_mut(source)
            .ok_or(TransportError::UnknownSegment(source))?;
        segment.target = target;
        segment.side = side;
        segment.landing = if target.is_some() { landing } else { Fixed64::ZERO };
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run reshaping
    // -----------------------------------------------------------------------

    /// Lengthen a segment at its downstream end.
    pub fn grow_end(&mut self, id: SegmentId, by: Fixed64) -> Result<(), TransportError> {
        let segment = self
            .segments
            .get_mut(id)
            .ok_or(TransportError::UnknownSegment(id))?;
        segment.length += by;
        Ok(())
    }

    /// Lengthen a segment at its upstream start. Items and the landing
    /// points of sources feeding it shift forward by `by`.
    pub fn grow_start(&mut self, id: SegmentId, by: Fixed64) -> Result<(), TransportError> {
        let segment = self
            .segments
            .get_mut(id)
            .ok_or(TransportError::UnknownSegment(id))?;
        segment.length += by;
        for belt_item in segment.items.iter_mut() {
            belt_item.offset += by;
        }
        for (_, source) in self.segments.iter_mut() {
            if source.target == Some(id) {
                source.landing += by;
            }
        }
        Ok(())
    }

    /// Append `back` to `front` with `gap` of empty belt in between. `back`
    /// is removed; its items, target and feeders move over to `front`.
    pub fn join(&mut self, front: SegmentId, back: SegmentId, gap: Fixed64) -> Result<(), TransportError> {
        if front == back {
            return Err(TransportError::UnknownSegment(back));
        }
        let front_length = self
            .segments
            .get(front)
            .ok_or(TransportError::UnknownSegment(front))?
            .length;
        let removed = self
            .segments
            .remove(back)
            .ok_or(TransportError::UnknownSegment(back))?;
        self.order.retain(|&s| s != back);

        let shift = front_length + gap;
        for (_, source) in self.segments.iter_mut() {
            if source.target == Some(back) {
                source.target = Some(front);
                source.landing += shift;
            }
            if source.last_served == Some(back) {
                source.last_served = Some(front);
            }
        }

        let segment = self
            .segments
            .get_mut(front)
            .ok_or(TransportError::UnknownSegment(front))?;
        segment.length = shift + removed.length;
        segment.items.extend(removed.items.into_iter().map(|i| BeltItem {
            item: i.item,
            offset: i.offset + shift,
        }));
        // A run that curled back into itself now feeds its own start.
        segment.target = match removed.target {
            Some(t) if t == back => Some(front),
            other => other,
        };
        segment.side = removed.side;
        segment.landing = match removed.target {
            Some(t) if t == back => removed.landing + shift,
            _ => removed.landing,
        };
        trace!("joined {back:?} onto {front:?}, length now {}", segment.length);
        Ok(())
    }

    /// Remove the stretch `[start, start + len)` of a segment, dropping the
    /// items on it (and items within [`STALL_EPSILON`] of the new upstream
    /// end). Sources landing on the stretch are unlinked.
    ///
    /// The upstream remainder keeps `id` and loses its target; the
    /// downstream remainder keeps the target. When both remain, the
    /// downstream one is registered as a new segment.
    pub fn cut(&mut self, id: SegmentId, start: Fixed64, len: Fixed64) -> Result<CutResult, TransportError> {
        let segment = self
            .segments
            .get_mut(id)
            .ok_or(TransportError::UnknownSegment(id))?;
        let end = start + len;
        if start < Fixed64::ZERO || len <= Fixed64::ZERO || end > segment.length {
            return Err(TransportError::OffsetOutOfRange {
                offset: end,
                length: segment.length,
            });
        }
        let has_upstream = start > Fixed64::ZERO;
        let has_downstream = end < segment.length;

        if !has_upstream && !has_downstream {
            self.remove(id);
            return Ok(CutResult::default());
        }

        let items = std::mem::take(&mut segment.items);
        let (upstream_items, downstream_items): (VecDeque<_>, VecDeque<_>) = items
            .into_iter()
            .filter(|i| i.offset <= start - STALL_EPSILON || i.offset >= end)
            .partition(|i| i.offset < start);
        let downstream_items: VecDeque<_> = downstream_items
            .into_iter()
            .map(|i| BeltItem {
                item: i.item,
                offset: i.offset - end,
            })
            .collect();

        let result = if has_upstream && has_downstream {
            let mut tail = Segment::new(segment.length - end, segment.speed, segment.direction);
            tail.items = downstream_items;
            tail.target = segment.target;
            tail.side = segment.side;
            tail.landing = segment.landing;
            segment.length = start;
            segment.items = upstream_items;
            segment.target = None;
            segment.landing = Fixed64::ZERO;
            let tail = self.register(tail);
            CutResult {
                upstream: Some(id),
                downstream: Some(tail),
            }
        } else if has_upstream {
            segment.length = start;
            segment.items = upstream_items;
            segment.target = None;
            segment.landing = Fixed64::ZERO;
            CutResult {
                upstream: Some(id),
                downstream: None,
            }
        } else {
            segment.length -= end;
            segment.items = downstream_items;
            CutResult {
                upstream: None,
                downstream: Some(id),
            }
        };

        for (_, source) in self.segments.iter_mut() {
            if source.target != Some(id) || source.landing < start {
                continue;
            }
            match result.downstream {
                Some(tail) if source.landing >= end => {
                    source.target = Some(tail);
                    source.landing -= end;
                }
                _ => {
                    source.target = None;
                    source.landing = Fixed64::ZERO;
                }
            }
        }
        trace!("cut [{start}, {end}) out of {id:?}: {result:?}");
        Ok(result)
    }

    /// Insert an item on a segment at `offset`.
    pub fn insert_item(
        &mut self,
        id: SegmentId,
        item: PrototypeId,
        offset: Fixed64,
    ) -> Result<(), TransportError> {
        let spacing = self.config.spacing;
        self.segments
            .get_mut(id)
            .ok_or(TransportError::UnknownSegment(id))?
            .insert(item, offset, spacing)
    }

    /// Remove and return the lead item of a segment.
    pub fn take_lead(&mut self, id: SegmentId) -> Option<BeltItem> {
        self.segments.get_mut(id).and_then(Segment::take_lead)
    }

    /// Remove and return the item furthest along within `[start, end)`.
    pub fn take_lead_in(&mut self, id: SegmentId, start: Fixed64, end: Fixed64) -> Option<BeltItem> {
        self.segments.get_mut(id)?.take_lead_in(start, end)
    }

    /// Segments in update order.
    pub fn iter(&self) -> impl Iterator<Item = (SegmentId, &Segment)> {
        self.order
            .iter()
            .filter_map(|&id| self.segments.get(id).map(|s| (id, s)))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_items(&self) -> usize {
        self.segments.values().map(Segment::len).sum()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.order.clear();
    }

    /// Advance every active segment by one tick.
    pub fn update(&mut self) -> TransportTickReport {
        let spacing = self.config.spacing;
        let mut report = TransportTickReport::default();

        // Phase 1: advance, collecting sources with a ready lead grouped by
        // landing point. Groups and the sources in them keep first-seen
        // (registration) order.
        let mut groups: Vec<HandoffGroup> = Vec::new();
        let mut group_index: HashMap<(SegmentId, Fixed64), usize> = HashMap::new();
        for &id in &self.order {
            let Some((target, landing)) = self.segments.get(id).map(|s| (s.target, s.landing)) else {
                continue;
            };
            let has_target = target.is_some_and(|t| self.segments.contains_key(t));
            let Some(segment) = self.segments.get_mut(id) else {
                continue;
            };
            if segment.is_empty() {
                continue;
            }
            report.active_segments += 1;

            if segment.advance(spacing, has_target)
                && let Some(target) = target
            {
                let next = groups.len();
                let index = *group_index.entry((target, landing)).or_insert(next);
                if index == next {
                    groups.push(HandoffGroup {
                        target,
                        landing,
                        sources: Vec::new(),
                    });
                }
                groups[index].sources.push(id);
            }
        }

        // Phase 2: one hand-off attempt per landing point.
        for group in groups {
            let HandoffGroup {
                target,
                landing,
                sources,
            } = group;
            let last = self.segments.get(target).and_then(|t| t.last_served);
            let winner = pick_round_robin(&sources, last);

            let room = self
                .segments
                .get(target)
                .is_some_and(|t| t.has_room_at(landing, spacing));

            for source in sources {
                if room && source == winner {
                    let taken = self.segments.get_mut(source).and_then(Segment::take_lead);
                    if let (Some(belt_item), Some(t)) = (taken, self.segments.get_mut(target)) {
                        t.land(belt_item.item, landing);
                        t.last_served = Some(source);
                        report.handoffs += 1;
                    }
                } else if let Some(segment) = self.segments.get_mut(source) {
                    trace!("hand-off from {source:?} into {target:?} stalled");
                    segment.stall();
                    report.stalls += 1;
                }
            }
        }

        report
    }
}

impl Default for TransportLines {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

/// Ready sources competing for one landing point.
struct HandoffGroup {
    target: SegmentId,
    landing: Fixed64,
    sources: Vec<SegmentId>,
}

/// Choose which ready source hands off this tick. The source after the
/// last winner (in registration order) goes first; without history the
/// first source wins.
fn pick_round_robin(sources: &[SegmentId], last: Option<SegmentId>) -> SegmentId {
    debug_assert!(!sources.is_empty());
    let start = last
        .and_then(|l| sources.iter().position(|&s| s == l))
        .map_or(0, |i| (i + 1) % sources.len());
    sources[start]
}
