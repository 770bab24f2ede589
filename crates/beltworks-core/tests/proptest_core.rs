//! Property-based tests for the Beltworks core.
//!
//! Uses proptest to generate random coordinates, belt layouts and
//! scheduling sequences, then verify structural invariants hold.

use beltworks_core::chunk::TileLayer;
use beltworks_core::coord::*;
use beltworks_core::deferral::DeferralTimer;
use beltworks_core::fixed::Fixed64;
use beltworks_core::id::{PrototypeId, SegmentId, UniqueDataId};
use beltworks_core::test_utils::*;
use beltworks_core::transport::*;
use beltworks_core::world::World;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

/// Operations applied to a small chain of belt segments.
#[derive(Debug, Clone)]
enum BeltOp {
    /// Insert on segment `index % len` at a fraction of its length.
    Insert(usize, u8),
    TakeLead(usize),
    Update,
}

fn arb_belt_ops(max_ops: usize) -> impl Strategy<Value = Vec<BeltOp>> {
    proptest::collection::vec(
        prop_oneof![
            (0..8usize, 0..=255u8).prop_map(|(s, f)| BeltOp::Insert(s, f)),
            (0..8usize).prop_map(BeltOp::TakeLead),
            Just(BeltOp::Update),
            Just(BeltOp::Update),
        ],
        1..=max_ops,
    )
}

/// Chain of `n` segments; the last two feed the same downstream to exercise
/// merging.
fn belt_chain(spacing: f64, speed: f64, n: usize) -> (TransportLines, Vec<SegmentId>) {
    let mut lines = TransportLines::new(TransportConfig {
        spacing: fixed(spacing),
    });
    let ids: Vec<_> = (0..n)
        .map(|_| lines.register(Segment::new(fixed(2.0), fixed(speed), Orientation::Right)))
        .collect();
    for pair in ids.windows(2) {
        lines.set_target(pair[0], Some(pair[1]), InsertSide::Straight).unwrap();
    }
    if n >= 3 {
        let side = lines.register(Segment::new(fixed(1.0), fixed(speed), Orientation::Down));
        lines.set_target(side, Some(ids[n - 1]), InsertSide::Left).unwrap();
    }
    (lines, ids)
}

fn assert_spacing(lines: &TransportLines) -> Result<(), TestCaseError> {
    let spacing = lines.spacing();
    for (id, segment) in lines.iter() {
        let offsets: Vec<Fixed64> = segment.items().map(|i| i.offset).collect();
        for w in offsets.windows(2) {
            prop_assert!(
                w[1] - w[0] >= spacing,
                "segment {id:?} items too close: {offsets:?}"
            );
        }
        for &o in &offsets {
            prop_assert!(o >= Fixed64::ZERO && o <= segment.length());
        }
        prop_assert!(segment.len() <= segment.capacity(spacing));
    }
    Ok(())
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Converting a world coordinate to chunk/local and back is lossless,
    /// and local coordinates always fall inside the chunk.
    #[test]
    fn world_chunk_round_trip(x in -100_000i32..100_000, y in -100_000i32..100_000) {
        let coord = WorldCoord::new(x, y);
        let (chunk, local) = world_to_chunk(coord);
        prop_assert!(i32::from(local.x) < CHUNK_EDGE);
        prop_assert!(i32::from(local.y) < CHUNK_EDGE);
        prop_assert_eq!(local_to_world(chunk, local), coord);
        prop_assert_eq!(chunk.x, x.div_euclid(CHUNK_EDGE));
        prop_assert_eq!(chunk.y, y.div_euclid(CHUNK_EDGE));
    }

    /// Minimum spacing and capacity hold after any sequence of inserts,
    /// pick-ups and updates. Items are never created or destroyed except by
    /// explicit insert / take.
    #[test]
    fn belt_spacing_invariant(
        ops in arb_belt_ops(60),
        spacing in prop_oneof![Just(0.25), Just(0.5), Just(1.0)],
        speed in prop_oneof![Just(0.125), Just(0.25), Just(0.5)],
    ) {
        let (mut lines, ids) = belt_chain(spacing, speed, 4);
        let mut expected = 0usize;

        for op in ops {
            match op {
                BeltOp::Insert(s, f) => {
                    let id = ids[s % ids.len()];
                    let length = lines.get(id).unwrap().length();
                    let offset = length * Fixed64::from_num(f) / 256;
                    if lines.insert_item(id, PrototypeId(1), offset).is_ok() {
                        expected += 1;
                    }
                }
                BeltOp::TakeLead(s) => {
                    if lines.take_lead(ids[s % ids.len()]).is_some() {
                        expected -= 1;
                    }
                }
                BeltOp::Update => {
                    lines.update();
                }
            }
            assert_spacing(&lines)?;
            prop_assert_eq!(lines.total_items(), expected);
        }
    }

    /// Every live entry fires exactly once, at or after its due tick, no
    /// matter how ticks are skipped.
    #[test]
    fn deferrals_fire_exactly_once(
        delays in proptest::collection::vec(1u64..50, 1..30),
        strides in proptest::collection::vec(1u64..7, 1..40),
        cancel_mask in proptest::collection::vec(any::<bool>(), 30),
    ) {
        let mut timer = DeferralTimer::new();
        let mut handles = Vec::new();
        for (i, &d) in delays.iter().enumerate() {
            handles.push(timer.schedule(0, d, UniqueDataId(i as u32), i as u64).unwrap());
        }
        let mut cancelled = vec![false; delays.len()];
        for (i, h) in handles.iter().enumerate() {
            if cancel_mask[i] {
                cancelled[i] = timer.cancel(*h);
            }
        }

        let mut fired = vec![0u32; delays.len()];
        let mut tick = 0;
        for stride in strides.iter().chain(std::iter::once(&50)) {
            tick += stride;
            timer.dispatch_up_to_tick(tick, |entry| {
                let i = entry.payload as usize;
                assert!(entry.due <= tick);
                fired[i] += 1;
                true
            });
        }

        for i in 0..delays.len() {
            prop_assert_eq!(fired[i], u32::from(!cancelled[i]));
        }
        prop_assert!(timer.is_empty());
    }

    /// Restoring a snapshot reproduces the same state hash, and both copies
    /// stay in lockstep.
    #[test]
    fn snapshot_round_trip_is_lossless(
        seed in 0u32..1000,
        placements in proptest::collection::vec((0i32..32, 0i32..32, 0u8..4), 0..12),
        ticks in 0u64..40,
    ) {
        let fx = fixture();
        let mut world = world_with(0.25, seed);
        world.queue_chunk_generation(ChunkCoord::new(0, 0));
        world.queue_chunk_generation(ChunkCoord::new(1, 0));
        run_ticks(&mut world, &fx.protos, 2);

        for (x, y, o) in placements {
            let orientation = Orientation::all()[usize::from(o)];
            let proto = if o % 2 == 0 { fx.belt } else { fx.chest };
            // Occupied tiles are rejected; that is fine here.
            let _ = world.build(&fx.protos, WorldCoord::new(x, y), TileLayer::Entity, orientation, proto);
        }
        run_ticks(&mut world, &fx.protos, ticks);

        let bytes = world.serialize().unwrap();
        let mut restored = World::deserialize(&bytes, &fx.protos).unwrap();
        prop_assert_eq!(world.state_hash(), restored.state_hash());

        run_ticks(&mut world, &fx.protos, 10);
        run_ticks(&mut restored, &fx.protos, 10);
        prop_assert_eq!(world.state_hash(), restored.state_hash());
    }
}
