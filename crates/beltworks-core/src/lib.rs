//! Beltworks Core -- the world simulation of a tile-based factory game.
//!
//! This crate provides the chunked tile grid, per-placement unique data with
//! stable relocation ids, the transport-line (belt) engine, the deferred
//! callback dispatcher, chunk-at-a-time world generation, and versioned
//! serialization of all of it.
//!
//! # Logic tick
//!
//! Each call to [`world::World::on_logic_tick`] runs three phases in order:
//!
//! 1. **World generation** -- Generate at most one queued chunk.
//! 2. **Deferred dispatch** -- Fire every live deferral due at or before the
//!    tick; entries whose owner was removed are dropped.
//! 3. **Transport** -- Advance belt segments and hand lead items downstream.
//!
//! # Build / remove
//!
//! Entities enter and leave the world only through
//! [`world::World::build`] and [`world::World::remove`], which dispatch on
//! the prototype's category through [`entity::capabilities`]:
//!
//! ```rust,ignore
//! world.build(&prototypes, coord, TileLayer::Entity, Orientation::Right, belt)?;
//! let seg = entity::belt::segment_at(&world, coord).unwrap();
//! world.transport_mut().insert_item(seg, iron_ore, Fixed64::ZERO)?;
//! world.step(&prototypes);
//! ```
//!
//! # Key Types
//!
//! - [`world::World`] -- Chunks plus every per-tick subsystem.
//! - [`chunk::ChunkTileLayer`] -- Prototype reference and owned unique data.
//! - [`unique::UniqueValue`] -- Closed set of per-placement state variants.
//! - [`relocation::RelocationTable`] -- Internal id to tile location.
//! - [`transport::TransportLines`] -- Slotmap arena of belt segments.
//! - [`deferral::DeferralTimer`] -- Tick-bucketed one-shot notifications.
//! - [`update::UpdateDispatcher`] -- Tile-update listeners that wake idle entities.
//! - [`prototype::Prototypes`] -- Immutable, validated prototype registry.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`serialize`] -- Versioned chunk and world blobs via bitcode.

pub mod chunk;
pub mod coord;
pub mod deferral;
pub mod entity;
pub mod fixed;
pub mod id;
pub mod inventory;
pub mod logistics;
#[cfg(feature = "profiling")]
pub mod profiling;
pub mod prototype;
pub mod relocation;
pub mod serialize;
pub mod shared;
pub mod sim;
pub mod transport;
pub mod unique;
pub mod update;
pub mod world;
pub mod worldgen;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
