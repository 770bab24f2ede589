//! Game state shared between the logic thread and readers.
//!
//! The world and the player each sit behind their own coarse lock. The
//! logic thread takes the world lock for exactly one tick at a time; readers
//! (rendering, UI) take it between ticks and see a consistent state.
//! Prototypes are immutable after load and shared without locking.

use crate::coord::WorldCoord;
use crate::inventory::Inventory;
use crate::prototype::Prototypes;
use crate::world::{TickReport, World};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Slots in a fresh player inventory.
pub const PLAYER_INVENTORY_SIZE: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerData {
    pub position: WorldCoord,
    pub inventory: Inventory,
}

impl Default for PlayerData {
    fn default() -> Self {
        Self {
            position: WorldCoord::new(0, 0),
            inventory: Inventory::new(PLAYER_INVENTORY_SIZE),
        }
    }
}

pub struct SharedGame {
    prototypes: Arc<Prototypes>,
    world: Mutex<World>,
    player: Mutex<PlayerData>,
}

impl SharedGame {
    pub fn new(prototypes: Arc<Prototypes>, world: World) -> Self {
        Self {
            prototypes,
            world: Mutex::new(world),
            player: Mutex::new(PlayerData::default()),
        }
    }

    pub fn prototypes(&self) -> &Arc<Prototypes> {
        &self.prototypes
    }

    // A panic mid-tick leaves the world as the tick left it; later ticks
    // carry on from there.
    fn lock_world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_player(&self) -> MutexGuard<'_, PlayerData> {
        self.player.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one logic tick under the world lock.
    pub fn logic_tick(&self) -> TickReport {
        let mut world = self.lock_world();
        world.step(&self.prototypes)
    }

    /// Read the world between ticks.
    pub fn read_world<R>(&self, f: impl FnOnce(&World) -> R) -> R {
        f(&*self.lock_world())
    }

    /// Mutate the world between ticks (build/remove events).
    pub fn with_world<R>(&self, f: impl FnOnce(&mut World, &Prototypes) -> R) -> R {
        f(&mut *self.lock_world(), &self.prototypes)
    }

    pub fn with_player<R>(&self, f: impl FnOnce(&mut PlayerData) -> R) -> R {
        f(&mut *self.lock_player())
    }
}

/// A thread calling [`SharedGame::logic_tick`] at a fixed rate until
/// stopped. Falling behind does not cause catch-up bursts.
pub struct LogicLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl LogicLoop {
    pub fn spawn(game: Arc<SharedGame>, interval: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("logic".into())
            .spawn(move || {
                let mut ticks = 0u64;
                let mut next = Instant::now();
                while !flag.load(Ordering::Acquire) {
                    game.logic_tick();
                    ticks += 1;

                    next += interval;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
                debug!("logic loop stopped after {ticks} ticks");
                ticks
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Spawn at the game's native rate.
    pub fn spawn_at_game_rate(game: Arc<SharedGame>) -> std::io::Result<Self> {
        let interval = Duration::from_secs(1) / crate::fixed::GAME_HERTZ;
        Self::spawn(game, interval)
    }

    /// Stop after the tick in progress and return how many ticks ran.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        self.stop.store(true, Ordering::Release);
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(ticks)) => ticks,
            Some(Err(_)) => {
                warn!("logic thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for LogicLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
