//! Deferred callback dispatcher.
//!
//! Entities ask to be notified N ticks from now. Entries live in buckets
//! keyed by due tick and fire in increasing tick order, FIFO within a
//! bucket. Each entry names its owner by [`UniqueDataId`]; if the owner was
//! destroyed before the due tick the entry is dropped at fire time instead
//! of being removed eagerly.
//!
//! Lifecycle of an entry: `Scheduled -> Fired` when its bucket is processed
//! and the owner is alive, `Scheduled -> Cancelled` when the owner is gone
//! at fire time or [`DeferralTimer::cancel`] was called.

use crate::fixed::{GAME_HERTZ, Ticks, seconds_to_ticks};
use crate::id::{DeferralEntryId, UniqueDataId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Errors raised when scheduling.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("deferral delay must be at least one tick, got {delay}")]
    InvalidDelay { delay: Ticks },
    #[error("duration of {seconds}s rounds to zero ticks at {GAME_HERTZ} Hz")]
    DurationTooShort { seconds: f64 },
}

/// Returned by [`DeferralTimer::schedule`]; locates the entry for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeferralHandle {
    pub due: Ticks,
    pub entry: DeferralEntryId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeferralState {
    Scheduled,
    Fired,
    Cancelled,
}

/// One scheduled notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferralEntry {
    pub id: DeferralEntryId,
    pub due: Ticks,
    pub owner: UniqueDataId,
    /// Opaque to the dispatcher; interpreted by the owner.
    pub payload: u64,
    pub state: DeferralState,
}

/// Counters from one dispatch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub fired: usize,
    pub cancelled: usize,
}

/// Entries taken out of the timer for one dispatch, plus how many explicit
/// cancellations were discarded with them.
///
/// Splitting take and fire lets the world hand out `&mut World` to owners
/// while entries are fired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DueEntries {
    pub entries: Vec<DeferralEntry>,
    pub cancelled: usize,
}

impl DueEntries {
    /// Fire entries in order. `fire` returns `false` for a dead owner.
    pub fn fire_each<F>(self, mut fire: F) -> DispatchReport
    where
        F: FnMut(&DeferralEntry) -> bool,
    {
        let mut report = DispatchReport {
            fired: 0,
            cancelled: self.cancelled,
        };
        for mut entry in self.entries {
            entry.state = DeferralState::Fired;
            if fire(&entry) {
                report.fired += 1;
            } else {
                report.cancelled += 1;
            }
        }
        report
    }
}

/// Convert a duration in seconds to a delay, rejecting durations that round
/// to zero ticks.
pub fn ticks_from_seconds(seconds: f64) -> Result<Ticks, ScheduleError> {
    match seconds_to_ticks(seconds) {
        0 => Err(ScheduleError::DurationTooShort { seconds }),
        ticks => Ok(ticks),
    }
}

// ---------------------------------------------------------------------------
// DeferralTimer
// ---------------------------------------------------------------------------

/// Tick-indexed schedule of deferred entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferralTimer {
    buckets: BTreeMap<Ticks, Vec<DeferralEntry>>,
    next_entry: u64,
}

impl DeferralTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a notification for `owner` at `current_tick + delay`.
    pub fn schedule(
        &mut self,
        current_tick: Ticks,
        delay: Ticks,
        owner: UniqueDataId,
        payload: u64,
    ) -> Result<DeferralHandle, ScheduleError> {
        if delay == 0 {
            return Err(ScheduleError::InvalidDelay { delay });
        }
        let due = current_tick.saturating_add(delay);
        let id = DeferralEntryId(self.next_entry);
        self.next_entry += 1;

        self.buckets.entry(due).or_default().push(DeferralEntry {
            id,
            due,
            owner,
            payload,
            state: DeferralState::Scheduled,
        });
        Ok(DeferralHandle { due, entry: id })
    }

    /// Cancel a scheduled entry. Returns `false` if it already fired or was
    /// cancelled.
    pub fn cancel(&mut self, handle: DeferralHandle) -> bool {
        let Some(bucket) = self.buckets.get_mut(&handle.due) else {
            return false;
        };
        match bucket
            .iter_mut()
            .find(|e| e.id == handle.entry && e.state == DeferralState::Scheduled)
        {
            Some(entry) => {
                entry.state = DeferralState::Cancelled;
                true
            }
            None => false,
        }
    }

    /// Whether the entry behind `handle` is still waiting to fire.
    pub fn is_scheduled(&self, handle: DeferralHandle) -> bool {
        self.buckets.get(&handle.due).is_some_and(|bucket| {
            bucket
                .iter()
                .any(|e| e.id == handle.entry && e.state == DeferralState::Scheduled)
        })
    }

    /// Remove every bucket due at or before `tick`. Scheduled entries come
    /// back in firing order; explicitly cancelled ones are only counted.
    pub fn take_due(&mut self, tick: Ticks) -> DueEntries {
        let later = match tick.checked_add(1) {
            Some(next) => self.buckets.split_off(&next),
            None => BTreeMap::new(),
        };
        let due = std::mem::replace(&mut self.buckets, later);

        let mut batch = DueEntries::default();
        for entry in due.into_values().flatten() {
            match entry.state {
                DeferralState::Scheduled => batch.entries.push(entry),
                _ => batch.cancelled += 1,
            }
        }
        batch
    }

    /// Fire every live entry due at or before `tick`.
    ///
    /// `fire` returns whether the owner was alive; dead owners cancel the
    /// entry. Calling this again for the same tick fires nothing, since
    /// processed buckets are removed.
    pub fn dispatch_up_to_tick<F>(&mut self, tick: Ticks, fire: F) -> DispatchReport
    where
        F: FnMut(&DeferralEntry) -> bool,
    {
        self.take_due(tick).fire_each(fire)
    }

    /// Number of entries still waiting (including cancelled ones not yet
    /// reached).
    pub fn pending_len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Earliest tick with a pending bucket.
    pub fn next_due(&self) -> Option<Ticks> {
        self.buckets.keys().next().copied()
    }

    /// All pending entries in firing order.
    pub fn iter(&self) -> impl Iterator<Item = &DeferralEntry> {
        self.buckets.values().flatten()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
