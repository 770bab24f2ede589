use serde::{Deserialize, Serialize};

slotmap::new_key_type! {
    /// Identifies a transport segment in the segment arena.
    pub struct SegmentId;
}

/// Identifies an immutable prototype (item, tile, entity, recipe, noise layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrototypeId(pub u32);

/// Stable internal id of a unique-data instance, assigned by the relocation
/// table. Ids start at 1; 0 is never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqueDataId(pub u32);

/// Identifies one deferred entry. Monotonic per dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeferralEntryId(pub u64);
