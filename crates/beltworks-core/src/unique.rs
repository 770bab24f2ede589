//! Per-placement mutable state owned by a tile layer.
//!
//! Every placed entity instance owns at most one [`UniqueData`]. The value is
//! a closed tagged union ([`UniqueValue`]); typed access goes through the
//! [`UniqueVariant`] trait, which checks the stored [`UniqueKind`] tag and
//! returns `None` on mismatch instead of casting.

use crate::coord::{Orientation, WorldCoord};
use crate::deferral::DeferralHandle;
use crate::id::{PrototypeId, SegmentId, UniqueDataId};
use crate::inventory::Inventory;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Category tag
// ---------------------------------------------------------------------------

/// Category tag of a unique-data value. Serialized ahead of the fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UniqueKind {
    Container,
    TransportBelt,
    Resource,
    AssemblyMachine,
    MiningDrill,
    Inserter,
}

impl UniqueKind {
    pub fn tag(self) -> u8 {
        match self {
            UniqueKind::Container => 0,
            UniqueKind::TransportBelt => 1,
            UniqueKind::Resource => 2,
            UniqueKind::AssemblyMachine => 3,
            UniqueKind::MiningDrill => 4,
            UniqueKind::Inserter => 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Variant payloads
// ---------------------------------------------------------------------------

/// Chest contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerData {
    pub inventory: Inventory,
}

/// A belt tile. Items live in the referenced transport segment; the tile
/// covers offsets `[index, index + 1)` of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeltData {
    pub segment: SegmentId,
    pub orientation: Orientation,
    /// Position of the tile in its run, counted from the upstream end.
    pub index: u32,
}

/// Remaining amount of a resource deposit tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceData {
    pub amount: u32,
}

/// Recipe selection and crafting progress of an assembly machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyMachineData {
    pub recipe: Option<PrototypeId>,
    pub ingredients: Inventory,
    pub product: Inventory,
    /// Pending craft completion. `None` while idle.
    pub craft: Option<DeferralHandle>,
}

/// Mining drill cycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningDrillData {
    pub orientation: Orientation,
    /// Resource tile the current cycle draws from.
    pub resource: Option<WorldCoord>,
    /// Item mined but not yet accepted by the output tile.
    pub pending_output: Option<PrototypeId>,
    pub cycle: Option<DeferralHandle>,
}

/// Inserter hand and swing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InserterData {
    pub orientation: Orientation,
    pub held: Option<PrototypeId>,
    pub swing: Option<DeferralHandle>,
}

/// The closed set of unique-data variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UniqueValue {
    Container(ContainerData),
    TransportBelt(BeltData),
    Resource(ResourceData),
    AssemblyMachine(AssemblyMachineData),
    MiningDrill(MiningDrillData),
    Inserter(InserterData),
}

impl UniqueValue {
    pub fn kind(&self) -> UniqueKind {
        match self {
            UniqueValue::Container(_) => UniqueKind::Container,
            UniqueValue::TransportBelt(_) => UniqueKind::TransportBelt,
            UniqueValue::Resource(_) => UniqueKind::Resource,
            UniqueValue::AssemblyMachine(_) => UniqueKind::AssemblyMachine,
            UniqueValue::MiningDrill(_) => UniqueKind::MiningDrill,
            UniqueValue::Inserter(_) => UniqueKind::Inserter,
        }
    }
}

/// A unique-data instance plus the internal id the relocation table knows
/// it by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueData {
    pub internal_id: Option<UniqueDataId>,
    pub value: UniqueValue,
}

impl UniqueData {
    pub fn kind(&self) -> UniqueKind {
        self.value.kind()
    }

    /// Typed view, `None` when the stored tag is not `T::KIND`.
    pub fn get<T: UniqueVariant>(&self) -> Option<&T> {
        if self.kind() != T::KIND {
            return None;
        }
        T::from_value(&self.value)
    }

    pub fn get_mut<T: UniqueVariant>(&mut self) -> Option<&mut T> {
        if self.kind() != T::KIND {
            return None;
        }
        T::from_value_mut(&mut self.value)
    }
}

// ---------------------------------------------------------------------------
// Typed access
// ---------------------------------------------------------------------------

/// Implemented by each variant payload so callers can ask for a concrete
/// type without matching on [`UniqueValue`].
pub trait UniqueVariant: Sized {
    const KIND: UniqueKind;

    fn from_value(value: &UniqueValue) -> Option<&Self>;
    fn from_value_mut(value: &mut UniqueValue) -> Option<&mut Self>;
    fn into_value(self) -> UniqueValue;
}

macro_rules! unique_variant {
    ($ty:ty => $variant:ident) => {
        impl UniqueVariant for $ty {
            const KIND: UniqueKind = UniqueKind::$variant;

            fn from_value(value: &UniqueValue) -> Option<&Self> {
                match value {
                    UniqueValue::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_value_mut(value: &mut UniqueValue) -> Option<&mut Self> {
                match value {
                    UniqueValue::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_value(self) -> UniqueValue {
                UniqueValue::$variant(self)
            }
        }
    };
}

unique_variant!(ContainerData => Container);
unique_variant!(BeltData => TransportBelt);
unique_variant!(ResourceData => Resource);
unique_variant!(AssemblyMachineData => AssemblyMachine);
unique_variant!(MiningDrillData => MiningDrill);
unique_variant!(InserterData => Inserter);
