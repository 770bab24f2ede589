use crate::id::PrototypeId;
use serde::{Deserialize, Serialize};

/// A stack of one item type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: PrototypeId,
    pub count: u32,
}

impl ItemStack {
    pub fn new(item: PrototypeId, count: u32) -> Self {
        Self { item, count }
    }
}

/// Errors raised by strict inventory operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("inventory cannot hold {count} more of {item:?}")]
    Full { item: PrototypeId, count: u32 },
    #[error("inventory holds {have} of {item:?}, {need} requested")]
    Insufficient {
        item: PrototypeId,
        have: u32,
        need: u32,
    },
}

/// Fixed number of slots, each holding at most one stack.
///
/// Stack limits belong to the item prototype, so callers pass the item's
/// stack size alongside the item. A slot may be bound to one item type;
/// unbound slots take anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub slots: Vec<Option<ItemStack>>,
    /// Per-slot item binding. Missing entries are unbound.
    pub filters: Vec<Option<PrototypeId>>,
}

impl Inventory {
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
            filters: Vec::new(),
        }
    }

    /// One slot per item, each bound to that item.
    pub fn filtered(items: impl IntoIterator<Item = PrototypeId>) -> Self {
        let filters: Vec<_> = items.into_iter().map(Some).collect();
        Self {
            slots: vec![None; filters.len()],
            filters,
        }
    }

    /// Whether slot `index` may hold `item`.
    pub fn slot_accepts(&self, index: usize, item: PrototypeId) -> bool {
        self.filters
            .get(index)
            .copied()
            .flatten()
            .is_none_or(|bound| bound == item)
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Number of `item` that could still be added.
    pub fn space_for(&self, item: PrototypeId, stack_size: u32) -> u32 {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                None if self.slot_accepts(i, item) => stack_size,
                None => 0,
                Some(s) if s.item == item => stack_size.saturating_sub(s.count),
                Some(_) => 0,
            })
            .fold(0u32, u32::saturating_add)
    }

    pub fn can_add(&self, item: PrototypeId, count: u32, stack_size: u32) -> bool {
        self.space_for(item, stack_size) >= count
    }

    /// Add items, topping up existing stacks before using empty slots.
    /// Returns the amount that didn't fit.
    #[must_use = "leftover count indicates items that did not fit"]
    pub fn add(&mut self, item: PrototypeId, count: u32, stack_size: u32) -> u32 {
        let mut remaining = count;

        for stack in self.slots.iter_mut().flatten() {
            if remaining == 0 {
                break;
            }
            if stack.item == item && stack.count < stack_size {
                let moved = remaining.min(stack_size - stack.count);
                stack.count += moved;
                remaining -= moved;
            }
        }

        for (i, slot) in self.slots.iter_mut().enumerate() {
            if remaining == 0 {
                break;
            }
            let bound_elsewhere = self
                .filters
                .get(i)
                .copied()
                .flatten()
                .is_some_and(|bound| bound != item);
            if slot.is_none() && !bound_elsewhere {
                let moved = remaining.min(stack_size);
                *slot = Some(ItemStack::new(item, moved));
                remaining -= moved;
            }
        }

        remaining
    }

    /// Add all items or none.
    pub fn try_add(
        &mut self,
        item: PrototypeId,
        count: u32,
        stack_size: u32,
    ) -> Result<(), InventoryError> {
        if !self.can_add(item, count, stack_size) {
            return Err(InventoryError::Full { item, count });
        }
        let leftover = self.add(item, count, stack_size);
        debug_assert_eq!(leftover, 0);
        Ok(())
    }

    /// Remove exactly `count` of `item`, or nothing if not enough are held.
    pub fn remove(&mut self, item: PrototypeId, count: u32) -> Result<(), InventoryError> {
        let have = self.count(item);
        if have < count {
            return Err(InventoryError::Insufficient {
                item,
                have,
                need: count,
            });
        }

        let mut remaining = count;
        for slot in self.slots.iter_mut().rev() {
            if remaining == 0 {
                break;
            }
            let emptied = match slot.as_mut() {
                Some(stack) if stack.item == item => {
                    let taken = remaining.min(stack.count);
                    stack.count -= taken;
                    remaining -= taken;
                    stack.count == 0
                }
                _ => false,
            };
            if emptied {
                *slot = None;
            }
        }
        Ok(())
    }

    /// Total quantity of `item` across all slots.
    pub fn count(&self, item: PrototypeId) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.item == item)
            .map(|s| s.count)
            .sum()
    }

    /// Total items across all types.
    pub fn total(&self) -> u32 {
        self.slots.iter().flatten().map(|s| s.count).sum()
    }

    /// Item in the first occupied slot.
    pub fn first_item(&self) -> Option<PrototypeId> {
        self.slots.iter().flatten().next().map(|s| s.item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iron() -> PrototypeId {
        PrototypeId(1)
    }
    fn copper() -> PrototypeId {
        PrototypeId(2)
    }

    #[test]
    fn add_fills_existing_stack_first() {
        let mut inv = Inventory::new(3);
        assert_eq!(inv.add(iron(), 30, 50), 0);
        assert_eq!(inv.add(iron(), 30, 50), 0);
        assert_eq!(inv.slots[0], Some(ItemStack::new(iron(), 50)));
        assert_eq!(inv.slots[1], Some(ItemStack::new(iron(), 10)));
        assert_eq!(inv.count(iron()), 60);
    }

    #[test]
    fn add_overflow_returns_leftover() {
        let mut inv = Inventory::new(2);
        assert_eq!(inv.add(iron(), 120, 50), 20);
        assert_eq!(inv.total(), 100);
    }

    #[test]
    fn mixed_items_use_separate_slots() {
        let mut inv = Inventory::new(2);
        assert_eq!(inv.add(iron(), 1, 50), 0);
        assert_eq!(inv.add(copper(), 1, 50), 0);
        assert_eq!(inv.space_for(iron(), 50), 49);
        assert!(!inv.can_add(iron(), 50, 50));
    }

    #[test]
    fn try_add_is_all_or_nothing() {
        let mut inv = Inventory::new(1);
        let err = inv.try_add(iron(), 60, 50).unwrap_err();
        assert_eq!(err, InventoryError::Full { item: iron(), count: 60 });
        assert!(inv.is_empty());
    }

    #[test]
    fn remove_exact_amount() {
        let mut inv = Inventory::new(3);
        let _ = inv.add(iron(), 70, 50);
        inv.remove(iron(), 60).unwrap();
        assert_eq!(inv.count(iron()), 10);
        assert_eq!(inv.slots.iter().flatten().count(), 1);
    }

    #[test]
    fn remove_insufficient_leaves_inventory_untouched() {
        let mut inv = Inventory::new(1);
        let _ = inv.add(iron(), 5, 50);
        assert!(matches!(
            inv.remove(iron(), 6),
            Err(InventoryError::Insufficient { have: 5, need: 6, .. })
        ));
        assert_eq!(inv.count(iron()), 5);
    }

    #[test]
    fn bound_slots_reject_other_items() {
        let mut inv = Inventory::filtered([iron(), copper()]);
        assert_eq!(inv.add(iron(), 80, 50), 30);
        assert_eq!(inv.slots[1], None);
        assert_eq!(inv.space_for(iron(), 50), 0);
        assert!(inv.can_add(copper(), 50, 50));
        assert_eq!(inv.add(copper(), 10, 50), 0);
        assert_eq!(inv.slots[1], Some(ItemStack::new(copper(), 10)));
    }

    #[test]
    fn first_item_skips_empty_slots() {
        let mut inv = Inventory::new(3);
        inv.slots[2] = Some(ItemStack::new(copper(), 4));
        assert_eq!(inv.first_item(), Some(copper()));
    }
}
