use uuid::Uuid;
use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Stock level for one artwork
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryItem {
    pub artwork_id: Uuid,
    pub available: i32,
    /// Units sold or held by open orders since the book was initialised
    pub committed: i32,
}

/// In-memory stock book used by the memory store
#[derive(Debug, Default)]
pub struct InventoryManager {
    inventory: HashMap<Uuid, InventoryItem>,
}

impl InventoryManager {
    pub fn new() -> Self {
        Self {
            inventory: HashMap::new(),
        }
    }

    /// Initialize (or overwrite) stock for an artwork
    pub fn initialize(&mut self, artwork_id: Uuid, available: i32) {
        self.inventory.insert(artwork_id, InventoryItem {
            artwork_id,
            available: available.max(0),
            committed: 0,
        });
    }

    /// Admin correction of the available count
    pub fn set(&mut self, artwork_id: Uuid, available: i32) {
        let item = self.inventory.entry(artwork_id).or_insert(InventoryItem {
            artwork_id,
            available: 0,
            committed: 0,
        });
        item.available = available.max(0);
    }

    pub fn get(&self, artwork_id: &Uuid) -> Option<&InventoryItem> {
        self.inventory.get(artwork_id)
    }

    pub fn available(&self, artwork_id: &Uuid) -> i32 {
        self.inventory.get(artwork_id).map(|i| i.available).unwrap_or(0)
    }

    /// Take stock for an order
    pub fn reserve(&mut self, artwork_id: &Uuid, quantity: i32) -> Result<i32, InventoryError> {
        let item = self.inventory.get_mut(artwork_id)
            .ok_or_else(|| InventoryError::NotFound(artwork_id.to_string()))?;

        if item.available < quantity {
            return Err(InventoryError::InsufficientStock {
                artwork_id: *artwork_id,
                requested: quantity,
                available: item.available,
            });
        }

        item.available -= quantity;
        item.committed += quantity;

        Ok(item.available)
    }

    /// Reserve several lines; either all succeed or nothing changes
    pub fn reserve_all(&mut self, lines: &[(Uuid, i32)]) -> Result<(), InventoryError> {
        let mut wanted: HashMap<Uuid, i32> = HashMap::new();
        for (id, qty) in lines {
            *wanted.entry(*id).or_insert(0) += qty;
        }

        for (id, qty) in &wanted {
            let available = self.inventory.get(id)
                .ok_or_else(|| InventoryError::NotFound(id.to_string()))?
                .available;
            if available < *qty {
                return Err(InventoryError::InsufficientStock {
                    artwork_id: *id,
                    requested: *qty,
                    available,
                });
            }
        }

        for (id, qty) in wanted {
            self.reserve(&id, qty)?;
        }
        Ok(())
    }

    /// Return stock (order cancelled)
    pub fn release(&mut self, artwork_id: &Uuid, quantity: i32) -> Result<i32, InventoryError> {
        let item = self.inventory.get_mut(artwork_id)
            .ok_or_else(|| InventoryError::NotFound(artwork_id.to_string()))?;

        item.available += quantity;
        item.committed = (item.committed - quantity).max(0);

        Ok(item.available)
    }

    pub fn remove(&mut self, artwork_id: &Uuid) {
        self.inventory.remove(artwork_id);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Inventory not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock for {artwork_id}: requested {requested}, available {available}")]
    InsufficientStock {
        artwork_id: Uuid,
        requested: i32,
        available: i32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_lifecycle() {
        let mut manager = InventoryManager::new();
        let artwork_id = Uuid::new_v4();

        manager.initialize(artwork_id, 3);
        assert_eq!(manager.available(&artwork_id), 3);

        assert_eq!(manager.reserve(&artwork_id, 2).unwrap(), 1);
        assert_eq!(manager.get(&artwork_id).unwrap().committed, 2);

        assert!(matches!(
            manager.reserve(&artwork_id, 2),
            Err(InventoryError::InsufficientStock { requested: 2, available: 1, .. })
        ));

        assert_eq!(manager.release(&artwork_id, 2).unwrap(), 3);
        assert_eq!(manager.get(&artwork_id).unwrap().committed, 0);
    }

    #[test]
    fn test_reserve_all_is_atomic() {
        let mut manager = InventoryManager::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        manager.initialize(a, 5);
        manager.initialize(b, 1);

        let result = manager.reserve_all(&[(a, 2), (b, 2)]);
        assert!(result.is_err());
        assert_eq!(manager.available(&a), 5);
        assert_eq!(manager.available(&b), 1);

        // Duplicate lines are summed before checking.
        assert!(manager.reserve_all(&[(a, 3), (a, 3)]).is_err());
        manager.reserve_all(&[(a, 2), (b, 1)]).unwrap();
        assert_eq!(manager.available(&a), 3);
        assert_eq!(manager.available(&b), 0);
    }

    #[test]
    fn test_unknown_artwork() {
        let mut manager = InventoryManager::new();
        assert!(matches!(manager.reserve(&Uuid::new_v4(), 1), Err(InventoryError::NotFound(_))));
    }
}
