use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::errors::EngineError;

// ============================================================================
// Inventory Ledger
// ============================================================================
//
// Per-variant stock counters with atomic conditional decrement. One mutex
// guards the whole table, so a batch reservation is all-or-nothing and two
// callers racing for the last unit serialize: exactly one wins.
//
// Double-release protection is NOT here. Release is plain addition; the
// order/payment status transitions guarantee each reservation is released
// at most once.
//
// ============================================================================

#[derive(Default)]
pub struct InventoryLedger {
    stock: Mutex<HashMap<Uuid, u32>>,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_stock(&self, variant_id: Uuid, quantity: u32) {
        self.stock.lock().await.insert(variant_id, quantity);
    }

    pub async fn available(&self, variant_id: Uuid) -> u32 {
        self.stock.lock().await.get(&variant_id).copied().unwrap_or(0)
    }

    /// Reserve a single variant. Succeeds only if `stock >= qty`;
    /// otherwise fails without side effect.
    pub async fn reserve(&self, variant_id: Uuid, quantity: u32) -> Result<(), EngineError> {
        self.reserve_batch(&[(variant_id, quantity)]).await
    }

    /// All-or-nothing batch reservation. Requests for the same variant are
    /// summed before checking, so an order with two lines of one variant
    /// cannot pass on a half-sufficient counter.
    pub async fn reserve_batch(&self, items: &[(Uuid, u32)]) -> Result<(), EngineError> {
        let mut stock = self.stock.lock().await;

        let mut needed: HashMap<Uuid, u32> = HashMap::new();
        for (variant_id, quantity) in items {
            *needed.entry(*variant_id).or_default() += quantity;
        }

        for (variant_id, requested) in &needed {
            let available = stock.get(variant_id).copied().unwrap_or(0);
            if available < *requested {
                return Err(EngineError::InsufficientStock {
                    variant_id: *variant_id,
                    requested: *requested,
                    available,
                });
            }
        }

        for (variant_id, requested) in needed {
            // Checked above under the same guard.
            *stock.entry(variant_id).or_insert(0) -= requested;
        }
        Ok(())
    }

    /// Compensating action for cancellation, expiry, and payment failure.
    pub async fn release(&self, variant_id: Uuid, quantity: u32) {
        let mut stock = self.stock.lock().await;
        *stock.entry(variant_id).or_insert(0) += quantity;
    }

    pub async fn release_batch(&self, items: &[(Uuid, u32)]) {
        let mut stock = self.stock.lock().await;
        for (variant_id, quantity) in items {
            *stock.entry(*variant_id).or_insert(0) += quantity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reserve_and_release() {
        let ledger = InventoryLedger::new();
        let variant = Uuid::new_v4();
        ledger.set_stock(variant, 5).await;

        ledger.reserve(variant, 2).await.unwrap();
        assert_eq!(ledger.available(variant).await, 3);

        ledger.release(variant, 2).await;
        assert_eq!(ledger.available(variant).await, 5);
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_counter_untouched() {
        let ledger = InventoryLedger::new();
        let variant = Uuid::new_v4();
        ledger.set_stock(variant, 1).await;

        let err = ledger.reserve(variant, 2).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientStock {
                requested: 2,
                available: 1,
                ..
            }
        ));
        assert_eq!(ledger.available(variant).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_variant_has_zero_stock() {
        let ledger = InventoryLedger::new();
        let err = ledger.reserve(Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientStock { available: 0, .. }));
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let ledger = InventoryLedger::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        ledger.set_stock(a, 10).await;
        ledger.set_stock(b, 1).await;

        let err = ledger.reserve_batch(&[(a, 3), (b, 2)]).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientStock { variant_id, .. } if variant_id == b));

        // The passing line must not have been decremented.
        assert_eq!(ledger.available(a).await, 10);
        assert_eq!(ledger.available(b).await, 1);
    }

    #[tokio::test]
    async fn test_batch_sums_duplicate_variant_lines() {
        let ledger = InventoryLedger::new();
        let variant = Uuid::new_v4();
        ledger.set_stock(variant, 3).await;

        let err = ledger
            .reserve_batch(&[(variant, 2), (variant, 2)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            }
        ));

        ledger.reserve_batch(&[(variant, 2), (variant, 1)]).await.unwrap();
        assert_eq!(ledger.available(variant).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_for_last_unit() {
        let ledger = Arc::new(InventoryLedger::new());
        let variant = Uuid::new_v4();
        ledger.set_stock(variant, 1).await;

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.reserve(variant, 1).await })
            })
            .collect();

        let mut successes = 0;
        let mut stock_errors = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => successes += 1,
                Err(EngineError::InsufficientStock { .. }) => stock_errors += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(stock_errors, 1);
        assert_eq!(ledger.available(variant).await, 0);
    }
}
