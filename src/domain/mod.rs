// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate owns its status machine and invariants:
// - order:   lines, totals, fulfilment lifecycle
// - payment: gateway lifecycle, refund bookkeeping
//
// The shared error taxonomy lives in `errors`.
//
// ============================================================================

pub mod errors;
pub mod order;
pub mod payment;
