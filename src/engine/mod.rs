// ============================================================================
// Engine Layer - Orchestration
// ============================================================================
//
// The operations the engine exposes to callers:
//   create_order / cancel_order / get_order      (orders)
//   initiate_payment / reconcile_notification /
//   refund_payment / refresh_status / get_payment (payments)
//   parse_notification                            (webhook)
//   run_sweeper                                   (sweep)
//
// Services receive their stores and collaborators at construction; there
// is no global state.
//
// ============================================================================

pub mod inventory;
pub mod orders;
pub mod payments;
pub mod ports;
pub mod sweep;
pub mod webhook;

pub use inventory::InventoryLedger;
pub use orders::OrderService;
pub use payments::PaymentService;
