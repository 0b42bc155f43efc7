use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

mod config;
mod domain;
mod engine;
mod store;
mod testkit;
mod utils;

use config::EngineConfig;
use domain::payment::PaymentMethod;
use engine::ports::{CartLine, PriceQuote};
use engine::{webhook, InventoryLedger, OrderService, PaymentService};
use store::memory::{MemoryOrderStore, MemoryPaymentStore};
use testkit::{FlatShipping, LogEmitter, MemoryCart, MemoryCatalog, MockGateway, StaticAddressBook};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,checkout_engine=debug")),
        )
        .init();

    tracing::info!("🛒 Starting order & payment lifecycle demo");

    let config = EngineConfig::from_env();

    // === 1. Wire stores, ledger, and collaborators ===
    let order_store = Arc::new(MemoryOrderStore::default());
    let payment_store = Arc::new(MemoryPaymentStore::default());
    let ledger = Arc::new(InventoryLedger::new());
    let cart = Arc::new(MemoryCart::default());
    let catalog = Arc::new(MemoryCatalog::default());
    let gateway = Arc::new(MockGateway::new());
    let emitter = Arc::new(LogEmitter);

    let orders = OrderService::new(
        order_store.clone(),
        payment_store.clone(),
        ledger.clone(),
        cart.clone(),
        catalog.clone(),
        Arc::new(StaticAddressBook::default()),
        Arc::new(FlatShipping { cost: 2_500 }),
        emitter.clone(),
        config.clone(),
    );
    let payments = Arc::new(PaymentService::new(
        order_store,
        payment_store,
        ledger.clone(),
        gateway.clone(),
        emitter,
        config.clone(),
    ));

    // === 2. Background sweep for stale pending payments ===
    let sweeper = engine::sweep::run_sweeper(payments.clone(), config.sweep_interval);

    // === 3. Seed a small catalog and two carts ===
    let tee = Uuid::new_v4();
    let jacket = Uuid::new_v4();
    catalog
        .set_price(tee, PriceQuote { unit_price: 15_000, discount_per_unit: 500, weight_grams: 180 })
        .await;
    catalog
        .set_price(jacket, PriceQuote { unit_price: 89_000, discount_per_unit: 0, weight_grams: 900 })
        .await;
    ledger.set_stock(tee, 5).await;
    ledger.set_stock(jacket, 2).await;

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    cart.set_cart(
        alice,
        vec![
            CartLine { variant_id: tee, quantity: 2 },
            CartLine { variant_id: jacket, quantity: 1 },
        ],
    )
    .await;
    cart.set_cart(bob, vec![CartLine { variant_id: tee, quantity: 1 }]).await;

    // === 4. Happy path: order → charge → settlement webhook → fulfilment ===
    let order = orders.create_order(alice, Uuid::new_v4(), "regular", None).await?;
    tracing::info!(
        "✅ Order {} created: subtotal {} + shipping {} - discount {} = {}",
        order.order_number,
        order.subtotal,
        order.shipping_cost,
        order.discount,
        order.grand_total
    );
    tracing::info!("📦 Tee stock after reservation: {}", ledger.available(tee).await);

    // Method arrives as a string from the outer API layer.
    let method = PaymentMethod::parse("bank_transfer")?;
    let payment = payments.initiate_payment(order.id, method).await?;
    tracing::info!(
        "💳 Payment {} pending, pay via {}",
        payment.transaction_id,
        payment.redirect_url.as_deref().unwrap_or("-")
    );

    // The gateway calls back. Parse and authenticate the payload exactly
    // as the webhook handler would, then reconcile.
    let webhook_body = serde_json::json!({
        "transaction_id": payment.transaction_id,
        "order_id": order.order_number,
        "status_code": "200",
        "gross_amount": order.grand_total.to_string(),
        "transaction_status": "settlement",
        "signature_key": webhook::signature(
            &order.order_number,
            "200",
            &order.grand_total.to_string(),
            &config.gateway_server_key,
        ),
    })
    .to_string();
    let (transaction_id, status) =
        webhook::parse_notification(&webhook_body, &config.gateway_server_key)?;
    payments.reconcile_notification(&transaction_id, status).await?;

    // Duplicate delivery: acknowledged, no side effects re-applied.
    payments.reconcile_notification(&transaction_id, status).await?;

    let order = orders.get_order(order.id).await?;
    tracing::info!("✅ Order {} is now {}", order.order_number, order.status);

    let shipped = orders.mark_shipped(order.id, "JNE-88123".into()).await?;
    orders.mark_delivered(shipped.id).await?;
    tracing::info!("🚚 Order {} delivered", shipped.order_number);

    // === 5. Unhappy path: payment never settles, the sweep unwinds it ===
    let stale_order = orders.create_order(bob, Uuid::new_v4(), "regular", None).await?;
    payments.initiate_payment(stale_order.id, PaymentMethod::Gopay).await?;
    tracing::info!("📦 Tee stock with Bob's reservation: {}", ledger.available(tee).await);

    let past_expiry = Utc::now() + config.payment_expiry + chrono::Duration::minutes(1);
    let expired = payments.sweep_expired(past_expiry).await?;
    tracing::info!(
        "⏰ Sweep expired {} payment(s); tee stock restored to {}",
        expired,
        ledger.available(tee).await
    );

    let stale_order = orders.get_order(stale_order.id).await?;
    tracing::info!("✅ Order {} ended {}", stale_order.order_number, stale_order.status);

    sweeper.abort();
    tracing::info!("🎉 Demo complete!");

    Ok(())
}
