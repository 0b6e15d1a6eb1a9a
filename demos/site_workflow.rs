//! Walks one site through a morning of requests: a partial issue from stock, the purchase of
//! the remainder together with another request, and delivery.
//!
//! Run with `RUST_LOG=debug cargo run --example site_workflow`.
use anyhow::Context;
use std::collections::BTreeMap;
use std::sync::Arc;
use supply_approval::{
    chain::Status,
    config::WorkflowConfig,
    directory::{LogNotifier, StaticDirectory},
    order::SupplierInfo,
    request::NewRequest,
    service::SupplyService,
    stock::StockItem,
    types::{Actor, ItemType, Role, Urgency},
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,supply_approval=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkflowConfig::from_env().context("Failed to load workflow configuration")?;
    let temp_dir = tempfile::tempdir()?;
    let db = sled::open(temp_dir.path().join("site.db"))?;

    let foreman = Actor::new("user_foreman", "Site Foreman", Role::Requester);
    let storekeeper = Actor::new("user_store", "Storekeeper", Role::Warehouse);
    let manager = Actor::new("user_pm", "Project Manager", Role::Approver);
    let buyer = Actor::new("user_buyer", "Buyer", Role::Procurement);

    let directory = StaticDirectory::new()
        .with_user(&foreman.id, &foreman.name, foreman.role)
        .with_user(&storekeeper.id, &storekeeper.name, storekeeper.role)
        .with_user(&manager.id, &manager.name, manager.role)
        .with_user(&buyer.id, &buyer.name, buyer.role);
    let service = SupplyService::with_config(Arc::new(db), &config)
        .with_directory(Arc::new(directory))
        .with_notifier(Arc::new(LogNotifier));

    service.upsert_stock_item(StockItem::new("Cement 50kg", "bag", 20).set_min_quantity(10))?;
    service.upsert_stock_item(StockItem::new("Rebar 12mm", "pcs", 100))?;

    let slab = service.create_request(
        NewRequest::new()
            .set_title("Level 3 slab pour")
            .set_site("Tower A")
            .set_zone("L3")
            .set_item_type(ItemType::Materials)
            .set_urgency(Urgency::High)
            .add_item("Cement 50kg", "bag", 30)
            .add_item("Rebar 12mm", "pcs", 80),
        &foreman,
    )?;
    service.transition(&slab.id, &storekeeper, Status::WarehouseReview, None)?;

    let split = service.split(
        &slab.id,
        &storekeeper,
        &BTreeMap::from([(1, 20), (2, 80)]),
        Some("cement short by ten bags".into()),
    )?;
    let remainder = split.child.context("expected a purchase request for the cement")?;

    let walls = service.create_request(
        NewRequest::new()
            .set_title("Block walls")
            .set_site("Tower A")
            .set_item_type(ItemType::Materials)
            .add_item("cement 50kg", "bag", 15),
        &foreman,
    )?;
    service.transition(&walls.id, &storekeeper, Status::WarehouseReview, None)?;
    service.transition(&walls.id, &storekeeper, Status::ApproverReview, None)?;

    for id in [&remainder.id, &walls.id] {
        service.transition(id, &manager, Status::ApproverApproved, None)?;
        service.transition(id, &buyer, Status::ProcurementProcess, None)?;
    }

    let order = service.consolidate(
        &[remainder.id.clone(), walls.id.clone()],
        SupplierInfo::new("BuildMart").set_contact("orders@buildmart.example"),
        &buyer,
    )?;
    info!(order = order.number, cement = order.total_for("Cement 50kg"), "order placed");

    for id in [&remainder.id, &walls.id] {
        service.transition(id, &buyer, Status::Purchased, None)?;
    }
    service.mark_delivered(&order.id, &buyer)?;

    for id in [&remainder.id, &walls.id] {
        service.transition(id, &storekeeper, Status::Issued, None)?;
        service.transition(id, &foreman, Status::ConfirmedReceived, None)?;
    }

    for request in service.requests()? {
        request.view_history();
    }
    for item in service.low_stock_items()? {
        info!(item = %item.name, quantity = item.quantity, "low stock");
    }

    Ok(())
}
