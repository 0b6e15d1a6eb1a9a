//! Stock ledger: on-hand quantities and the movement log
//!
//! Deductions run inside the caller's transaction. All affected items are read first and every
//! shortage is collected before anything is written, so a batch either fully applies or leaves
//! the ledger untouched.
use super::error::{StockShortage, WorkflowError};
use super::store::{self, TxResult};
use super::types::TimeStamp;
use super::utils::normalize_name;
use chrono::Utc;
use sled::transaction::TransactionalTree;
use std::collections::HashMap;

/// Largest quantity a single line or stock record may carry; movements are signed.
pub const MAX_QUANTITY: u64 = i64::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StockItem {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub quantity: u64,
    #[n(2)]
    pub min_quantity: u64,
    #[n(3)]
    pub unit: String,
    #[n(4)]
    pub location: Option<String>,
}

impl StockItem {
    pub fn new(name: &str, unit: &str, quantity: u64) -> Self {
        Self {
            name: name.trim().to_string(),
            quantity,
            min_quantity: 0,
            unit: unit.trim().to_string(),
            location: None,
        }
    }
    pub fn set_min_quantity(mut self, min_quantity: u64) -> Self {
        self.min_quantity = min_quantity;
        self
    }
    pub fn set_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }
    pub fn is_low(&self) -> bool {
        self.quantity <= self.min_quantity
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StockMovement {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub item_key: String,
    #[n(2)]
    pub item_name: String,
    #[n(3)]
    pub delta: i64,
    #[n(4)]
    pub reason: String,
    #[n(5)]
    pub request_id: Option<String>,
    #[n(6)]
    pub actor_id: String,
    #[n(7)]
    pub at: TimeStamp<Utc>,
}

/// One line item's worth of stock to take out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deduction {
    pub movement_id: String,
    pub line: u32,
    pub name: String,
    pub unit: String,
    pub quantity: u64,
}

/// What the movements of a deduction batch are attributed to.
#[derive(Debug, Clone)]
pub struct MovementContext<'a> {
    pub reason: &'a str,
    pub request_id: &'a str,
    pub actor_id: &'a str,
}

/// Every item the batch cannot cover, in first-appearance order. Lines sharing a normalized
/// name are summed before comparing with stock.
pub(crate) fn tx_shortages(
    tx: &TransactionalTree,
    deductions: &[Deduction],
) -> TxResult<Vec<StockShortage>> {
    let mut order: Vec<String> = Vec::new();
    let mut required: HashMap<String, (u64, &Deduction)> = HashMap::new();
    for deduction in deductions.iter().filter(|d| d.quantity > 0) {
        let key = normalize_name(&deduction.name);
        match required.get_mut(&key) {
            // a sum past u64 can never be covered, so it stays a shortage
            Some((total, _)) => *total = total.saturating_add(deduction.quantity),
            None => {
                order.push(key.clone());
                required.insert(key, (deduction.quantity, deduction));
            }
        }
    }

    let mut shortages = Vec::new();
    for key in order {
        let (total, first) = required[&key];
        let item: Option<StockItem> = store::tx_get(tx, &store::stock_key(&key))?;
        let available = item.as_ref().map(|item| item.quantity).unwrap_or(0);
        if total > available {
            shortages.push(StockShortage {
                item: item
                    .as_ref()
                    .map(|item| item.name.clone())
                    .unwrap_or_else(|| first.name.clone()),
                unit: item
                    .map(|item| item.unit)
                    .unwrap_or_else(|| first.unit.clone()),
                required: total,
                available,
            });
        }
    }

    Ok(shortages)
}

/// Applies the batch or aborts with `InsufficientStock` naming every short item.
pub(crate) fn tx_deduct(
    tx: &TransactionalTree,
    deductions: &[Deduction],
    context: &MovementContext<'_>,
) -> TxResult<Vec<StockMovement>> {
    let shortages = tx_shortages(tx, deductions)?;
    if !shortages.is_empty() {
        return store::abort(WorkflowError::InsufficientStock(shortages));
    }

    let mut items: HashMap<String, StockItem> = HashMap::new();
    let mut movements = Vec::new();
    for deduction in deductions.iter().filter(|d| d.quantity > 0) {
        let key = normalize_name(&deduction.name);
        if !items.contains_key(&key) {
            match store::tx_get::<StockItem>(tx, &store::stock_key(&key))? {
                Some(item) => {
                    items.insert(key.clone(), item);
                }
                None => {
                    return store::abort(WorkflowError::NotFound {
                        kind: "stock item",
                        id: key,
                    });
                }
            }
        }
        let Some(item) = items.get_mut(&key) else {
            continue;
        };
        let Ok(delta) = i64::try_from(deduction.quantity) else {
            return store::abort(WorkflowError::InvalidRequest(format!(
                "item '{}' quantity {} exceeds {MAX_QUANTITY}",
                deduction.name, deduction.quantity
            )));
        };
        item.quantity = item.quantity.saturating_sub(deduction.quantity);

        movements.push(StockMovement {
            id: deduction.movement_id.clone(),
            item_key: key,
            item_name: item.name.clone(),
            delta: -delta,
            reason: context.reason.to_string(),
            request_id: Some(context.request_id.to_string()),
            actor_id: context.actor_id.to_string(),
            at: TimeStamp::new(),
        });
    }

    for (key, item) in &items {
        store::tx_put(tx, &store::stock_key(key), item)?;
    }
    for movement in &movements {
        store::tx_put(tx, &store::movement_key(&movement.id), movement)?;
    }

    Ok(movements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_stock_is_inclusive_of_threshold() {
        let item = StockItem::new("Cement 50kg", "bag", 5).set_min_quantity(5);
        assert!(item.is_low());
        assert!(!StockItem::new("Cement 50kg", "bag", 6).set_min_quantity(5).is_low());
    }

    #[test]
    fn key_is_normalized() {
        assert_eq!(StockItem::new(" Cement  50KG", "bag", 1).key(), "cement 50kg");
    }
}
