//! Consolidated purchase orders and line-item aggregation
use super::chain::Status;
use super::error::{WorkflowError, WorkflowResult};
use super::permission::{self, Field};
use super::request::Request;
use super::types::{Role, TimeStamp};
use super::utils::normalize_name;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum OrderStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Pending,
    #[n(2)]
    Delivered,
    #[n(3)]
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Pending => "pending",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Draft | OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupplierInfo {
    pub name: String,
    pub contact: Option<String>,
    pub expected_delivery: Option<TimeStamp<Utc>>,
    pub actual_cost: Option<u64>,
    pub note: Option<String>,
}

impl SupplierInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
    pub fn set_contact(mut self, contact: &str) -> Self {
        self.contact = Some(contact.to_string());
        self
    }
    pub fn set_expected_delivery(mut self, date: TimeStamp<Utc>) -> Self {
        self.expected_delivery = Some(date);
        self
    }
    pub fn set_actual_cost(mut self, cost: u64) -> Self {
        self.actual_cost = Some(cost);
        self
    }
    pub fn set_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    /// An order can only be placed once we know who to call.
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty()
            && self
                .contact
                .as_deref()
                .is_some_and(|contact| !contact.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct AggregatedItem {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub unit: String,
    #[n(2)]
    pub total_qty: u64,
    #[n(3)]
    pub request_ids: Vec<String>,
}

/// A linked request the delivery cascade left untouched.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct SkippedCascade {
    #[n(0)]
    pub request_id: String,
    #[n(1)]
    pub number: Option<u64>, // absent when the request no longer exists
    #[n(2)]
    pub status: Option<Status>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PurchaseOrder {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub number: u64,
    #[n(2)]
    pub supplier_name: String,
    #[n(3)]
    pub supplier_contact: Option<String>,
    #[n(4)]
    pub expected_delivery: Option<TimeStamp<Utc>>,
    #[n(5)]
    pub actual_cost: Option<u64>,
    #[n(6)]
    pub note: Option<String>,
    #[n(7)]
    pub status: OrderStatus,
    #[n(8)]
    pub linked_requests: Vec<String>,
    #[n(9)]
    pub items: Vec<AggregatedItem>,
    #[n(10)]
    pub created_by: String,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
    #[n(12)]
    pub delivered_at: Option<TimeStamp<Utc>>,
    #[n(13)]
    pub delivered_by: Option<String>,
    #[n(14)]
    pub skipped_cascades: Vec<SkippedCascade>,
}

impl PurchaseOrder {
    pub(crate) fn new(
        id: String,
        number: u64,
        supplier: SupplierInfo,
        requests: &[Request],
        created_by: &str,
    ) -> WorkflowResult<Self> {
        let status = if supplier.is_complete() {
            OrderStatus::Pending
        } else {
            OrderStatus::Draft
        };

        let items = aggregate(requests)?;

        Ok(Self {
            id,
            number,
            supplier_name: supplier.name.trim().to_string(),
            supplier_contact: supplier.contact,
            expected_delivery: supplier.expected_delivery,
            actual_cost: supplier.actual_cost,
            note: supplier.note,
            status,
            linked_requests: requests.iter().map(|request| request.id.clone()).collect(),
            items,
            created_by: created_by.to_string(),
            created_at: TimeStamp::new(),
            delivered_at: None,
            delivered_by: None,
            skipped_cascades: vec![],
        })
    }

    pub fn total_for(&self, name: &str) -> u64 {
        let key = normalize_name(name);
        self.items
            .iter()
            .filter(|item| normalize_name(&item.name) == key)
            .map(|item| item.total_qty)
            .fold(0u64, u64::saturating_add)
    }

    pub fn redacted_for(&self, role: Role) -> PurchaseOrder {
        let mut copy = self.clone();
        if !permission::can_see(role, Field::ActualCost) {
            copy.actual_cost = None;
        }
        if !permission::can_see(role, Field::SupplierContact) {
            copy.supplier_contact = None;
        }
        copy
    }
}

/// Sums requested quantities across requests, keyed by normalized (name, unit).
///
/// Output keeps first-appearance order; display name and unit come from the first item seen.
/// A total that does not fit in `u64` is refused with `InvalidRequest`.
pub fn aggregate(requests: &[Request]) -> WorkflowResult<Vec<AggregatedItem>> {
    let mut items: Vec<AggregatedItem> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for request in requests {
        for line in &request.items {
            let key = (normalize_name(&line.name), normalize_name(&line.unit));
            match index.get(&key) {
                Some(&at) => {
                    let item = &mut items[at];
                    item.total_qty = item
                        .total_qty
                        .checked_add(line.requested_qty)
                        .ok_or_else(|| {
                            WorkflowError::InvalidRequest(format!(
                                "total quantity of '{}' overflows",
                                item.name
                            ))
                        })?;
                    if !item.request_ids.contains(&request.id) {
                        item.request_ids.push(request.id.clone());
                    }
                }
                None => {
                    index.insert(key, items.len());
                    items.push(AggregatedItem {
                        name: line.name.clone(),
                        unit: line.unit.clone(),
                        total_qty: line.requested_qty,
                        request_ids: vec![request.id.clone()],
                    });
                }
            }
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::request::NewRequest;
    use crate::types::{Actor, ItemType};

    fn request(id: &str, items: &[(&str, &str, u64)]) -> Request {
        let mut draft = NewRequest::new()
            .set_title("Pour")
            .set_site("Tower A")
            .set_item_type(ItemType::Materials);
        for (name, unit, qty) in items {
            draft = draft.add_item(name, unit, *qty);
        }
        let actor = Actor::new("user_1", "Foreman", Role::Requester);
        draft.finalise(id.into(), 1, Chain::Full, ItemType::Materials, &actor)
    }

    #[test]
    fn same_name_different_spelling_is_merged() {
        let a = request("req_a", &[("Cement 50kg", "bag", 10)]);
        let b = request("req_b", &[("  cement   50KG", "Bag", 15), ("Sand", "t", 2)]);

        let items = aggregate(&[a, b]).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Cement 50kg");
        assert_eq!(items[0].total_qty, 25);
        assert_eq!(items[0].request_ids, vec!["req_a", "req_b"]);
        assert_eq!(items[1].total_qty, 2);
    }

    #[test]
    fn different_units_stay_apart() {
        let a = request("req_a", &[("Cement", "bag", 10)]);
        let b = request("req_b", &[("Cement", "t", 1)]);

        let items = aggregate(&[a, b]).unwrap();

        assert_eq!(items.len(), 2);
    }

    #[test]
    fn overflowing_total_is_refused() {
        let a = request("req_a", &[("Cement", "bag", u64::MAX / 2 + 1)]);
        let b = request("req_b", &[("Cement", "bag", u64::MAX / 2 + 1)]);

        let err = aggregate(&[a, b]).unwrap_err();

        assert!(matches!(err, WorkflowError::InvalidRequest(_)));
    }

    #[test]
    fn incomplete_supplier_gives_draft() {
        assert!(!SupplierInfo::new("Acme").is_complete());
        assert!(SupplierInfo::new("Acme").set_contact("+1 555 0100").is_complete());
    }
}
