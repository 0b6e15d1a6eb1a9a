//! Supply requests, their line items and the append-only history log
use super::chain::{Chain, Status};
use super::error::{WorkflowError, WorkflowResult};
use super::permission::{self, Field};
use super::stock::MAX_QUANTITY;
use super::types::{Actor, ItemType, Role, TimeStamp, Urgency};
use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct LineItem {
    #[n(0)]
    pub line: u32, // 1-based, stable across splits of the same request
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub unit: String,
    #[n(3)]
    pub requested_qty: u64,
    #[n(4)]
    pub issued_qty: Option<u64>,
    #[n(5)]
    pub purchased_qty: Option<u64>,
    #[n(6)]
    pub estimated_unit_price: Option<u64>, // minor currency units
}

impl LineItem {
    pub fn new(line: u32, name: &str, unit: &str, requested_qty: u64) -> Self {
        Self {
            line,
            name: name.trim().to_string(),
            unit: unit.trim().to_string(),
            requested_qty,
            issued_qty: None,
            purchased_qty: None,
            estimated_unit_price: None,
        }
    }

    pub fn estimated_cost(&self) -> Option<u64> {
        self.estimated_unit_price
            .map(|price| price.saturating_mul(self.requested_qty))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct HistoryEntry {
    #[n(0)]
    pub at: TimeStamp<Utc>,
    #[n(1)]
    pub actor_id: String,
    #[n(2)]
    pub actor_name: String,
    #[n(3)]
    pub from: Option<Status>, // absent for the creation entry
    #[n(4)]
    pub to: Status,
    #[n(5)]
    pub action: String,
    #[n(6)]
    pub comment: Option<String>,
}

impl HistoryEntry {
    pub fn new(
        actor: &Actor,
        from: Option<Status>,
        to: Status,
        action: &str,
        comment: Option<String>,
    ) -> Self {
        Self {
            at: TimeStamp::new(),
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            from,
            to,
            action: action.to_string(),
            comment,
        }
    }
}

/// Who handled a stage, and what they said.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Handling {
    #[n(0)]
    pub actor_id: String,
    #[n(1)]
    pub actor_name: String,
    #[n(2)]
    pub at: TimeStamp<Utc>,
    #[n(3)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Processing {
    #[n(0)]
    pub warehouse: Option<Handling>,
    #[n(1)]
    pub approver: Option<Handling>,
    #[n(2)]
    pub finance: Option<Handling>,
    #[n(3)]
    pub procurement: Option<Handling>,
}

impl Processing {
    pub fn record(&mut self, role: Role, actor: &Actor, comment: Option<String>) {
        let handling = Handling {
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            at: TimeStamp::new(),
            comment,
        };
        match role {
            Role::Warehouse => self.warehouse = Some(handling),
            Role::Approver => self.approver = Some(handling),
            Role::Finance => self.finance = Some(handling),
            Role::Procurement => self.procurement = Some(handling),
            Role::Requester | Role::Admin => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Request {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7, `req_` prefix
    #[n(1)]
    pub number: u64,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub site: String,
    #[n(4)]
    pub zone: Option<String>,
    #[n(5)]
    pub requester_id: String,
    #[n(6)]
    pub requester_name: String,
    #[n(7)]
    pub item_type: ItemType,
    #[n(8)]
    pub urgency: Urgency,
    #[n(9)]
    pub status: Status,
    #[n(10)]
    pub chain: Chain,
    #[n(11)]
    pub sla_entered_at: TimeStamp<Utc>,
    #[n(12)]
    pub history: Vec<HistoryEntry>,
    #[n(13)]
    pub items: Vec<LineItem>,
    #[n(14)]
    pub parent_id: Option<String>,
    #[n(15)]
    pub child_ids: Vec<String>,
    #[n(16)]
    pub purchase_order_id: Option<String>,
    #[n(17)]
    pub processing: Processing,
    #[n(18)]
    pub attachments: Vec<String>,
    #[n(19)]
    pub created_at: TimeStamp<Utc>,
}

impl Request {
    /// Moves to `to`, appending exactly one history entry and restarting the SLA clock.
    pub(crate) fn apply_transition(
        &mut self,
        actor: &Actor,
        to: Status,
        action: &str,
        comment: Option<String>,
    ) {
        let entry = HistoryEntry::new(actor, Some(self.status), to, action, comment);
        self.sla_entered_at = entry.at.clone();
        self.status = to;
        self.history.push(entry);
    }

    /// Appends a history entry without changing status.
    pub(crate) fn annotate(&mut self, actor: &Actor, action: &str, comment: Option<String>) {
        let entry = HistoryEntry::new(actor, Some(self.status), self.status, action, comment);
        self.history.push(entry);
    }

    pub fn is_requester(&self, actor_id: &str) -> bool {
        self.requester_id == actor_id
    }

    pub fn item(&self, line: u32) -> Option<&LineItem> {
        self.items.iter().find(|item| item.line == line)
    }

    /// Simple summation over priced items.
    pub fn estimated_total(&self) -> u64 {
        self.items
            .iter()
            .filter_map(LineItem::estimated_cost)
            .fold(0u64, u64::saturating_add)
    }

    pub fn last_entry(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }

    /// Copy with the fields this role may not see blanked out.
    pub fn redacted_for(&self, role: Role) -> Request {
        let mut copy = self.clone();
        if !permission::can_see(role, Field::EstimatedUnitPrice) {
            for item in copy.items.iter_mut() {
                item.estimated_unit_price = None;
            }
        }
        copy
    }

    pub fn view_history(&self) {
        for entry in &self.history {
            let from = entry
                .from
                .map(|status| status.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "#{} {} {} -> {} [{}] by {}{}",
                self.number,
                entry.at,
                from,
                entry.to,
                entry.action,
                entry.actor_name,
                entry
                    .comment
                    .as_ref()
                    .map(|c| format!(": {c}"))
                    .unwrap_or_default()
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLineItem {
    pub name: String,
    pub unit: String,
    pub quantity: u64,
    pub estimated_unit_price: Option<u64>,
}

/// Draft of a request, filled in by the requester before submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRequest {
    pub title: String,
    pub site: String,
    pub zone: Option<String>,
    pub item_type: Option<ItemType>,
    pub urgency: Urgency,
    pub chain: Option<Chain>,
    pub items: Vec<NewLineItem>,
    pub attachments: Vec<String>,
    pub comment: Option<String>,
}

impl NewRequest {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }
    pub fn set_site(mut self, site: &str) -> Self {
        self.site = site.to_string();
        self
    }
    pub fn set_zone(mut self, zone: &str) -> Self {
        self.zone = Some(zone.to_string());
        self
    }
    pub fn set_item_type(mut self, item_type: ItemType) -> Self {
        self.item_type = Some(item_type);
        self
    }
    pub fn set_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }
    /// Overrides the configured default chain for the item type.
    pub fn set_chain(mut self, chain: Chain) -> Self {
        self.chain = Some(chain);
        self
    }
    pub fn add_item(mut self, name: &str, unit: &str, quantity: u64) -> Self {
        self.items.push(NewLineItem {
            name: name.to_string(),
            unit: unit.to_string(),
            quantity,
            estimated_unit_price: None,
        });
        self
    }
    pub fn add_priced_item(mut self, name: &str, unit: &str, quantity: u64, price: u64) -> Self {
        self.items.push(NewLineItem {
            name: name.to_string(),
            unit: unit.to_string(),
            quantity,
            estimated_unit_price: Some(price),
        });
        self
    }
    pub fn add_attachment(mut self, url: &str) -> Self {
        self.attachments.push(url.to_string());
        self
    }
    pub fn set_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn validate(&self) -> WorkflowResult<ItemType> {
        if self.title.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest("title is empty".into()));
        }
        if self.site.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest("site is empty".into()));
        }
        let item_type = self
            .item_type
            .ok_or_else(|| WorkflowError::InvalidRequest("item type is not set".into()))?;
        if self.items.is_empty() {
            return Err(WorkflowError::InvalidRequest(
                "a request needs at least one item".into(),
            ));
        }
        for (idx, item) in self.items.iter().enumerate() {
            if item.name.trim().is_empty() {
                return Err(WorkflowError::InvalidRequest(format!(
                    "item {} has no name",
                    idx + 1
                )));
            }
            if item.quantity == 0 {
                return Err(WorkflowError::InvalidRequest(format!(
                    "item '{}' has zero quantity",
                    item.name.trim()
                )));
            }
            if item.quantity > MAX_QUANTITY {
                return Err(WorkflowError::InvalidRequest(format!(
                    "item '{}' quantity exceeds {MAX_QUANTITY}",
                    item.name.trim()
                )));
            }
        }

        Ok(item_type)
    }

    /// Turns the validated draft into a `new` request owned by `requester`.
    pub(crate) fn finalise(
        self,
        id: String,
        number: u64,
        chain: Chain,
        item_type: ItemType,
        requester: &Actor,
    ) -> Request {
        let items = self
            .items
            .iter()
            .zip(1u32..)
            .map(|(item, line)| {
                let mut line_item = LineItem::new(line, &item.name, &item.unit, item.quantity);
                line_item.estimated_unit_price = item.estimated_unit_price;
                line_item
            })
            .collect();
        let created = HistoryEntry::new(requester, None, Status::New, "created", self.comment);

        Request {
            id,
            number,
            title: self.title.trim().to_string(),
            site: self.site.trim().to_string(),
            zone: self.zone,
            requester_id: requester.id.clone(),
            requester_name: requester.name.clone(),
            item_type,
            urgency: self.urgency,
            status: Status::New,
            chain,
            sla_entered_at: created.at.clone(),
            history: vec![created.clone()],
            items,
            parent_id: None,
            child_ids: vec![],
            purchase_order_id: None,
            processing: Processing::default(),
            attachments: self.attachments,
            created_at: created.at,
        }
    }
}
