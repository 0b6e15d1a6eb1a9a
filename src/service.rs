//! Service layer API for supply request workflow operations
//!
//! Mutating operations load a snapshot, validate it, then re-read the record inside one sled
//! transaction and refuse to write if it moved on in the meantime. Notifications go out only
//! after the commit.
use super::chain::{Chain, Status, StatusGraph};
use super::config::WorkflowConfig;
use super::directory::{self, NoopNotifier, Notifier, StatusEvent, UserDirectory, UserRef};
use super::error::{PersistenceError, WorkflowError, WorkflowResult};
use super::order::PurchaseOrder;
use super::permission::{self, Capability, Field};
use super::request::{NewRequest, Request};
use super::sla::{SlaClock, SlaStatus};
use super::stock::{MAX_QUANTITY, StockItem, StockMovement};
use super::store::{self, TxResult};
use super::types::{Actor, Role, TimeStamp};
use super::utils::{self, normalize_name};
use chrono::Utc;
use sled::transaction::TransactionalTree;
use std::sync::Arc;
use tracing::{info, warn};

pub struct SupplyService {
    pub(crate) instance: Arc<sled::Db>,
    pub(crate) graph: StatusGraph,
    sla: SlaClock,
    directory: Option<Arc<dyn UserDirectory>>,
    notifier: Arc<dyn Notifier>,
}

impl SupplyService {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self::with_config(instance, &WorkflowConfig::default())
    }

    pub fn with_config(instance: Arc<sled::Db>, config: &WorkflowConfig) -> Self {
        Self {
            instance,
            graph: StatusGraph::new(config),
            sla: SlaClock::new(config),
            directory: None,
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn graph(&self) -> &StatusGraph {
        &self.graph
    }

    /// Submit a new request in status `new`
    pub fn create_request(&self, draft: NewRequest, actor: &Actor) -> WorkflowResult<Request> {
        self.check_actor(actor)?;
        if actor.id.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest("requester is missing".into()));
        }
        let item_type = draft.validate()?;
        let chain = draft
            .chain
            .unwrap_or_else(|| self.graph.default_chain(item_type));
        let id = utils::new_uuid_to_bech32("req_")?;

        let request = store::run(&self.instance, |tx| {
            let number = store::tx_next_number(tx, store::REQUEST_COUNTER)?;
            let request = draft
                .clone()
                .finalise(id.clone(), number, chain, item_type, actor);
            store::tx_put(tx, &store::request_key(&request.id), &request)?;
            Ok(request)
        })?;

        info!(
            request = request.number,
            chain = %request.chain,
            items = request.items.len(),
            "request created"
        );
        self.dispatch(&request, actor, None);

        Ok(request)
    }

    /// Administrative override of the approval chain; status is kept as is
    pub fn change_chain(
        &self,
        request_id: &str,
        actor: &Actor,
        new_chain: Chain,
    ) -> WorkflowResult<Request> {
        self.check_actor(actor)?;
        require(actor, Capability::Administer, "change the approval chain")?;

        let snapshot = self.load_request(request_id)?;
        if snapshot.status.is_terminal() {
            return Err(WorkflowError::AlreadyTerminal {
                status: snapshot.status,
            });
        }
        if !new_chain.contains(snapshot.status) {
            return Err(WorkflowError::ChainMismatch {
                chain: new_chain,
                status: snapshot.status,
            });
        }
        if new_chain == snapshot.chain {
            return Ok(snapshot);
        }

        let updated = store::run(&self.instance, |tx| {
            let mut request = tx_fresh(tx, &snapshot)?;
            let note = format!("{} -> {}", request.chain, new_chain);
            request.chain = new_chain;
            request.annotate(actor, "chain_changed", Some(note));
            store::tx_put(tx, &store::request_key(&request.id), &request)?;
            Ok(request)
        })?;

        info!(request = updated.number, chain = %updated.chain, "approval chain changed");
        Ok(updated)
    }

    /// Set or clear the estimated unit price of one line
    pub fn set_item_price(
        &self,
        request_id: &str,
        actor: &Actor,
        line: u32,
        price: Option<u64>,
    ) -> WorkflowResult<Request> {
        self.check_actor(actor)?;
        if !permission::can_edit(actor.role, Field::EstimatedUnitPrice) {
            return Err(WorkflowError::Forbidden {
                role: actor.role,
                reason: "editing estimated prices".into(),
            });
        }

        let snapshot = self.load_request(request_id)?;
        if snapshot.item(line).is_none() {
            return Err(WorkflowError::NotFound {
                kind: "line item",
                id: format!("#{} line {line}", snapshot.number),
            });
        }

        store::run(&self.instance, |tx| {
            let mut request = tx_fresh(tx, &snapshot)?;
            for item in request.items.iter_mut().filter(|item| item.line == line) {
                item.estimated_unit_price = price;
            }
            store::tx_put(tx, &store::request_key(&request.id), &request)?;
            Ok(request)
        })
    }

    pub fn request(&self, request_id: &str) -> WorkflowResult<Request> {
        self.load_request(request_id)
    }

    pub fn request_by_number(&self, number: u64) -> WorkflowResult<Request> {
        self.requests()?
            .into_iter()
            .find(|request| request.number == number)
            .ok_or_else(|| WorkflowError::NotFound {
                kind: "request",
                id: format!("#{number}"),
            })
    }

    /// All requests ordered by number
    pub fn requests(&self) -> WorkflowResult<Vec<Request>> {
        let mut requests: Vec<Request> = store::scan(&self.instance, store::REQUEST_PREFIX)?;
        requests.sort_by_key(|request| request.number);
        Ok(requests)
    }

    pub fn order(&self, order_id: &str) -> WorkflowResult<PurchaseOrder> {
        store::get(&self.instance, &store::order_key(order_id))?.ok_or_else(|| {
            WorkflowError::NotFound {
                kind: "purchase order",
                id: order_id.to_string(),
            }
        })
    }

    pub fn orders(&self) -> WorkflowResult<Vec<PurchaseOrder>> {
        let mut orders: Vec<PurchaseOrder> = store::scan(&self.instance, store::ORDER_PREFIX)?;
        orders.sort_by_key(|order| order.number);
        Ok(orders)
    }

    /// Warehouse maintenance hook: create or replace a stock record
    pub fn upsert_stock_item(&self, item: StockItem) -> WorkflowResult<StockItem> {
        if item.key().is_empty() {
            return Err(WorkflowError::InvalidRequest("stock item has no name".into()));
        }
        if item.quantity > MAX_QUANTITY || item.min_quantity > MAX_QUANTITY {
            return Err(WorkflowError::InvalidRequest(format!(
                "stock item '{}' quantity exceeds {MAX_QUANTITY}",
                item.name
            )));
        }
        self.instance
            .insert(store::stock_key(&item.key()), store::encode(&item)?)?;
        self.instance.flush()?;
        Ok(item)
    }

    pub fn stock_item(&self, name: &str) -> WorkflowResult<StockItem> {
        let key = normalize_name(name);
        store::get(&self.instance, &store::stock_key(&key))?.ok_or(WorkflowError::NotFound {
            kind: "stock item",
            id: key,
        })
    }

    pub fn stock_items(&self) -> WorkflowResult<Vec<StockItem>> {
        store::scan(&self.instance, store::STOCK_PREFIX)
    }

    /// Items at or below their minimum quantity
    pub fn low_stock_items(&self) -> WorkflowResult<Vec<StockItem>> {
        Ok(self
            .stock_items()?
            .into_iter()
            .filter(StockItem::is_low)
            .collect())
    }

    pub fn movements_for_request(&self, request_id: &str) -> WorkflowResult<Vec<StockMovement>> {
        let movements: Vec<StockMovement> = store::scan(&self.instance, store::MOVEMENT_PREFIX)?;
        Ok(movements
            .into_iter()
            .filter(|movement| movement.request_id.as_deref() == Some(request_id))
            .collect())
    }

    pub fn sla_for(&self, request: &Request, now: &TimeStamp<Utc>) -> SlaStatus {
        self.sla
            .status(request.status, &request.sla_entered_at, now)
    }

    /// Open requests past their status budget, oldest number first
    pub fn overdue_requests(
        &self,
        now: &TimeStamp<Utc>,
    ) -> WorkflowResult<Vec<(Request, SlaStatus)>> {
        Ok(self
            .requests()?
            .into_iter()
            .filter(|request| !request.status.is_terminal())
            .filter_map(|request| {
                let sla = self.sla_for(&request, now);
                sla.overdue.then_some((request, sla))
            })
            .collect())
    }

    pub fn available_targets(&self, request: &Request, actor: &Actor) -> Vec<Status> {
        self.graph.available_targets(
            request.chain,
            request.status,
            actor.role,
            request.is_requester(&actor.id),
        )
    }

    pub(crate) fn load_request(&self, request_id: &str) -> WorkflowResult<Request> {
        store::get(&self.instance, &store::request_key(request_id))?.ok_or_else(|| {
            WorkflowError::NotFound {
                kind: "request",
                id: request_id.to_string(),
            }
        })
    }

    /// A directory that knows the actor must agree with the role they claim.
    pub(crate) fn check_actor(&self, actor: &Actor) -> WorkflowResult<()> {
        let Some(directory) = &self.directory else {
            return Ok(());
        };
        match directory.lookup_role(&actor.id) {
            Some(role) if role != actor.role && role != Role::Admin => {
                Err(WorkflowError::Forbidden {
                    role: actor.role,
                    reason: format!("actor {} is registered as {role}", actor.id),
                })
            }
            _ => Ok(()),
        }
    }

    /// Best effort; a failing notifier never affects the committed change.
    pub(crate) fn dispatch(&self, request: &Request, actor: &Actor, comment: Option<String>) {
        let event = StatusEvent {
            status: request.status,
            request: request.clone(),
            actor_name: actor.name.clone(),
            comment,
            recipients: self.recipients(request),
        };
        if let Err(e) = self.notifier.notify(&event) {
            warn!(
                request = request.number,
                status = %request.status,
                error = %e,
                "notification dispatch failed"
            );
        }
    }

    fn recipients(&self, request: &Request) -> Vec<UserRef> {
        match request.status {
            Status::Issued | Status::ConfirmedReceived | Status::Rejected => vec![UserRef {
                id: request.requester_id.clone(),
                name: request.requester_name.clone(),
            }],
            status => match (
                &self.directory,
                directory::next_actor_role(request.chain, status),
            ) {
                (Some(directory), Some(role)) => directory.list_by_role(role),
                _ => vec![],
            },
        }
    }
}

pub(crate) fn require(actor: &Actor, capability: Capability, what: &str) -> WorkflowResult<()> {
    if permission::can(actor.role, capability) {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden {
            role: actor.role,
            reason: format!("{what} needs the {capability} capability"),
        })
    }
}

/// Re-reads a request inside the transaction and aborts if it changed since `snapshot`.
pub(crate) fn tx_fresh(tx: &TransactionalTree, snapshot: &Request) -> TxResult<Request> {
    let current: Option<Request> = store::tx_get(tx, &store::request_key(&snapshot.id))?;
    match current {
        Some(current)
            if current.status == snapshot.status
                && current.history.len() == snapshot.history.len() =>
        {
            Ok(current)
        }
        Some(current) => store::abort(
            PersistenceError::Conflict {
                id: snapshot.id.clone(),
                status: current.status,
            }
            .into(),
        ),
        None => store::abort(WorkflowError::NotFound {
            kind: "request",
            id: snapshot.id.clone(),
        }),
    }
}
