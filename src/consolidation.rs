//! Purchase consolidation and the delivery cascade
use super::chain::Status;
use super::error::{WorkflowError, WorkflowResult};
use super::order::{OrderStatus, PurchaseOrder, SkippedCascade, SupplierInfo};
use super::permission::Capability;
use super::request::Request;
use super::service::{SupplyService, require, tx_fresh};
use super::store;
use super::types::{Actor, Role, TimeStamp};
use super::utils;
use tracing::{info, warn};

impl SupplyService {
    /// Merge the line items of several requests into one purchase order
    pub fn consolidate(
        &self,
        request_ids: &[String],
        supplier: SupplierInfo,
        actor: &Actor,
    ) -> WorkflowResult<PurchaseOrder> {
        self.check_actor(actor)?;
        require(actor, Capability::ProcurementStage, "consolidating requests")?;

        let mut ids: Vec<&String> = Vec::with_capacity(request_ids.len());
        for id in request_ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(WorkflowError::InvalidRequest(
                "a purchase order needs at least one request".into(),
            ));
        }

        let mut snapshots = Vec::with_capacity(ids.len());
        for id in ids {
            let request = self.load_request(id)?;
            if request.status.is_terminal() {
                return Err(WorkflowError::AlreadyTerminal {
                    status: request.status,
                });
            }
            if let Some(order_id) = &request.purchase_order_id {
                return Err(WorkflowError::AlreadyConsolidated {
                    number: request.number,
                    order_id: order_id.clone(),
                });
            }
            snapshots.push(request);
        }
        let order_id = utils::new_uuid_to_bech32("po_")?;

        let order = store::run(&self.instance, |tx| {
            let mut requests: Vec<Request> = Vec::with_capacity(snapshots.len());
            for snapshot in &snapshots {
                requests.push(tx_fresh(tx, snapshot)?);
            }

            let number = store::tx_next_number(tx, store::ORDER_COUNTER)?;
            let order = match PurchaseOrder::new(
                order_id.clone(),
                number,
                supplier.clone(),
                &requests,
                &actor.id,
            ) {
                Ok(order) => order,
                Err(e) => return store::abort(e),
            };

            for request in requests.iter_mut() {
                request.purchase_order_id = Some(order.id.clone());
                request.annotate(
                    actor,
                    "absorbed_into_order",
                    Some(format!(
                        "purchase order #{} from {}",
                        order.number, order.supplier_name
                    )),
                );
                store::tx_put(tx, &store::request_key(&request.id), request)?;
            }
            store::tx_put(tx, &store::order_key(&order.id), &order)?;

            Ok(order)
        })?;

        info!(
            order = order.number,
            status = %order.status,
            requests = order.linked_requests.len(),
            items = order.items.len(),
            "purchase order created"
        );

        Ok(order)
    }

    /// Record delivery and move every linked `purchased` request to `in_transit`.
    ///
    /// Linked requests in any other status are skipped and listed on the order rather than
    /// failing the delivery.
    pub fn mark_delivered(&self, order_id: &str, actor: &Actor) -> WorkflowResult<PurchaseOrder> {
        self.check_actor(actor)?;
        require(actor, Capability::ProcurementStage, "marking an order delivered")?;

        let (order, advanced) = store::run(&self.instance, |tx| {
            let Some(mut order) = store::tx_get::<PurchaseOrder>(tx, &store::order_key(order_id))?
            else {
                return store::abort(WorkflowError::NotFound {
                    kind: "purchase order",
                    id: order_id.to_string(),
                });
            };
            if !order.status.is_open() {
                return store::abort(WorkflowError::AlreadyDelivered {
                    number: order.number,
                    status: order.status,
                });
            }

            let note = format!("purchase order #{} delivered", order.number);
            let mut advanced = Vec::new();
            let mut skipped = Vec::new();
            for request_id in &order.linked_requests {
                let key = store::request_key(request_id);
                match store::tx_get::<Request>(tx, &key)? {
                    Some(mut request) if request.status == Status::Purchased => {
                        request
                            .processing
                            .record(Role::Procurement, actor, Some(note.clone()));
                        request.apply_transition(
                            actor,
                            Status::InTransit,
                            "delivered",
                            Some(note.clone()),
                        );
                        store::tx_put(tx, &key, &request)?;
                        advanced.push(request);
                    }
                    Some(request) => skipped.push(SkippedCascade {
                        request_id: request.id,
                        number: Some(request.number),
                        status: Some(request.status),
                    }),
                    None => skipped.push(SkippedCascade {
                        request_id: request_id.clone(),
                        number: None,
                        status: None,
                    }),
                }
            }

            order.status = OrderStatus::Delivered;
            order.delivered_at = Some(TimeStamp::new());
            order.delivered_by = Some(actor.id.clone());
            order.skipped_cascades = skipped;
            store::tx_put(tx, &store::order_key(&order.id), &order)?;

            Ok((order, advanced))
        })?;

        for skip in &order.skipped_cascades {
            warn!(
                order = order.number,
                request = %skip.request_id,
                status = ?skip.status,
                "delivery cascade skipped request not in purchased"
            );
        }
        info!(
            order = order.number,
            advanced = advanced.len(),
            skipped = order.skipped_cascades.len(),
            "purchase order delivered"
        );
        for request in &advanced {
            self.dispatch(request, actor, None);
        }

        Ok(order)
    }

    /// Withdraw an open order. Linked requests are released so they can be consolidated again.
    pub fn cancel_order(
        &self,
        order_id: &str,
        actor: &Actor,
        reason: Option<String>,
    ) -> WorkflowResult<PurchaseOrder> {
        self.check_actor(actor)?;
        require(actor, Capability::ProcurementStage, "cancelling an order")?;

        let order = store::run(&self.instance, |tx| {
            let Some(mut order) = store::tx_get::<PurchaseOrder>(tx, &store::order_key(order_id))?
            else {
                return store::abort(WorkflowError::NotFound {
                    kind: "purchase order",
                    id: order_id.to_string(),
                });
            };
            if !order.status.is_open() {
                return store::abort(WorkflowError::AlreadyDelivered {
                    number: order.number,
                    status: order.status,
                });
            }

            for request_id in &order.linked_requests {
                let key = store::request_key(request_id);
                let Some(mut request) = store::tx_get::<Request>(tx, &key)? else {
                    continue;
                };
                if request.purchase_order_id.as_deref() != Some(order.id.as_str()) {
                    continue;
                }
                request.purchase_order_id = None;
                request.annotate(
                    actor,
                    "released_from_order",
                    Some(format!("purchase order #{} cancelled", order.number)),
                );
                store::tx_put(tx, &key, &request)?;
            }

            order.status = OrderStatus::Cancelled;
            if reason.is_some() {
                order.note = reason.clone();
            }
            store::tx_put(tx, &store::order_key(&order.id), &order)?;

            Ok(order)
        })?;

        info!(order = order.number, status = %order.status, "purchase order cancelled");
        Ok(order)
    }
}
