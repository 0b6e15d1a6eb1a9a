//! Request lifecycle: single-request status transitions
use super::chain::Status;
use super::error::{WorkflowError, WorkflowResult};
use super::permission::Capability;
use super::request::{LineItem, Request};
use super::service::{SupplyService, tx_fresh};
use super::stock::{self, Deduction, MovementContext};
use super::store;
use super::types::{Actor, Role};
use super::utils;
use tracing::{debug, info};

impl SupplyService {
    /// Move a request to `target` on behalf of `actor`.
    ///
    /// Issuing from a warehouse stage deducts every line's full requested quantity in the same
    /// atomic write; a shortage on any line aborts the whole transition.
    pub fn transition(
        &self,
        request_id: &str,
        actor: &Actor,
        target: Status,
        comment: Option<String>,
    ) -> WorkflowResult<Request> {
        self.check_actor(actor)?;
        let snapshot = self.load_request(request_id)?;

        let edge = self
            .graph
            .authorize(
                snapshot.chain,
                snapshot.status,
                target,
                actor.role,
                snapshot.is_requester(&actor.id),
            )
            .inspect_err(|e| {
                debug!(request = snapshot.number, error = %e, "transition refused");
            })?;

        let credited = match actor.role {
            Role::Admin => edge.requires.iter().find_map(Capability::stage_role),
            role => Some(role),
        };
        let full_issue = target == Status::Issued && snapshot.status.is_warehouse_stage();
        if full_issue {
            refuse_if_on_order(&snapshot)?;
        }
        let deductions = if full_issue {
            deductions_for(
                snapshot
                    .items
                    .iter()
                    .map(|item| (item, item.requested_qty)),
            )?
        } else {
            vec![]
        };

        let updated = store::run(&self.instance, |tx| {
            let mut request = tx_fresh(tx, &snapshot)?;

            if full_issue {
                let context = MovementContext {
                    reason: "issue",
                    request_id: &request.id,
                    actor_id: &actor.id,
                };
                stock::tx_deduct(tx, &deductions, &context)?;
                for item in request.items.iter_mut() {
                    item.issued_qty = Some(item.requested_qty);
                }
            }
            if target == Status::Purchased {
                for item in request.items.iter_mut() {
                    let issued = item.issued_qty.unwrap_or(0);
                    item.purchased_qty = Some(item.requested_qty.saturating_sub(issued));
                }
            }
            if let Some(role) = credited {
                request.processing.record(role, actor, comment.clone());
            }
            request.apply_transition(actor, target, action_label(target), comment.clone());

            store::tx_put(tx, &store::request_key(&request.id), &request)?;
            Ok(request)
        })?;

        info!(
            request = updated.number,
            from = %snapshot.status,
            to = %updated.status,
            actor = %actor.id,
            "request transitioned"
        );
        self.dispatch(&updated, actor, comment);

        Ok(updated)
    }
}

/// Stock may not cover a request whose quantities an open purchase order is already buying.
pub(crate) fn refuse_if_on_order(request: &Request) -> WorkflowResult<()> {
    match &request.purchase_order_id {
        Some(order_id) => Err(WorkflowError::AlreadyConsolidated {
            number: request.number,
            order_id: order_id.clone(),
        }),
        None => Ok(()),
    }
}

/// One deduction per line with a positive quantity, each with its own movement id.
pub(crate) fn deductions_for<'a>(
    lines: impl Iterator<Item = (&'a LineItem, u64)>,
) -> WorkflowResult<Vec<Deduction>> {
    lines
        .filter(|(_, quantity)| *quantity > 0)
        .map(|(item, quantity)| -> WorkflowResult<Deduction> {
            Ok(Deduction {
                movement_id: utils::new_uuid_to_bech32("mv_")?,
                line: item.line,
                name: item.name.clone(),
                unit: item.unit.clone(),
                quantity,
            })
        })
        .collect()
}

fn action_label(target: Status) -> &'static str {
    match target {
        Status::WarehouseReview | Status::ApproverReview | Status::FinanceReview => "taken_up",
        Status::WarehousePartial => "partially_available",
        Status::ApproverApproved | Status::FinanceApproved => "approved",
        Status::ProcurementProcess => "sent_to_procurement",
        Status::Purchased => "purchased",
        Status::InTransit => "delivered",
        Status::Issued => "issued",
        Status::ConfirmedReceived => "confirmed_received",
        Status::Rejected => "rejected",
        Status::New => "reopened",
    }
}
