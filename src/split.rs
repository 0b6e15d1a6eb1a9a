//! Partial fulfilment: issue what stock covers now, spawn a purchase request for the rest
use super::chain::Status;
use super::error::{SplitViolation, WorkflowError, WorkflowResult};
use super::lifecycle::{deductions_for, refuse_if_on_order};
use super::permission::Capability;
use super::request::{HistoryEntry, LineItem, Processing, Request};
use super::service::{SupplyService, require, tx_fresh};
use super::stock::{self, MovementContext};
use super::store;
use super::types::{Actor, Role, TimeStamp};
use super::utils;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub parent: Request,
    pub child: Option<Request>,
}

/// Per-line partition of a request: `issue + purchase == requested`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePlan {
    pub line: u32,
    pub requested: u64,
    pub issue: u64,
    pub purchase: u64,
}

/// Partitions every line of `request`. Lines missing from `per_line` issue nothing; unknown
/// lines and over-issues are all reported together.
pub fn plan_split(
    request: &Request,
    per_line: &BTreeMap<u32, u64>,
) -> Result<Vec<LinePlan>, Vec<SplitViolation>> {
    let mut violations: Vec<SplitViolation> = per_line
        .keys()
        .filter(|line| request.item(**line).is_none())
        .map(|line| SplitViolation::UnknownLine { line: *line })
        .collect();

    let mut plan = Vec::with_capacity(request.items.len());
    for item in &request.items {
        let issue = per_line.get(&item.line).copied().unwrap_or(0);
        if issue > item.requested_qty {
            violations.push(SplitViolation::ExceedsRequested {
                line: item.line,
                item: item.name.clone(),
                requested: item.requested_qty,
                issue,
            });
            continue;
        }
        plan.push(LinePlan {
            line: item.line,
            requested: item.requested_qty,
            issue,
            purchase: item.requested_qty - issue,
        });
    }

    if violations.is_empty() {
        Ok(plan)
    } else {
        Err(violations)
    }
}

impl SupplyService {
    /// Issue part of a request from stock and defer the remainder to a child purchase request.
    ///
    /// Parent update, stock deductions, movements and the child are written in one transaction.
    pub fn split(
        &self,
        request_id: &str,
        actor: &Actor,
        per_line: &BTreeMap<u32, u64>,
        comment: Option<String>,
    ) -> WorkflowResult<SplitOutcome> {
        self.check_actor(actor)?;
        require(actor, Capability::WarehouseStage, "splitting a request")?;

        let snapshot = self.load_request(request_id)?;
        if snapshot.status.is_terminal() {
            return Err(WorkflowError::AlreadyTerminal {
                status: snapshot.status,
            });
        }
        if !snapshot.status.is_warehouse_stage() {
            return Err(WorkflowError::IllegalTransition {
                chain: snapshot.chain,
                from: snapshot.status,
                to: Status::Issued,
            });
        }
        refuse_if_on_order(&snapshot)?;

        // over-issues are held back until stock has been checked too
        let (plan, violations) = match plan_split(&snapshot, per_line) {
            Ok(plan) => (plan, vec![]),
            Err(violations) => (vec![], violations),
        };
        let issues: BTreeMap<u32, u64> = if violations.is_empty() {
            plan.iter().map(|p| (p.line, p.issue)).collect()
        } else {
            snapshot
                .items
                .iter()
                .map(|item| {
                    let issue = per_line.get(&item.line).copied().unwrap_or(0);
                    (item.line, issue.min(item.requested_qty))
                })
                .collect()
        };
        let deductions = deductions_for(
            snapshot
                .items
                .iter()
                .map(|item| (item, issues.get(&item.line).copied().unwrap_or(0))),
        )?;
        let deferred: Vec<LineItem> = plan
            .iter()
            .filter(|p| p.purchase > 0)
            .filter_map(|p| {
                snapshot.item(p.line).map(|item| LineItem {
                    requested_qty: p.purchase,
                    issued_qty: None,
                    purchased_qty: None,
                    ..item.clone()
                })
            })
            .collect();
        let issued_lines = plan.iter().filter(|p| p.issue > 0).count();
        let child_id = if deferred.is_empty() {
            None
        } else {
            Some(utils::new_uuid_to_bech32("req_")?)
        };

        let outcome = store::run(&self.instance, |tx| {
            let mut parent = tx_fresh(tx, &snapshot)?;

            let shortages = stock::tx_shortages(tx, &deductions)?;
            if !violations.is_empty() || !shortages.is_empty() {
                let mut all = violations.clone();
                all.extend(shortages.into_iter().map(SplitViolation::Shortage));
                return store::abort(WorkflowError::InvalidSplit(all));
            }

            let context = MovementContext {
                reason: "split issue",
                request_id: &parent.id,
                actor_id: &actor.id,
            };
            stock::tx_deduct(tx, &deductions, &context)?;

            for item in parent.items.iter_mut() {
                item.issued_qty = Some(issues.get(&item.line).copied().unwrap_or(0));
            }

            let child = match &child_id {
                None => None,
                Some(child_id) => {
                    let number = store::tx_next_number(tx, store::REQUEST_COUNTER)?;
                    Some(spawn_child(
                        &parent,
                        child_id.clone(),
                        number,
                        deferred.clone(),
                        actor,
                    ))
                }
            };

            let summary = match &child {
                None => format!("issued all {} line(s) from stock", parent.items.len()),
                Some(child) => format!(
                    "issued {issued_lines} line(s) from stock, {} deferred to purchase request #{}",
                    child.items.len(),
                    child.number
                ),
            };
            let note = match &comment {
                Some(comment) => format!("{summary}: {comment}"),
                None => summary,
            };
            parent
                .processing
                .record(Role::Warehouse, actor, comment.clone());
            parent.apply_transition(actor, Status::Issued, "split", Some(note));

            if let Some(child) = &child {
                parent.child_ids.push(child.id.clone());
                store::tx_put(tx, &store::request_key(&child.id), child)?;
            }
            store::tx_put(tx, &store::request_key(&parent.id), &parent)?;

            Ok(SplitOutcome { parent, child })
        })?;

        info!(
            request = outcome.parent.number,
            child = ?outcome.child.as_ref().map(|child| child.number),
            "request split"
        );
        self.dispatch(&outcome.parent, actor, comment.clone());
        if let Some(child) = &outcome.child {
            self.dispatch(child, actor, comment);
        }

        Ok(outcome)
    }
}

fn spawn_child(
    parent: &Request,
    id: String,
    number: u64,
    items: Vec<LineItem>,
    actor: &Actor,
) -> Request {
    let status = Status::ApproverReview;
    let created = HistoryEntry::new(
        actor,
        None,
        status,
        "created_by_split",
        Some(format!("remainder of request #{}", parent.number)),
    );

    Request {
        id,
        number,
        title: parent.title.clone(),
        site: parent.site.clone(),
        zone: parent.zone.clone(),
        requester_id: parent.requester_id.clone(),
        requester_name: parent.requester_name.clone(),
        item_type: parent.item_type,
        urgency: parent.urgency,
        status,
        chain: parent.chain.purchase_counterpart(),
        sla_entered_at: created.at.clone(),
        history: vec![created],
        items,
        parent_id: Some(parent.id.clone()),
        child_ids: vec![],
        purchase_order_id: None,
        processing: Processing::default(),
        attachments: parent.attachments.clone(),
        created_at: TimeStamp::new(),
    }
}
