//! Approval chain catalog and the per-chain status graph
//!
//! Chains are a closed catalog. Each (chain, status) pair maps to a static list of edges, and
//! every edge names the capabilities that may take it. Rejection is reachable from every
//! non-terminal status; the role owning the current step decides it.
use super::config::WorkflowConfig;
use super::error::{WorkflowError, WorkflowResult};
use super::permission::{self, Capability};
use super::types::{ItemType, ParseEnumError, Role};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Status {
    #[n(0)]
    New,
    #[n(1)]
    WarehouseReview,
    #[n(2)]
    WarehousePartial,
    #[n(3)]
    ApproverReview,
    #[n(4)]
    ApproverApproved,
    #[n(5)]
    FinanceReview,
    #[n(6)]
    FinanceApproved,
    #[n(7)]
    ProcurementProcess,
    #[n(8)]
    Purchased,
    #[n(9)]
    InTransit,
    #[n(10)]
    Issued,
    #[n(11)]
    ConfirmedReceived,
    #[n(12)]
    Rejected,
}

impl Status {
    pub const ALL: [Status; 13] = [
        Status::New,
        Status::WarehouseReview,
        Status::WarehousePartial,
        Status::ApproverReview,
        Status::ApproverApproved,
        Status::FinanceReview,
        Status::FinanceApproved,
        Status::ProcurementProcess,
        Status::Purchased,
        Status::InTransit,
        Status::Issued,
        Status::ConfirmedReceived,
        Status::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "new",
            Status::WarehouseReview => "warehouse_review",
            Status::WarehousePartial => "warehouse_partial",
            Status::ApproverReview => "approver_review",
            Status::ApproverApproved => "approver_approved",
            Status::FinanceReview => "finance_review",
            Status::FinanceApproved => "finance_approved",
            Status::ProcurementProcess => "procurement_process",
            Status::Purchased => "purchased",
            Status::InTransit => "in_transit",
            Status::Issued => "issued",
            Status::ConfirmedReceived => "confirmed_received",
            Status::Rejected => "rejected",
        }
    }

    /// `issued` still accepts the requester's receipt confirmation, nothing else.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Issued | Status::ConfirmedReceived | Status::Rejected
        )
    }

    /// Stages where warehouse has the goods in hand and issues from stock.
    pub fn is_warehouse_stage(&self) -> bool {
        matches!(self, Status::WarehouseReview | Status::WarehousePartial)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| ParseEnumError {
                kind: "status",
                value: s.to_string(),
            })
    }
}

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Chain {
    #[n(0)]
    WarehouseOnly,
    #[n(1)]
    Full,
    #[n(2)]
    PurchaseOnly,
    #[n(3)]
    FullFinance,
    #[n(4)]
    FinanceOnly,
}

/// A legal move out of a status and the capabilities (any of) that may take it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub to: Status,
    pub requires: &'static [Capability],
}

impl Edge {
    const fn new(to: Status, requires: &'static [Capability]) -> Self {
        Self { to, requires }
    }
}

use Capability::{
    ApprovalStage as A, CancelOwnNew as C, ConfirmReceipt as R, FinanceStage as F,
    ProcurementStage as P, WarehouseStage as W,
};

const NEW_TO_WAREHOUSE: &[Edge] = &[
    Edge::new(Status::WarehouseReview, &[W]),
    Edge::new(Status::Rejected, &[C, W]),
];
const NEW_TO_APPROVER: &[Edge] = &[
    Edge::new(Status::ApproverReview, &[A]),
    Edge::new(Status::Rejected, &[C, A]),
];
const WAREHOUSE_ISSUE_ONLY: &[Edge] = &[
    Edge::new(Status::Issued, &[W]),
    Edge::new(Status::Rejected, &[W]),
];
const WAREHOUSE_WITH_PARTIAL: &[Edge] = &[
    Edge::new(Status::WarehousePartial, &[W]),
    Edge::new(Status::ApproverReview, &[W]),
    Edge::new(Status::Issued, &[W]),
    Edge::new(Status::Rejected, &[W]),
];
const WAREHOUSE_FORWARD: &[Edge] = &[
    Edge::new(Status::ApproverReview, &[W]),
    Edge::new(Status::Issued, &[W]),
    Edge::new(Status::Rejected, &[W]),
];
const APPROVER_REVIEW: &[Edge] = &[
    Edge::new(Status::ApproverApproved, &[A]),
    Edge::new(Status::Rejected, &[A]),
];
const APPROVED_TO_PROCUREMENT: &[Edge] = &[
    Edge::new(Status::ProcurementProcess, &[P]),
    Edge::new(Status::Rejected, &[P]),
];
const APPROVED_TO_FINANCE: &[Edge] = &[
    Edge::new(Status::FinanceReview, &[F]),
    Edge::new(Status::Rejected, &[F]),
];
const FINANCE_REVIEW: &[Edge] = &[
    Edge::new(Status::FinanceApproved, &[F]),
    Edge::new(Status::Rejected, &[F]),
];
const PROCUREMENT: &[Edge] = &[
    Edge::new(Status::Purchased, &[P]),
    Edge::new(Status::Rejected, &[P]),
];
const PURCHASED: &[Edge] = &[
    Edge::new(Status::InTransit, &[P]),
    Edge::new(Status::Issued, &[W]),
    Edge::new(Status::Rejected, &[P]),
];
const IN_TRANSIT: &[Edge] = &[
    Edge::new(Status::Issued, &[W]),
    Edge::new(Status::Rejected, &[W]),
];
const ISSUED: &[Edge] = &[Edge::new(Status::ConfirmedReceived, &[R])];

impl Chain {
    pub const ALL: [Chain; 5] = [
        Chain::WarehouseOnly,
        Chain::Full,
        Chain::PurchaseOnly,
        Chain::FullFinance,
        Chain::FinanceOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::WarehouseOnly => "warehouse_only",
            Chain::Full => "full",
            Chain::PurchaseOnly => "purchase_only",
            Chain::FullFinance => "full_finance",
            Chain::FinanceOnly => "finance_only",
        }
    }

    /// Ordered pipeline stages. `rejected` belongs to every chain and is not listed.
    pub fn stages(&self) -> &'static [Status] {
        use Status::*;
        match self {
            Chain::WarehouseOnly => &[New, WarehouseReview, Issued, ConfirmedReceived],
            Chain::Full => &[
                New,
                WarehouseReview,
                WarehousePartial,
                ApproverReview,
                ApproverApproved,
                ProcurementProcess,
                Purchased,
                InTransit,
                Issued,
                ConfirmedReceived,
            ],
            Chain::PurchaseOnly => &[
                New,
                ApproverReview,
                ApproverApproved,
                ProcurementProcess,
                Purchased,
                InTransit,
                Issued,
                ConfirmedReceived,
            ],
            Chain::FullFinance => &[
                New,
                WarehouseReview,
                ApproverReview,
                ApproverApproved,
                FinanceReview,
                FinanceApproved,
                ProcurementProcess,
                Purchased,
                InTransit,
                Issued,
                ConfirmedReceived,
            ],
            Chain::FinanceOnly => &[
                New,
                ApproverReview,
                ApproverApproved,
                FinanceReview,
                FinanceApproved,
                ProcurementProcess,
                Purchased,
                InTransit,
                Issued,
                ConfirmedReceived,
            ],
        }
    }

    pub fn contains(&self, status: Status) -> bool {
        status == Status::Rejected || self.stages().contains(&status)
    }

    pub fn edges(&self, from: Status) -> &'static [Edge] {
        use Chain::*;
        match (self, from) {
            (WarehouseOnly | Full | FullFinance, Status::New) => NEW_TO_WAREHOUSE,
            (PurchaseOnly | FinanceOnly, Status::New) => NEW_TO_APPROVER,
            (WarehouseOnly, Status::WarehouseReview) => WAREHOUSE_ISSUE_ONLY,
            (Full, Status::WarehouseReview) => WAREHOUSE_WITH_PARTIAL,
            (Full, Status::WarehousePartial) | (FullFinance, Status::WarehouseReview) => {
                WAREHOUSE_FORWARD
            }
            (Full | PurchaseOnly | FullFinance | FinanceOnly, Status::ApproverReview) => {
                APPROVER_REVIEW
            }
            (Full | PurchaseOnly, Status::ApproverApproved) => APPROVED_TO_PROCUREMENT,
            (FullFinance | FinanceOnly, Status::ApproverApproved) => APPROVED_TO_FINANCE,
            (FullFinance | FinanceOnly, Status::FinanceReview) => FINANCE_REVIEW,
            (FullFinance | FinanceOnly, Status::FinanceApproved) => APPROVED_TO_PROCUREMENT,
            (Full | PurchaseOnly | FullFinance | FinanceOnly, Status::ProcurementProcess) => {
                PROCUREMENT
            }
            (Full | PurchaseOnly | FullFinance | FinanceOnly, Status::Purchased) => PURCHASED,
            (Full | PurchaseOnly | FullFinance | FinanceOnly, Status::InTransit) => IN_TRANSIT,
            (_, Status::Issued) => ISSUED,
            _ => &[],
        }
    }

    pub fn legal_next(&self, from: Status) -> Vec<Status> {
        self.edges(from).iter().map(|edge| edge.to).collect()
    }

    /// Chain used by a child request spawned to purchase what warehouse could not issue.
    pub fn purchase_counterpart(&self) -> Chain {
        match self {
            Chain::WarehouseOnly => Chain::PurchaseOnly,
            other => *other,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chain::ALL
            .into_iter()
            .find(|chain| chain.as_str() == s.trim())
            .ok_or_else(|| ParseEnumError {
                kind: "chain",
                value: s.to_string(),
            })
    }
}

/// Chain table plus the configured default chain per item type.
#[derive(Debug, Clone)]
pub struct StatusGraph {
    default_chains: BTreeMap<ItemType, Chain>,
}

impl StatusGraph {
    pub fn new(config: &WorkflowConfig) -> Self {
        Self {
            default_chains: config.default_chains.clone(),
        }
    }

    pub fn default_chain(&self, item_type: ItemType) -> Chain {
        self.default_chains
            .get(&item_type)
            .copied()
            .unwrap_or(Chain::Full)
    }

    /// Checks a requested move and returns the edge that authorises it.
    pub fn authorize(
        &self,
        chain: Chain,
        from: Status,
        to: Status,
        role: Role,
        is_requester: bool,
    ) -> WorkflowResult<Edge> {
        if from.is_terminal() && !(from == Status::Issued && to == Status::ConfirmedReceived) {
            return Err(WorkflowError::AlreadyTerminal { status: from });
        }

        let edge = chain
            .edges(from)
            .iter()
            .find(|edge| edge.to == to)
            .copied()
            .ok_or(WorkflowError::IllegalTransition { chain, from, to })?;

        if role == Role::Admin {
            return Ok(edge);
        }

        let held: Vec<Capability> = edge
            .requires
            .iter()
            .copied()
            .filter(|cap| permission::can(role, *cap))
            .collect();

        if held.is_empty() {
            return Err(WorkflowError::Forbidden {
                role,
                reason: format!("moving a request from {from} to {to} needs {}", describe(edge)),
            });
        }

        if held.iter().all(|cap| cap.requires_ownership()) && !is_requester {
            return Err(WorkflowError::Forbidden {
                role,
                reason: format!("only the original requester may move it to {to}"),
            });
        }

        Ok(edge)
    }

    /// Targets the given role could move a request to right now.
    pub fn available_targets(
        &self,
        chain: Chain,
        from: Status,
        role: Role,
        is_requester: bool,
    ) -> Vec<Status> {
        chain
            .edges(from)
            .iter()
            .filter(|edge| {
                self.authorize(chain, from, edge.to, role, is_requester)
                    .is_ok()
            })
            .map(|edge| edge.to)
            .collect()
    }
}

fn describe(edge: Edge) -> String {
    edge.requires
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" or ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_edge_stays_inside_its_chain() {
        for chain in Chain::ALL {
            for from in chain.stages() {
                for edge in chain.edges(*from) {
                    assert!(
                        chain.contains(edge.to),
                        "{chain}: {from} -> {} leaves the chain",
                        edge.to
                    );
                }
            }
        }
    }

    #[test]
    fn rejection_reachable_from_every_open_stage() {
        for chain in Chain::ALL {
            for from in chain.stages().iter().filter(|s| !s.is_terminal()) {
                assert!(chain.legal_next(*from).contains(&Status::Rejected));
            }
        }
    }

    #[test]
    fn status_names_round_trip() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
    }
}
