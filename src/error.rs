use super::chain::{Chain, Status};
use super::order::OrderStatus;
use super::types::Role;
use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("cannot move from {from} to {to} under the {chain} chain")]
    IllegalTransition {
        chain: Chain,
        from: Status,
        to: Status,
    },
    #[error("{role} is not allowed: {reason}")]
    Forbidden { role: Role, reason: String },
    #[error("request is already {status}; no further transitions are accepted")]
    AlreadyTerminal { status: Status },
    #[error("invalid split: {}", join(.0.as_slice()))]
    InvalidSplit(Vec<SplitViolation>),
    #[error("insufficient stock: {}", join(.0.as_slice()))]
    InsufficientStock(Vec<StockShortage>),
    #[error("purchase order #{number} is already {status}")]
    AlreadyDelivered { number: u64, status: OrderStatus },
    #[error("request #{number} already belongs to purchase order {order_id}")]
    AlreadyConsolidated { number: u64, order_id: String },
    #[error("status {status} is not part of the {chain} chain")]
    ChainMismatch { chain: Chain, status: Status },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("store error: {0}")]
    Store(#[from] sled::Error),
    #[error("failed to encode or decode a record: {0}")]
    Codec(String),
    #[error("request {id} was modified concurrently (now {status})")]
    Conflict { id: String, status: Status },
}

impl From<sled::Error> for WorkflowError {
    fn from(value: sled::Error) -> Self {
        WorkflowError::Persistence(PersistenceError::Store(value))
    }
}

impl From<anyhow::Error> for WorkflowError {
    fn from(value: anyhow::Error) -> Self {
        WorkflowError::Internal(value.to_string())
    }
}

/// One item the stock ledger cannot cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockShortage {
    pub item: String,
    pub unit: String,
    pub required: u64,
    pub available: u64,
}

impl StockShortage {
    pub fn deficit(&self) -> u64 {
        self.required.saturating_sub(self.available)
    }
}

impl fmt::Display for StockShortage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requires {} {}, {} available (short {})",
            self.item,
            self.required,
            self.unit,
            self.available,
            self.deficit()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitViolation {
    UnknownLine {
        line: u32,
    },
    ExceedsRequested {
        line: u32,
        item: String,
        requested: u64,
        issue: u64,
    },
    Shortage(StockShortage),
}

impl fmt::Display for SplitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitViolation::UnknownLine { line } => write!(f, "line {line} does not exist"),
            SplitViolation::ExceedsRequested {
                line,
                item,
                requested,
                issue,
            } => write!(
                f,
                "line {line} ({item}) issues {issue} but only {requested} were requested"
            ),
            SplitViolation::Shortage(shortage) => shortage.fmt(f),
        }
    }
}

fn join<T: fmt::Display>(entries: &[T]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
