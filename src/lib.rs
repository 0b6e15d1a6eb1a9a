pub mod chain;
pub mod config;
pub mod consolidation;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod order;
pub mod permission;
pub mod request;
pub mod service;
pub mod sla;
pub mod split;
pub mod stock;
pub mod store;
pub mod types;
pub mod utils;

pub use chain::{Chain, Status, StatusGraph};
pub use config::WorkflowConfig;
pub use error::{PersistenceError, WorkflowError, WorkflowResult};
pub use order::{OrderStatus, PurchaseOrder, SupplierInfo};
pub use request::{NewRequest, Request};
pub use service::SupplyService;
pub use types::{Actor, ItemType, Role, TimeStamp, Urgency};
