//! Workflow configuration: default chain per item type and SLA hour budgets
//!
//! The configuration is an immutable value handed to the service at construction. Defaults
//! cover a typical site; `from_env` lets a deployment override single entries.
use super::chain::{Chain, Status};
use super::types::ItemType;
use anyhow::Context;
use std::collections::BTreeMap;
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub default_chains: BTreeMap<ItemType, Chain>,
    /// Maximum dwell time per status, in hours. Missing statuses never go overdue.
    pub sla_hours: BTreeMap<Status, u32>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let default_chains = BTreeMap::from([
            (ItemType::Materials, Chain::Full),
            (ItemType::Tools, Chain::WarehouseOnly),
            (ItemType::Equipment, Chain::FullFinance),
        ]);
        let sla_hours = BTreeMap::from([
            (Status::WarehouseReview, 24),
            (Status::WarehousePartial, 24),
            (Status::ApproverReview, 24),
            (Status::ApproverApproved, 24),
            (Status::FinanceReview, 48),
            (Status::FinanceApproved, 24),
            (Status::ProcurementProcess, 72),
            (Status::Purchased, 168),
            (Status::InTransit, 48),
        ]);

        Self {
            default_chains,
            sla_hours,
        }
    }
}

impl WorkflowConfig {
    /// Defaults overridden by `SUPPLY_CHAIN_<ITEM_TYPE>` (e.g. `SUPPLY_CHAIN_TOOLS=full`) and
    /// `SUPPLY_SLA_<STATUS>_HOURS` (e.g. `SUPPLY_SLA_APPROVER_REVIEW_HOURS=12`, `0` removes the
    /// budget).
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        for item_type in ItemType::ALL {
            let key = format!("SUPPLY_CHAIN_{}", item_type.as_str().to_uppercase());
            if let Ok(value) = env::var(&key) {
                let chain: Chain = value
                    .parse()
                    .with_context(|| format!("Failed to parse {key} as an approval chain"))?;
                config.default_chains.insert(item_type, chain);
            }
        }

        for status in Status::ALL {
            let key = format!("SUPPLY_SLA_{}_HOURS", status.as_str().to_uppercase());
            if let Ok(value) = env::var(&key) {
                let hours: u32 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("Failed to parse {key} as a number of hours"))?;
                if hours == 0 {
                    config.sla_hours.remove(&status);
                } else {
                    config.sla_hours.insert(status, hours);
                }
            }
        }

        Ok(config)
    }

    pub fn with_sla_hours(mut self, status: Status, hours: u32) -> Self {
        self.sla_hours.insert(status, hours);
        self
    }

    pub fn with_default_chain(mut self, item_type: ItemType, chain: Chain) -> Self {
        self.default_chains.insert(item_type, chain);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // single test touching the environment so parallel tests never race on it
    #[test]
    fn config_from_env_overrides_defaults() {
        unsafe {
            env::set_var("SUPPLY_CHAIN_TOOLS", "purchase_only");
            env::set_var("SUPPLY_SLA_APPROVER_REVIEW_HOURS", "12");
            env::set_var("SUPPLY_SLA_IN_TRANSIT_HOURS", "0");
        }

        let config = WorkflowConfig::from_env().expect("Failed to load config");

        assert_eq!(
            config.default_chains.get(&ItemType::Tools),
            Some(&Chain::PurchaseOnly)
        );
        assert_eq!(config.sla_hours.get(&Status::ApproverReview), Some(&12));
        assert!(!config.sla_hours.contains_key(&Status::InTransit));
        assert_eq!(config.sla_hours.get(&Status::ProcurementProcess), Some(&72));

        unsafe {
            env::set_var("SUPPLY_CHAIN_TOOLS", "everything");
        }
        assert!(WorkflowConfig::from_env().is_err());

        unsafe {
            env::remove_var("SUPPLY_CHAIN_TOOLS");
            env::remove_var("SUPPLY_SLA_APPROVER_REVIEW_HOURS");
            env::remove_var("SUPPLY_SLA_IN_TRANSIT_HOURS");
        }
    }
}
