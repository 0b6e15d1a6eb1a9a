//! Static per-role capability sets
use super::types::Role;
use std::fmt;

/// What a role is allowed to do to a request's workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    WarehouseStage,
    ApprovalStage,
    FinanceStage,
    ProcurementStage,
    ConfirmReceipt,
    CancelOwnNew,
    Administer,
}

impl Capability {
    /// Capabilities that only apply to the request's original requester.
    pub fn requires_ownership(&self) -> bool {
        matches!(self, Capability::ConfirmReceipt | Capability::CancelOwnNew)
    }

    /// The stage role that is credited when an edge bound to this capability is taken.
    pub fn stage_role(&self) -> Option<Role> {
        match self {
            Capability::WarehouseStage => Some(Role::Warehouse),
            Capability::ApprovalStage => Some(Role::Approver),
            Capability::FinanceStage => Some(Role::Finance),
            Capability::ProcurementStage => Some(Role::Procurement),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::WarehouseStage => "warehouse stage",
            Capability::ApprovalStage => "approval stage",
            Capability::FinanceStage => "finance stage",
            Capability::ProcurementStage => "procurement stage",
            Capability::ConfirmReceipt => "confirm receipt",
            Capability::CancelOwnNew => "cancel own new request",
            Capability::Administer => "administer",
        };
        f.write_str(name)
    }
}

/// Request and order attributes whose visibility depends on role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    EstimatedUnitPrice,
    ActualCost,
    SupplierContact,
}

fn grants(role: Role) -> &'static [Capability] {
    match role {
        Role::Requester => &[Capability::ConfirmReceipt, Capability::CancelOwnNew],
        Role::Warehouse => &[Capability::WarehouseStage],
        Role::Approver => &[Capability::ApprovalStage],
        Role::Finance => &[Capability::FinanceStage],
        Role::Procurement => &[Capability::ProcurementStage],
        Role::Admin => &[],
    }
}

/// Admin bypasses every capability check.
pub fn can(role: Role, capability: Capability) -> bool {
    role == Role::Admin || grants(role).contains(&capability)
}

pub fn can_see(role: Role, field: Field) -> bool {
    match field {
        Field::EstimatedUnitPrice | Field::ActualCost => matches!(
            role,
            Role::Approver | Role::Finance | Role::Procurement | Role::Admin
        ),
        Field::SupplierContact => matches!(role, Role::Finance | Role::Procurement | Role::Admin),
    }
}

pub fn can_edit(role: Role, field: Field) -> bool {
    match field {
        Field::EstimatedUnitPrice => {
            matches!(role, Role::Finance | Role::Procurement | Role::Admin)
        }
        Field::ActualCost | Field::SupplierContact => {
            matches!(role, Role::Procurement | Role::Admin)
        }
    }
}
