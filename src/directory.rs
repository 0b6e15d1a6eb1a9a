//! Collaborators outside the engine: the user directory and the notification dispatcher
use super::chain::{Chain, Status};
use super::request::Request;
use super::types::Role;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}

pub trait UserDirectory: Send + Sync {
    fn lookup_role(&self, actor_id: &str) -> Option<Role>;
    fn list_by_role(&self, role: Role) -> Vec<UserRef>;
}

/// In-memory directory, enough for a single site or for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: HashMap<String, (UserRef, Role)>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, id: &str, name: &str, role: Role) -> Self {
        let user = UserRef {
            id: id.to_string(),
            name: name.to_string(),
        };
        self.users.insert(id.to_string(), (user, role));
        self
    }
}

impl UserDirectory for StaticDirectory {
    fn lookup_role(&self, actor_id: &str) -> Option<Role> {
        self.users.get(actor_id).map(|(_, role)| *role)
    }

    fn list_by_role(&self, role: Role) -> Vec<UserRef> {
        let mut users: Vec<UserRef> = self
            .users
            .values()
            .filter(|(_, r)| *r == role)
            .map(|(user, _)| user.clone())
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users
    }
}

/// Sent after a status change has been committed.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub status: Status,
    pub request: Request,
    pub actor_name: String,
    pub comment: Option<String>,
    pub recipients: Vec<UserRef>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: &StatusEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: &StatusEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes every event to the `tracing` log instead of a chat channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &StatusEvent) -> anyhow::Result<()> {
        tracing::info!(
            request = event.request.number,
            status = %event.status,
            actor = %event.actor_name,
            recipients = event.recipients.len(),
            "status notification"
        );
        Ok(())
    }
}

/// The stage role expected to act next on a request sitting in `status`.
pub fn next_actor_role(chain: Chain, status: Status) -> Option<Role> {
    chain
        .edges(status)
        .iter()
        .find(|edge| edge.to != Status::Rejected)
        .and_then(|edge| edge.requires.iter().find_map(|cap| cap.stage_role()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_actor_follows_the_chain() {
        assert_eq!(
            next_actor_role(Chain::Full, Status::New),
            Some(Role::Warehouse)
        );
        assert_eq!(
            next_actor_role(Chain::PurchaseOnly, Status::New),
            Some(Role::Approver)
        );
        assert_eq!(
            next_actor_role(Chain::FinanceOnly, Status::ApproverApproved),
            Some(Role::Finance)
        );
        assert_eq!(
            next_actor_role(Chain::Full, Status::ApproverApproved),
            Some(Role::Procurement)
        );
        assert_eq!(next_actor_role(Chain::Full, Status::Rejected), None);
    }

    #[test]
    fn directory_lists_users_by_role() {
        let directory = StaticDirectory::new()
            .with_user("user_2", "Bob", Role::Approver)
            .with_user("user_1", "Ann", Role::Approver)
            .with_user("user_3", "Cid", Role::Warehouse);

        let approvers = directory.list_by_role(Role::Approver);
        assert_eq!(approvers.len(), 2);
        assert_eq!(approvers[0].name, "Ann");
        assert_eq!(directory.lookup_role("user_3"), Some(Role::Warehouse));
        assert_eq!(directory.lookup_role("user_9"), None);
    }
}
