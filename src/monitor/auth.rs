//! Who may flip the monitoring switch.

use crate::UserId;
use crate::config::AdminPolicy;

use std::collections::HashSet;
use std::sync::Arc;

/// Pure predicate over the deployment's [`AdminPolicy`].
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    policy: AdminPolicy,
    watched_users: Arc<HashSet<UserId>>,
}

impl AuthorizationGate {
    pub fn new(policy: AdminPolicy, watched_users: Arc<HashSet<UserId>>) -> Self {
        Self {
            policy,
            watched_users,
        }
    }

    pub fn is_authorized(&self, actor: UserId) -> bool {
        match self.policy {
            AdminPolicy::AllowList { admin } => actor == admin,
            AdminPolicy::DenyWatched => !self.watched_users.contains(&actor),
        }
    }
}
