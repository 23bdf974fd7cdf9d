//! Authenticated caller identity.

use serde::{Deserialize, Serialize};

/// The admin on whose behalf an engine operation runs.
///
/// Authentication itself happens upstream; by the time an operation sees an
/// `AdminIdentity` the caller has been verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdminIdentity {
    /// Admin id, matched against `quiz.admin_id` for ownership checks.
    pub id: String,
}

impl AdminIdentity {
    /// Wrap an admin id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Whether this admin owns a resource with the given owner id.
    #[must_use]
    pub fn owns(&self, owner_id: &str) -> bool {
        self.id == owner_id
    }
}
