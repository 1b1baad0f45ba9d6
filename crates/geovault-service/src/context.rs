//! Per-request caller context.

use uuid::Uuid;

/// Identity of the caller, resolved upstream of this library.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    /// The authenticated user.
    pub user_id: Uuid,
}

impl RequestContext {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }
}
