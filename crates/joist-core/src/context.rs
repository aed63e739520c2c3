//! Explicit per-request identity.
//!
//! There is no ambient session lookup in the engine: whoever calls a
//! lifecycle operation resolves the current user first and passes it in.

use uuid::Uuid;

use joist_db::models::User;

/// The identity a lifecycle operation runs as. Used to stamp `created_by`
/// and to scope project listings.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: Uuid,
    pub email: String,
}

impl RequestContext {
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
        }
    }
}
