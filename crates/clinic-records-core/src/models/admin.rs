//! Admin account models.

use serde::{Deserialize, Serialize};

/// The clinic's administrator login. The password hash never leaves the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminAccount {
    pub admin_id: i64,
    pub username: String,
    pub created_at: Option<String>,
}
