//! User domain types

use serde::{Deserialize, Serialize};

/// The owner of a content record, addressed by notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}
