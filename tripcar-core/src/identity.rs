use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tripcar_shared::Masked;

use crate::CoreResult;

/// Counterpart contact details surfaced on booking views
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub name: String,
    pub phone: Option<Masked<String>>,
}

impl Contact {
    pub fn unknown() -> Self {
        Self { name: "Unknown".to_string(), phone: None }
    }
}

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn get_contact(&self, user_id: &str) -> CoreResult<Option<Contact>>;
}
