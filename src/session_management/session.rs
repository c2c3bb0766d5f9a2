use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A connected VPN client as known by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Generated once per registry entry, kept while the real address stays connected.
    pub session_id: Uuid,
    pub virtual_address: String,
    /// Registry key.
    pub real_address: String,
    pub common_name: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new(real_address: &str, virtual_address: &str, common_name: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            virtual_address: virtual_address.to_string(),
            real_address: real_address.to_string(),
            common_name: common_name.to_string(),
            first_seen: now,
            last_seen: now,
        }
    }
}
