use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A partner's inbound storage root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerFolder {
    pub partner_folder_id: i64,
    pub name: String,
    pub bucket_name: String,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl PartnerFolder {
    pub fn is_deactivated(&self) -> bool {
        self.deactivated_at.is_some()
    }
}
