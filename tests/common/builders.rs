//! Fixture data for pipeline tests.

use chrono::{NaiveDate, Utc};

use ingest_core::models::{
    FileIdentifier, PartnerFolder, PatientRecord, ResultRecords, ResultsPayload, RowError,
    Template,
};

pub const PARTNER_FOLDER_ID: i64 = 1;
pub const PARTNER_BUCKET: &str = "acme";
pub const EXCHANGE_BUCKET: &str = "exchange";

/// Channel of the `members` prefix template
pub const MEMBERS_CHANNEL: i64 = 500;
pub const MEMBERS_TEMPLATE_ID: i64 = 10;

/// Channel of the `_claims` suffix template
pub const CLAIMS_CHANNEL: i64 = 501;
pub const CLAIMS_TEMPLATE_ID: i64 = 11;

pub fn partner_folder() -> PartnerFolder {
    PartnerFolder {
        partner_folder_id: PARTNER_FOLDER_ID,
        name: "Acme Health".to_string(),
        bucket_name: PARTNER_BUCKET.to_string(),
        deactivated_at: None,
    }
}

/// Builder for templates of the test partner
pub struct TemplateBuilder {
    template: Template,
}

impl TemplateBuilder {
    pub fn new(template_id: i64, file_identifier: FileIdentifier) -> Self {
        Self {
            template: Template {
                template_id,
                name: format!("template-{template_id}"),
                file_identifier,
                partner_folder_id: PARTNER_FOLDER_ID,
                channel_id: 1000 + template_id,
                market_id: 7,
                column_mapping: serde_json::json!({"FirstName": "first_name"}),
                is_active: true,
                updated_at: Utc::now(),
            },
        }
    }

    pub fn channel(mut self, channel_id: i64) -> Self {
        self.template.channel_id = channel_id;
        self
    }

    pub fn folder(mut self, partner_folder_id: i64) -> Self {
        self.template.partner_folder_id = partner_folder_id;
        self
    }

    pub fn build(self) -> Template {
        self.template
    }
}

pub fn members_template() -> Template {
    TemplateBuilder::new(MEMBERS_TEMPLATE_ID, FileIdentifier::prefix("members"))
        .channel(MEMBERS_CHANNEL)
        .build()
}

pub fn claims_template() -> Template {
    TemplateBuilder::new(CLAIMS_TEMPLATE_ID, FileIdentifier::suffix("_claims"))
        .channel(CLAIMS_CHANNEL)
        .build()
}

pub fn patient(hash: &str, channel_id: i64) -> PatientRecord {
    PatientRecord {
        patient_hash: hash.to_string(),
        row_hash: format!("row-{hash}"),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        dob: "1815-12-10".to_string(),
        channel_item_id: channel_id,
        market_id: 7,
        ..PatientRecord::default()
    }
}

/// Builder for the results a processing run writes back
pub struct ResultsBuilder {
    payload: ResultsPayload,
}

impl ResultsBuilder {
    pub fn success(flow_run_id: &str) -> Self {
        Self {
            payload: ResultsPayload {
                flow_run_id: flow_run_id.to_string(),
                processed_at: None,
                status: "success".to_string(),
                refresh: false,
                number_new: 0,
                number_deleted: 0,
                number_updated: 0,
                records: ResultRecords::default(),
                row_errors: Vec::new(),
                file_errors: Vec::new(),
            },
        }
    }

    pub fn status(mut self, status: &str) -> Self {
        self.payload.status = status.to_string();
        self
    }

    pub fn refresh(mut self) -> Self {
        self.payload.refresh = true;
        self
    }

    /// New records; the declared count follows
    pub fn new_records(mut self, records: Vec<PatientRecord>) -> Self {
        self.payload.number_new = records.len();
        self.payload.records.new = records;
        self
    }

    /// Deleted hashes; the declared count follows
    pub fn deleted(mut self, hashes: &[&str]) -> Self {
        self.payload.number_deleted = hashes.len();
        self.payload.records.deleted = hashes.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn updated(mut self, number_updated: usize) -> Self {
        self.payload.number_updated = number_updated;
        self
    }

    /// Declare a count that disagrees with the delivered records
    pub fn declared_new(mut self, number_new: usize) -> Self {
        self.payload.number_new = number_new;
        self
    }

    pub fn row_error(mut self, code: &str, field: &str, number_failed: i64) -> Self {
        self.payload.row_errors.push(RowError {
            field: field.to_string(),
            number_failed,
            first_occurrence: 2,
            error_code: code.to_string(),
            error: format!("{field} is malformed"),
        });
        self
    }

    pub fn build(self) -> ResultsPayload {
        self.payload
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// S3 notification body for one object
pub fn bucket_event(bucket: &str, key: &str) -> String {
    serde_json::json!({
        "Records": [{"s3": {"bucket": {"name": bucket}, "object": {"key": key}}}]
    })
    .to_string()
}
