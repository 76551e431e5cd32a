//! Bucket notification envelope.
//!
//! Both webhooks receive the S3 event format and handle exactly one object
//! per call.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("Malformed bucket event: {0}")]
    Malformed(String),

    #[error("Bucket event must carry exactly one record, got {0}")]
    RecordCount(usize),
}

#[derive(Debug, Deserialize)]
pub struct BucketEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectRef {
    /// Still URL-escaped as delivered
    pub key: String,
}

/// The one object an event refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl BucketEvent {
    pub fn parse(body: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(body).map_err(|e| EventError::Malformed(e.to_string()))
    }

    pub fn into_single_object(mut self) -> Result<ObjectLocation, EventError> {
        if self.records.len() != 1 {
            return Err(EventError::RecordCount(self.records.len()));
        }
        let record = self.records.remove(0);
        Ok(ObjectLocation {
            bucket: record.s3.bucket.name,
            key: record.s3.object.key,
        })
    }
}
