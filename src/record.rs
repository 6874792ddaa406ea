// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record and pending-operation data model.
//!
//! A [`Record`] is a JSON document with an optional id. Records written while
//! offline get a locally generated id (`local_<millis>_<random>`) so replay
//! can tell "never reached the remote store" apart from "already exists
//! remotely".
//!
//! # Example
//!
//! ```
//! use opendoor_sync::{Record, is_local_id};
//! use serde_json::json;
//!
//! let mut record = Record::from_json(json!({"location": "LA", "beds": 2})).unwrap();
//! assert!(record.id.is_none());
//!
//! let id = record.ensure_id().to_string();
//! assert!(is_local_id(&id));
//! assert_eq!(record.str_field("location"), Some("LA"));
//! ```

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix carried by ids that were generated on this device.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Current time as epoch millis.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Generate a fresh `local_<millis>_<random>` id.
#[must_use]
pub fn generate_local_id() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}_{}", LOCAL_ID_PREFIX, now_millis(), &random[..9])
}

/// True when the id was generated locally and has not been persisted remotely.
#[must_use]
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Kind of record, one local table per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    Request,
    Pledge,
    Message,
    UserData,
    ReliefCenter,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Request,
        RecordKind::Pledge,
        RecordKind::Message,
        RecordKind::UserData,
        RecordKind::ReliefCenter,
    ];

    /// Local table holding records of this kind.
    #[must_use]
    pub fn table(&self) -> &'static str {
        match self {
            Self::Request => "requests",
            Self::Pledge => "pledges",
            Self::Message => "messages",
            Self::UserData => "userData",
            Self::ReliefCenter => "reliefCenters",
        }
    }

    /// Operation kind used when a record of this kind is queued.
    /// Relief centers are reference data and are never queued.
    #[must_use]
    pub fn operation_kind(&self) -> Option<OperationKind> {
        match self {
            Self::Request => Some(OperationKind::Request),
            Self::Pledge => Some(OperationKind::Pledge),
            Self::Message => Some(OperationKind::Message),
            Self::UserData => Some(OperationKind::User),
            Self::ReliefCenter => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table())
    }
}

/// Kind of deferred write, selecting one remote write strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Request,
    Pledge,
    Message,
    User,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Request,
        OperationKind::Pledge,
        OperationKind::Message,
        OperationKind::User,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Pledge => "pledge",
            Self::Message => "message",
            Self::User => "user",
        }
    }

    /// Local table the operation's record lives in.
    #[must_use]
    pub fn record_kind(&self) -> RecordKind {
        match self {
            Self::Request => RecordKind::Request,
            Self::Pledge => RecordKind::Pledge,
            Self::Message => RecordKind::Message,
            Self::User => RecordKind::UserData,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(Self::Request),
            "pledge" => Ok(Self::Pledge),
            "message" => Ok(Self::Message),
            "user" => Ok(Self::User),
            other => Err(format!("unknown operation type '{}'", other)),
        }
    }
}

/// Replay status of a pending operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Eligible for the next drain pass
    #[default]
    Active,
    /// Quarantined after too many failures
    Failed,
}

impl OperationStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown operation status '{}'", other)),
        }
    }
}

/// A JSON document stored in one of the record tables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Build a record from a JSON object. An `"id"` string key becomes the id.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Build a record from remote document fields.
    #[must_use]
    pub fn with_id(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        let mut fields = fields;
        fields.remove("id");
        Self { id: Some(id.into()), fields }
    }

    /// The record id, generating a local one when absent.
    pub fn ensure_id(&mut self) -> &str {
        self.id.get_or_insert_with(generate_local_id)
    }

    /// True when the record has a locally generated id.
    #[must_use]
    pub fn has_local_id(&self) -> bool {
        self.id.as_deref().is_some_and(is_local_id)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// The record as a single JSON object (id included when present).
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut map = self.fields.clone();
        if let Some(ref id) = self.id {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        Value::Object(map)
    }
}

/// One deferred write waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Store-assigned, auto-incrementing
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub data: Record,
    /// Enqueue time (epoch millis)
    pub timestamp: i64,
    pub attempts: u32,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PendingOperation {
    #[must_use]
    pub fn is_quarantined(&self) -> bool {
        self.status == OperationStatus::Failed
    }

    /// Count one failed replay, quarantining at `max_attempts`.
    pub fn record_failure(&mut self, error: impl Into<String>, max_attempts: u32) {
        self.attempts += 1;
        self.last_error = Some(error.into());
        if self.attempts >= max_attempts {
            self.status = OperationStatus::Failed;
        }
    }
}
