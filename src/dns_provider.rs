//! DNS provider abstraction layer
//!
//! The reconciler only needs three calls from a provider: look up the record
//! for a (name, type) pair, create one, and update one by id. Keeping them
//! behind a trait lets the reconciliation logic be tested without a network.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::address::AddressFamily;

//==============================================================================
// Types
//==============================================================================

/// DNS record types this crate manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
        }
    }

    /// Address family whose public address this record publishes
    pub fn family(self) -> AddressFamily {
        match self {
            Self::A => AddressFamily::V4,
            Self::Aaaa => AddressFamily::V6,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::Aaaa),
            _ => Err(anyhow!("Unsupported record type '{}'. Use: A|AAAA", s)),
        }
    }
}

/// One desired DNS record to keep in sync
///
/// Built once at startup and never mutated. `name` may be empty when it was
/// read from a file that turned out to be empty; such records are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRecord {
    pub name: String,
    pub record_type: RecordType,
    pub proxied: bool,
    /// Seconds, where 1 means "automatic"
    pub ttl: u32,
}

impl fmt::Display for DomainRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (TTL: {}, Proxied: {})",
            self.record_type, self.name, self.ttl, self.proxied
        )
    }
}

/// The provider's live view of a (name, type) pair
///
/// Only constructed from a successful provider read. A failed read is an
/// error, never a `RemoteRecordState`, so "absent" always means confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRecordState {
    pub record_id: Option<String>,
    pub content: Option<String>,
}

impl RemoteRecordState {
    /// The provider confirmed that no matching record exists
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn existing(record_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            record_id: Some(record_id.into()),
            content: Some(content.into()),
        }
    }
}

/// Body of a create or update call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

impl RecordPayload {
    pub fn new(record: &DomainRecord, content: impl Into<String>) -> Self {
        Self {
            record_type: record.record_type,
            name: record.name.clone(),
            content: content.into(),
            ttl: record.ttl,
            proxied: record.proxied,
        }
    }
}

//==============================================================================
// Trait
//==============================================================================

/// DNS provider operations consumed by the reconciler
///
/// Implementations must not retry internally; a failed call is reported and
/// the next cycle naturally retries it.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Reads the current record for `(name, record_type)` in the zone
    ///
    /// Returns [`RemoteRecordState::absent`] only when the provider
    /// answered successfully with zero matches.
    async fn find_record(&self, name: &str, record_type: RecordType)
        -> Result<RemoteRecordState>;

    /// Creates a new record
    async fn create_record(&self, payload: &RecordPayload) -> Result<()>;

    /// Overwrites the record identified by `record_id`
    async fn update_record(&self, record_id: &str, payload: &RecordPayload) -> Result<()>;
}

//==============================================================================
// Tests
//==============================================================================
