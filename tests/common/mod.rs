//! In-memory provider and address lookup for reconciliation tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use cf_ddns::address::{AddressFamily, AddressLookup};
use cf_ddns::dns_provider::{
    DnsProvider, DomainRecord, RecordPayload, RecordType, RemoteRecordState,
};

/// A provider call, in the order it was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Find { name: String, record_type: RecordType },
    Create(RecordPayload),
    Update { record_id: String, payload: RecordPayload },
}

/// Zone held in memory, keyed by (name, type)
#[derive(Default)]
pub struct FakeProvider {
    zone: Mutex<HashMap<(String, RecordType), (String, String)>>,
    calls: Mutex<Vec<Call>>,
    failing_reads: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    next_id: Mutex<u64>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, name: &str, record_type: RecordType, content: &str) -> String {
        let id = self.allocate_id();
        self.zone.lock().unwrap().insert(
            (name.to_string(), record_type),
            (id.clone(), content.to_string()),
        );
        id
    }

    pub fn content(&self, name: &str, record_type: RecordType) -> Option<String> {
        self.zone
            .lock()
            .unwrap()
            .get(&(name.to_string(), record_type))
            .map(|(_, content)| content.clone())
    }

    /// List calls for `name` fail as if the request timed out
    pub fn fail_reads_for(&self, name: &str) {
        self.failing_reads.lock().unwrap().insert(name.to_string());
    }

    /// Writes for `name` come back with `success: false`
    pub fn fail_writes_for(&self, name: &str) {
        self.failing_writes.lock().unwrap().insert(name.to_string());
    }

    pub fn heal(&self) {
        self.failing_reads.lock().unwrap().clear();
        self.failing_writes.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Find { .. }))
            .collect()
    }

    fn allocate_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("rec{}", *next)
    }

    fn check_write(&self, name: &str) -> Result<()> {
        if self.failing_writes.lock().unwrap().contains(name) {
            bail!("Create failed (HTTP 400): [9004] This record type cannot be proxied.");
        }
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for FakeProvider {
    async fn find_record(&self, name: &str, record_type: RecordType) -> Result<RemoteRecordState> {
        self.calls.lock().unwrap().push(Call::Find {
            name: name.to_string(),
            record_type,
        });
        if self.failing_reads.lock().unwrap().contains(name) {
            return Err(anyhow!("List request failed: operation timed out"));
        }
        Ok(
            match self.zone.lock().unwrap().get(&(name.to_string(), record_type)) {
                Some((id, content)) => RemoteRecordState::existing(id.clone(), content.clone()),
                None => RemoteRecordState::absent(),
            },
        )
    }

    async fn create_record(&self, payload: &RecordPayload) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Create(payload.clone()));
        self.check_write(&payload.name)?;
        let id = self.allocate_id();
        self.zone.lock().unwrap().insert(
            (payload.name.clone(), payload.record_type),
            (id, payload.content.clone()),
        );
        Ok(())
    }

    async fn update_record(&self, record_id: &str, payload: &RecordPayload) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Update {
            record_id: record_id.to_string(),
            payload: payload.clone(),
        });
        self.check_write(&payload.name)?;
        let mut zone = self.zone.lock().unwrap();
        let entry = zone
            .get_mut(&(payload.name.clone(), payload.record_type))
            .ok_or_else(|| anyhow!("Update failed: record {} not found", record_id))?;
        entry.1 = payload.content.clone();
        Ok(())
    }
}

/// Address lookup answering from a table; missing families fail
#[derive(Default)]
pub struct FakeLookup {
    answers: Mutex<HashMap<AddressFamily, IpAddr>>,
}

impl FakeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, family: AddressFamily, addr: &str) {
        self.answers
            .lock()
            .unwrap()
            .insert(family, addr.parse().expect("valid address"));
    }

    pub fn fail(&self, family: AddressFamily) {
        self.answers.lock().unwrap().remove(&family);
    }
}

#[async_trait]
impl AddressLookup for FakeLookup {
    async fn lookup(&self, family: AddressFamily) -> Result<IpAddr> {
        self.answers
            .lock()
            .unwrap()
            .get(&family)
            .copied()
            .ok_or_else(|| anyhow!("{} lookup request failed: operation timed out", family))
    }
}

pub fn record(name: &str, record_type: RecordType, proxied: bool, ttl: u32) -> DomainRecord {
    DomainRecord {
        name: name.to_string(),
        record_type,
        proxied,
        ttl,
    }
}
