//! DNS record reconciliation
//!
//! One cycle resolves the public address of every enabled family, then brings
//! each configured record in line with it:
//!
//! ```text
//! resolve name -> fetch remote state -> {unchanged | create | update} -> done
//! ```
//!
//! Nothing is remembered between cycles. A failed write is simply retried by
//! the next cycle, because the comparison will show the same mismatch again.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::address::{resolve_addresses, AddressFamily, AddressLookup, PublicAddress};
use crate::constants::DEFAULT_MAX_CONCURRENCY;
use crate::dns_provider::{DnsProvider, DomainRecord, RecordPayload, RemoteRecordState};
use crate::metrics;
use crate::secrets::redact_secrets;
use crate::validation::validate_record_name;

//==============================================================================
// Decision
//==============================================================================

/// What a record needs, given the live provider state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Unchanged,
    Create,
    Update { record_id: String },
}

/// Decides the action for one record
///
/// `remote` must come from a successful provider read; a failed read never
/// reaches this function, so `Create` is only chosen for a confirmed absence.
pub fn plan(address: &IpAddr, remote: &RemoteRecordState) -> Action {
    if let Some(content) = remote.content.as_deref() {
        if content_matches(content, address) {
            return Action::Unchanged;
        }
    }

    match &remote.record_id {
        Some(record_id) => Action::Update {
            record_id: record_id.clone(),
        },
        None => Action::Create,
    }
}

fn content_matches(content: &str, address: &IpAddr) -> bool {
    match content.trim().parse::<IpAddr>() {
        Ok(published) => published == *address,
        Err(_) => content.trim() == address.to_string(),
    }
}

//==============================================================================
// Outcomes
//==============================================================================

/// Why a record was not reconciled this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The record's family is not enabled in the configuration
    FamilyDisabled,
    /// The name resolved to an empty string
    EmptyName,
    /// The name is not a valid DNS record name
    InvalidName(String),
    /// The public address of the record's family could not be determined
    NoAddress(AddressFamily),
    /// The provider read failed, so the remote state is unknown
    ProviderRead(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FamilyDisabled => f.write_str("address family disabled"),
            Self::EmptyName => f.write_str("empty record name"),
            Self::InvalidName(e) => write!(f, "invalid record name: {}", e),
            Self::NoAddress(family) => write!(f, "no public {} address", family),
            Self::ProviderRead(e) => write!(f, "provider read failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Unchanged,
    Created,
    Updated,
    Skipped(SkipReason),
    /// A create or update call failed
    Failed(String),
}

impl RecordOutcome {
    /// Label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Skipped(SkipReason::FamilyDisabled) => "disabled",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }

    /// Whether this outcome leaves the record possibly out of date
    pub fn is_problem(&self) -> bool {
        matches!(
            self,
            Self::Failed(_)
                | Self::Skipped(
                    SkipReason::EmptyName
                        | SkipReason::InvalidName(_)
                        | SkipReason::NoAddress(_)
                        | SkipReason::ProviderRead(_)
                )
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReport {
    pub record: DomainRecord,
    pub outcome: RecordOutcome,
}

/// Result of one cycle, records in configuration order
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub addresses: Vec<PublicAddress>,
    pub records: Vec<RecordReport>,
}

impl CycleReport {
    pub fn count(&self, label: &str) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }

    pub fn problems(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_problem()).count()
    }
}

//==============================================================================
// Reconciler
//==============================================================================

/// Drives reconciliation cycles over a fixed set of records
pub struct Reconciler {
    provider: Arc<dyn DnsProvider>,
    lookup: Arc<dyn AddressLookup>,
    records: Vec<DomainRecord>,
    families: Vec<AddressFamily>,
    max_concurrency: usize,
    /// Values scrubbed from every logged error
    redacted: Arc<Vec<Zeroizing<String>>>,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        lookup: Arc<dyn AddressLookup>,
        records: Vec<DomainRecord>,
        families: Vec<AddressFamily>,
    ) -> Self {
        Self {
            provider,
            lookup,
            records,
            families,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            redacted: Arc::new(Vec::new()),
        }
    }

    /// Bounds how many record groups are reconciled at once
    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Values that must never appear in log output or reports
    pub fn with_redacted(mut self, secrets: Vec<Zeroizing<String>>) -> Self {
        self.redacted = Arc::new(secrets);
        self
    }

    pub fn records(&self) -> &[DomainRecord] {
        &self.records
    }

    /// Runs one full cycle
    ///
    /// Never fails as a whole: every problem is contained to the family or
    /// record it affects and reported in the returned [`CycleReport`].
    /// Dropping the future aborts all in-flight provider calls.
    pub async fn run_cycle(&self) -> CycleReport {
        let addresses = resolve_addresses(self.lookup.as_ref(), &self.families).await;
        let by_family: HashMap<AddressFamily, Option<IpAddr>> =
            addresses.iter().map(|a| (a.family, a.value)).collect();

        let mut outcomes: Vec<Option<RecordOutcome>> = vec![None; self.records.len()];
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for group in self.groups() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let redacted = Arc::clone(&self.redacted);
            let work: Vec<(usize, DomainRecord, Option<Option<IpAddr>>)> = group
                .into_iter()
                .map(|idx| {
                    let record = self.records[idx].clone();
                    let address = by_family.get(&record.record_type.family()).copied();
                    (idx, record, address)
                })
                .collect();

            tasks.spawn(async move {
                let mut results = Vec::with_capacity(work.len());
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return results;
                };
                // Records sharing a name and type go one after another
                for (idx, record, address) in work {
                    let outcome =
                        reconcile_record(provider.as_ref(), &record, address, &redacted).await;
                    results.push((idx, outcome));
                }
                results
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(results) => {
                    for (idx, outcome) in results {
                        outcomes[idx] = Some(outcome);
                    }
                }
                Err(e) => error!("Reconciliation task aborted: {}", e),
            }
        }

        let records: Vec<RecordReport> = self
            .records
            .iter()
            .zip(outcomes)
            .map(|(record, outcome)| {
                let outcome = outcome
                    .unwrap_or_else(|| RecordOutcome::Failed("reconciliation task aborted".into()));
                metrics::record_outcome(outcome.label());
                RecordReport {
                    record: record.clone(),
                    outcome,
                }
            })
            .collect();

        let report = CycleReport { addresses, records };
        metrics::finish_cycle(report.problems());
        info!(
            "Cycle complete: {} created, {} updated, {} unchanged, {} with problems",
            report.count("created"),
            report.count("updated"),
            report.count("unchanged"),
            report.problems()
        );
        report
    }

    /// Record indices grouped by (name, type), in first-seen order
    fn groups(&self) -> Vec<Vec<usize>> {
        let mut index: HashMap<(String, &'static str), usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (idx, record) in self.records.iter().enumerate() {
            let key = (
                record.name.trim_end_matches('.').to_ascii_lowercase(),
                record.record_type.as_str(),
            );
            match index.get(&key) {
                Some(&group) => groups[group].push(idx),
                None => {
                    index.insert(key, groups.len());
                    groups.push(vec![idx]);
                }
            }
        }
        groups
    }
}

/// Reconciles one record against the provider
///
/// `address` is `None` when the record's family is not enabled, and
/// `Some(None)` when it is enabled but its lookup failed this cycle.
async fn reconcile_record(
    provider: &dyn DnsProvider,
    record: &DomainRecord,
    address: Option<Option<IpAddr>>,
    redacted: &[Zeroizing<String>],
) -> RecordOutcome {
    let Some(address) = address else {
        debug!("{} {} skipped: family not enabled", record.record_type, record.name);
        return RecordOutcome::Skipped(SkipReason::FamilyDisabled);
    };
    if record.name.trim().is_empty() {
        error!(
            "CONFIGURATION ERROR: {} record has an empty name; skipping it",
            record.record_type
        );
        return RecordOutcome::Skipped(SkipReason::EmptyName);
    }
    if let Err(e) = validate_record_name(&record.name) {
        error!(
            "CONFIGURATION ERROR: {} record has an invalid name ({}); skipping it",
            record.record_type, e
        );
        return RecordOutcome::Skipped(SkipReason::InvalidName(e.to_string()));
    }
    let family = record.record_type.family();
    let Some(address) = address else {
        warn!(
            "{} {} skipped: no public {} address this cycle",
            record.record_type, record.name, family
        );
        return RecordOutcome::Skipped(SkipReason::NoAddress(family));
    };

    let remote = match provider.find_record(&record.name, record.record_type).await {
        Ok(remote) => remote,
        Err(e) => {
            let msg = scrub(&format!("{:#}", e), redacted);
            warn!(
                "{} {} skipped: provider read failed: {}",
                record.record_type, record.name, msg
            );
            return RecordOutcome::Skipped(SkipReason::ProviderRead(msg));
        }
    };

    let payload = RecordPayload::new(record, address.to_string());
    match plan(&address, &remote) {
        Action::Unchanged => {
            info!("{} {} unchanged ({})", record.record_type, record.name, address);
            RecordOutcome::Unchanged
        }
        Action::Create => {
            info!(
                "Creating {} {} -> {} (TTL: {}, Proxied: {})",
                record.record_type, record.name, address, record.ttl, record.proxied
            );
            match provider.create_record(&payload).await {
                Ok(()) => RecordOutcome::Created,
                Err(e) => write_failed(record, "create", &e, redacted),
            }
        }
        Action::Update { record_id } => {
            info!(
                "Updating {} {}: {} -> {}",
                record.record_type,
                record.name,
                remote.content.as_deref().unwrap_or("<none>"),
                address
            );
            match provider.update_record(&record_id, &payload).await {
                Ok(()) => RecordOutcome::Updated,
                Err(e) => write_failed(record, "update", &e, redacted),
            }
        }
    }
}

fn write_failed(
    record: &DomainRecord,
    operation: &str,
    err: &anyhow::Error,
    redacted: &[Zeroizing<String>],
) -> RecordOutcome {
    let msg = scrub(&format!("{:#}", err), redacted);
    error!(
        "Failed to {} {} {}: {}",
        operation, record.record_type, record.name, msg
    );
    RecordOutcome::Failed(msg)
}

fn scrub(message: &str, redacted: &[Zeroizing<String>]) -> String {
    let secrets: Vec<&str> = redacted.iter().map(|s| s.as_str()).collect();
    redact_secrets(message, &secrets)
}

//==============================================================================
// Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_provider::RecordType;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn record(name: &str, record_type: RecordType) -> DomainRecord {
        DomainRecord {
            name: name.to_string(),
            record_type,
            proxied: false,
            ttl: 1,
        }
    }

    #[test]
    fn test_plan_absent_creates() {
        let action = plan(&addr("203.0.113.9"), &RemoteRecordState::absent());
        assert_eq!(action, Action::Create);
    }

    #[test]
    fn test_plan_matching_is_unchanged() {
        let remote = RemoteRecordState::existing("rec1", "203.0.113.9");
        assert_eq!(plan(&addr("203.0.113.9"), &remote), Action::Unchanged);
    }

    #[test]
    fn test_plan_stale_updates() {
        let remote = RemoteRecordState::existing("rec1", "198.51.100.7");
        assert_eq!(
            plan(&addr("203.0.113.9"), &remote),
            Action::Update {
                record_id: "rec1".to_string()
            }
        );
    }

    #[test]
    fn test_plan_compares_ipv6_semantically() {
        let remote = RemoteRecordState::existing("rec6", "2001:DB8:0:0::1");
        assert_eq!(plan(&addr("2001:db8::1"), &remote), Action::Unchanged);
    }

    #[test]
    fn test_plan_garbage_content_updates() {
        let remote = RemoteRecordState::existing("rec1", "not-an-ip");
        assert!(matches!(
            plan(&addr("203.0.113.9"), &remote),
            Action::Update { .. }
        ));
    }

    #[test]
    fn test_outcome_labels_and_problems() {
        assert_eq!(RecordOutcome::Created.label(), "created");
        assert!(!RecordOutcome::Unchanged.is_problem());
        assert!(!RecordOutcome::Skipped(SkipReason::FamilyDisabled).is_problem());
        assert!(RecordOutcome::Skipped(SkipReason::EmptyName).is_problem());
        assert!(RecordOutcome::Skipped(SkipReason::InvalidName("bad".into())).is_problem());
        assert_eq!(
            RecordOutcome::Skipped(SkipReason::InvalidName("bad".into())).label(),
            "skipped"
        );
        assert!(RecordOutcome::Failed("boom".into()).is_problem());
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::NoAddress(AddressFamily::V6);
        assert_eq!(reason.to_string(), "no public IPv6 address");
    }

    #[test]
    fn test_scrub_removes_secrets() {
        let secrets = vec![Zeroizing::new("zone123abc".to_string())];
        let msg = scrub("GET /zones/zone123abc/dns_records failed", &secrets);
        assert!(!msg.contains("zone123abc"));
    }

    struct NoLookup;

    #[async_trait::async_trait]
    impl AddressLookup for NoLookup {
        async fn lookup(&self, family: AddressFamily) -> anyhow::Result<IpAddr> {
            anyhow::bail!("{} unavailable", family)
        }
    }

    struct NoProvider;

    #[async_trait::async_trait]
    impl DnsProvider for NoProvider {
        async fn find_record(
            &self,
            _name: &str,
            _record_type: RecordType,
        ) -> anyhow::Result<RemoteRecordState> {
            panic!("provider must not be called")
        }
        async fn create_record(&self, _payload: &RecordPayload) -> anyhow::Result<()> {
            panic!("provider must not be called")
        }
        async fn update_record(
            &self,
            _record_id: &str,
            _payload: &RecordPayload,
        ) -> anyhow::Result<()> {
            panic!("provider must not be called")
        }
    }

    #[test]
    fn test_groups_share_name_and_type() {
        let reconciler = Reconciler::new(
            Arc::new(NoProvider),
            Arc::new(NoLookup),
            vec![
                record("a.example.com", RecordType::A),
                record("b.example.com", RecordType::A),
                record("A.example.com.", RecordType::A),
                record("a.example.com", RecordType::Aaaa),
            ],
            vec![AddressFamily::V4],
        );
        assert_eq!(reconciler.groups(), vec![vec![0, 2], vec![1], vec![3]]);
    }

    #[tokio::test]
    async fn test_cycle_without_addresses_makes_no_calls() {
        let reconciler = Reconciler::new(
            Arc::new(NoProvider),
            Arc::new(NoLookup),
            vec![
                record("jf.example.com", RecordType::A),
                record("jf.example.com", RecordType::Aaaa),
                record("", RecordType::A),
            ],
            vec![AddressFamily::V4],
        );

        let report = reconciler.run_cycle().await;
        assert_eq!(
            report.records[0].outcome,
            RecordOutcome::Skipped(SkipReason::NoAddress(AddressFamily::V4))
        );
        assert_eq!(
            report.records[1].outcome,
            RecordOutcome::Skipped(SkipReason::FamilyDisabled)
        );
        assert_eq!(
            report.records[2].outcome,
            RecordOutcome::Skipped(SkipReason::EmptyName)
        );
        assert_eq!(report.problems(), 2);
    }
}
