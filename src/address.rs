//! Public address discovery over HTTP
//!
//! Each enabled address family is resolved by a plain GET against an
//! "echo my IP" endpoint that answers with the caller's address as bare text.
//! A failed lookup only affects the records of that family for this cycle.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::constants::{MAX_LOOKUP_BODY_BYTES, USER_AGENT};
use crate::metrics;
use crate::validation::parse_public_address;

//==============================================================================
// Types
//==============================================================================

/// IP address family, resolved and reconciled independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Family of a concrete address
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    /// Lowercase label for metrics
    pub fn label(self) -> &'static str {
        match self {
            Self::V4 => "ipv4",
            Self::V6 => "ipv6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("IPv4"),
            Self::V6 => f.write_str("IPv6"),
        }
    }
}

/// The observed external address for one family in the current cycle
///
/// `value` is `None` when the lookup failed; records of that family are
/// skipped until the next cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicAddress {
    pub family: AddressFamily,
    pub value: Option<IpAddr>,
}

//==============================================================================
// Trait
//==============================================================================

/// Source of the host's current public address
#[async_trait]
pub trait AddressLookup: Send + Sync {
    /// Returns the current public address for `family`
    ///
    /// # Errors
    ///
    /// Fails when the family has no endpoint, the request fails or times out,
    /// the endpoint answers with a non-2xx status, or the body is not a usable
    /// address of the requested family.
    async fn lookup(&self, family: AddressFamily) -> Result<IpAddr>;
}

//==============================================================================
// HTTP implementation
//==============================================================================

/// Looks up public addresses by querying a per-family URL
pub struct HttpAddressLookup {
    client: reqwest::Client,
    endpoints: HashMap<AddressFamily, String>,
}

impl HttpAddressLookup {
    pub fn new(endpoints: HashMap<AddressFamily, String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("build reqwest client")?;

        Ok(Self { client, endpoints })
    }
}

#[async_trait]
impl AddressLookup for HttpAddressLookup {
    async fn lookup(&self, family: AddressFamily) -> Result<IpAddr> {
        let Some(url) = self.endpoints.get(&family) else {
            bail!("no lookup endpoint configured for {}", family);
        };

        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("{} lookup request failed", family))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("{} lookup returned HTTP {}", family, status.as_u16());
        }

        if resp
            .content_length()
            .is_some_and(|len| len > MAX_LOOKUP_BODY_BYTES as u64)
        {
            bail!("{} lookup body exceeds {} bytes", family, MAX_LOOKUP_BODY_BYTES);
        }
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("{} lookup body unreadable", family))?;
        if body.len() > MAX_LOOKUP_BODY_BYTES {
            bail!("{} lookup body exceeds {} bytes", family, MAX_LOOKUP_BODY_BYTES);
        }
        let body = std::str::from_utf8(&body)
            .with_context(|| format!("{} lookup body is not UTF-8", family))?;

        parse_public_address(body, family)
            .with_context(|| format!("{} lookup from {} unusable", family, url))
    }
}

//==============================================================================
// Helpers
//==============================================================================

/// Resolves every enabled family, converting failures into absent values
pub async fn resolve_addresses(
    lookup: &dyn AddressLookup,
    families: &[AddressFamily],
) -> Vec<PublicAddress> {
    let mut resolved = Vec::with_capacity(families.len());
    for &family in families {
        let value = match lookup.lookup(family).await {
            Ok(addr) => {
                info!("Public {} address: {}", family, addr);
                Some(addr)
            }
            Err(e) => {
                warn!("{} lookup failed, skipping its records this cycle: {:#}", family, e);
                metrics::record_lookup_failure(family.label());
                None
            }
        };
        resolved.push(PublicAddress { family, value });
    }
    resolved
}

//==============================================================================
// Tests
//==============================================================================
