//! Validation utilities for cf-ddns
//!
//! Record names are checked before they reach the provider, and addresses
//! returned by lookup endpoints are checked before they are published.

use std::net::IpAddr;

use anyhow::{anyhow, bail, Result};

use crate::address::AddressFamily;
use crate::constants::{MAX_LABEL_LENGTH, MAX_RECORD_NAME_LENGTH};

/// Validates that a string is a usable DNS record name
///
/// Follows RFC 1035 label rules with the usual relaxations for real zones:
///
/// - at most 253 characters overall (a trailing dot is ignored) and 63 per label
/// - labels separated by single dots, no leading dot, no empty labels
/// - letters, digits, `-` (not at a label boundary) and `_`
/// - `*` allowed as a complete label for wildcard records
/// - `@` accepted for the zone apex
///
/// # Examples
///
/// ```
/// use cf_ddns::validation::validate_record_name;
///
/// assert!(validate_record_name("jf.example.com").is_ok());
/// assert!(validate_record_name("*.example.com").is_ok());
/// assert!(validate_record_name("example..com").is_err());
/// assert!(validate_record_name("").is_err());
/// ```
pub fn validate_record_name(record_name: &str) -> Result<()> {
    let trimmed = record_name.trim();
    if trimmed.is_empty() {
        bail!("Record name cannot be empty");
    }
    if trimmed == "@" {
        return Ok(());
    }
    if trimmed.contains(char::is_whitespace) {
        bail!("Record name cannot contain whitespace");
    }

    let name = trimmed.strip_suffix('.').unwrap_or(trimmed);
    if name.is_empty() {
        bail!("Record name cannot be empty");
    }
    if name.len() > MAX_RECORD_NAME_LENGTH {
        bail!(
            "Record name too long (max {} characters, got {})",
            MAX_RECORD_NAME_LENGTH,
            name.len()
        );
    }
    if name.starts_with('.') {
        bail!("Record name cannot start with a dot");
    }
    if name.contains("..") {
        bail!("Record name cannot contain consecutive dots");
    }

    for label in name.split('.') {
        if label.is_empty() {
            bail!("Record name contains empty label");
        }
        if label == "*" {
            continue;
        }
        if label.len() > MAX_LABEL_LENGTH {
            bail!(
                "Record name label too long (max {} characters, got {})",
                MAX_LABEL_LENGTH,
                label.len()
            );
        }
        if label.starts_with('-') || label.ends_with('-') {
            bail!("Record name label cannot start or end with hyphen");
        }
        if let Some(ch) = label
            .chars()
            .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '-' && *ch != '_')
        {
            return Err(anyhow!(
                "Record name contains invalid character: '{}' (allowed: letters, digits, '-', '_', or wildcard labels)",
                ch
            ));
        }
    }

    Ok(())
}

/// Parses the body of an address lookup response
///
/// The body must be a single address of the requested family, optionally
/// surrounded by whitespace. Addresses that can never be a host's public
/// address are rejected:
///
/// - unspecified (`0.0.0.0`, `::`)
/// - loopback (`127.0.0.0/8`, `::1`)
/// - multicast and broadcast
/// - link-local (`169.254.0.0/16`, `fe80::/10`)
///
/// Documentation ranges are accepted so test deployments can publish them.
pub fn parse_public_address(body: &str, family: AddressFamily) -> Result<IpAddr> {
    let text = body.trim();
    if text.is_empty() {
        bail!("empty response body");
    }

    let addr: IpAddr = text
        .parse()
        .map_err(|_| anyhow!("response is not an IP address: {:?}", truncate(text, 64)))?;

    if AddressFamily::of(&addr) != family {
        bail!("expected an {} address, got {}", family, addr);
    }
    if addr.is_unspecified() || addr.is_loopback() || addr.is_multicast() {
        bail!("{} is not a public address", addr);
    }

    match addr {
        IpAddr::V4(v4) => {
            if v4.is_link_local() || v4.is_broadcast() {
                bail!("{} is not a public address", addr);
            }
        }
        IpAddr::V6(v6) => {
            // fe80::/10
            if v6.segments()[0] & 0xffc0 == 0xfe80 {
                bail!("{} is not a public address", addr);
            }
        }
    }

    Ok(addr)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
