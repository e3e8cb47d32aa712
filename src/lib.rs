//! cf-ddns - Cloudflare DDNS reconciler
//!
//! Architecture:
//! - Public addresses come from plain-text HTTP echo endpoints, one per family
//! - Each cycle reads live provider state and writes only what is stale
//! - No state survives between cycles; the next cycle repairs any failure
//! - Uses reqwest for HTTP (rustls)

pub mod address;
pub mod cloudflare;
pub mod config;
pub mod constants;
pub mod dns_provider;
pub mod metrics;
pub mod reconciler;
pub mod schedule;
pub mod secrets;
pub mod units;
pub mod validation;
