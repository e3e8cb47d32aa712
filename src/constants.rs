//! Common constants used throughout the cf-ddns application

//==============================================================================
// Cloudflare API Constants
//==============================================================================

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// User agent string for outgoing HTTP requests
pub const USER_AGENT: &str = "cf-ddns/1.0";

/// TTL value the provider interprets as "automatic"
pub const DNS_TTL_AUTO: u32 = 1;

//==============================================================================
// Address Lookup Constants
//==============================================================================

/// Default plain-text IPv4 echo endpoint
pub const DEFAULT_IPV4_URL: &str = "https://api.ipify.org";

/// Default plain-text IPv6 echo endpoint
pub const DEFAULT_IPV6_URL: &str = "https://api6.ipify.org";

/// Largest lookup response accepted; an address with a newline fits easily
pub const MAX_LOOKUP_BODY_BYTES: usize = 64;

//==============================================================================
// Timeout and Concurrency Constants
//==============================================================================

/// Default address lookup timeout in seconds
pub const DEFAULT_LOOKUP_TIMEOUT_SECS: u64 = 10;

/// Maximum address lookup timeout in seconds
pub const MAX_LOOKUP_TIMEOUT_SECS: u64 = 10;

/// Default provider request timeout in seconds
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Maximum provider request timeout in seconds
pub const MAX_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Minimum for either timeout in seconds
pub const MIN_TIMEOUT_SECS: u64 = 1;

/// Default number of record groups reconciled at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Upper bound on concurrent record groups
pub const MAX_CONCURRENCY: usize = 32;

//==============================================================================
// Schedule Constants
//==============================================================================

/// Default interval between cycles in seconds (5 minutes)
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Default random jitter added to each interval in seconds
pub const DEFAULT_JITTER_SECS: u64 = 60;

/// Default grace delay after boot before the first cycle in seconds
pub const DEFAULT_BOOT_DELAY_SECS: u64 = 60;

/// Minimum interval between cycles in seconds
pub const MIN_INTERVAL_SECS: u64 = 30;

/// Maximum interval between cycles in seconds (1 day)
pub const MAX_INTERVAL_SECS: u64 = 86_400;

//==============================================================================
// Validation Constants
//==============================================================================

/// Minimum API token length in characters
pub const MIN_API_TOKEN_LENGTH: usize = 32;

/// Minimum zone ID length in characters
pub const MIN_ZONE_ID_LENGTH: usize = 16;

/// Maximum zone ID length in characters
pub const MAX_ZONE_ID_LENGTH: usize = 64;

/// Maximum DNS record name length in characters
pub const MAX_RECORD_NAME_LENGTH: usize = 253;

/// Maximum DNS label length in characters
pub const MAX_LABEL_LENGTH: usize = 63;

//==============================================================================
// Paths
//==============================================================================

/// Config file used when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cf-ddns/config.toml";

/// Binary path rendered into unit files when `--binary` is not given
pub const DEFAULT_BINARY_PATH: &str = "/usr/bin/cf-ddns";

/// Base name of the generated systemd units
pub const UNIT_NAME: &str = "cf-ddns";

//==============================================================================
// Environment Variable Names
//==============================================================================

/// Environment variable naming the file that holds the API token
pub const ENV_API_TOKEN_FILE: &str = "CF_DDNS_API_TOKEN_FILE";

/// Environment variable naming the file that holds the zone ID
pub const ENV_ZONE_ID_FILE: &str = "CF_DDNS_ZONE_ID_FILE";

/// Environment variable enabling verbose logging
pub const ENV_VERBOSE: &str = "CF_DDNS_VERBOSE";

/// Environment variable overriding the IPv4 lookup endpoint
pub const ENV_IPV4_URL: &str = "CF_DDNS_IPV4_URL";

/// Environment variable overriding the IPv6 lookup endpoint
pub const ENV_IPV6_URL: &str = "CF_DDNS_IPV6_URL";
