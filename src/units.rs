//! systemd deployment plan
//!
//! Renders the oneshot service and the timer that triggers it from a typed
//! [`Config`]. Only file paths of secrets are rendered; their contents never
//! leave the credential files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use tracing::info;

use crate::config::Config;
use crate::constants::{ENV_API_TOKEN_FILE, ENV_ZONE_ID_FILE, UNIT_NAME};
use crate::secrets::write_file_with_mode;

/// Credential names under `$CREDENTIALS_DIRECTORY`
const TOKEN_CREDENTIAL: &str = "api-token";
const ZONE_CREDENTIAL: &str = "zone-id";

/// One file to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFile {
    pub name: String,
    pub contents: String,
    pub mode: u32,
}

/// The set of unit files for one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub units: Vec<UnitFile>,
}

impl DeploymentPlan {
    /// Assembles the service and timer units
    ///
    /// The service reads the credentials through systemd's `LoadCredential=`,
    /// so the sandboxed dynamic user never needs access to the original files.
    pub fn from_config(config: &Config, binary: &Path, config_path: &Path) -> Result<Self> {
        for path in [binary, config_path] {
            if !path.is_absolute() {
                bail!("{} must be an absolute path", path.display());
            }
        }

        Ok(Self {
            units: vec![
                UnitFile {
                    name: format!("{}.service", UNIT_NAME),
                    contents: render_service(config, binary, config_path),
                    mode: 0o644,
                },
                UnitFile {
                    name: format!("{}.timer", UNIT_NAME),
                    contents: render_timer(config),
                    mode: 0o644,
                },
            ],
        })
    }

    /// Writes every unit into `dir`, returning the written paths
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut written = Vec::with_capacity(self.units.len());
        for unit in &self.units {
            let path = dir.join(&unit.name);
            write_file_with_mode(&path, unit.contents.as_bytes(), unit.mode)?;
            info!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

/// Sandboxing directives for the service; the job only needs outbound HTTPS
const SANDBOX: &str = "\
DynamicUser=yes
NoNewPrivileges=yes
ProtectSystem=strict
ProtectHome=yes
PrivateTmp=yes
PrivateDevices=yes
ProtectKernelTunables=yes
ProtectKernelModules=yes
ProtectControlGroups=yes
RestrictAddressFamilies=AF_INET AF_INET6 AF_UNIX
RestrictNamespaces=yes
LockPersonality=yes
MemoryDenyWriteExecute=yes
CapabilityBoundingSet=
SystemCallFilter=@system-service
";

fn render_service(config: &Config, binary: &Path, config_path: &Path) -> String {
    let read_write = config
        .metrics_file
        .as_deref()
        .and_then(Path::parent)
        .map(|dir| format!("ReadWritePaths={}\n", dir.display()))
        .unwrap_or_default();

    format!(
        "\
[Unit]
Description=Cloudflare DDNS reconciler
Wants=network-online.target
After=network-online.target

[Service]
Type=oneshot
ExecStart={binary} --config {config_path} run
LoadCredential={TOKEN_CREDENTIAL}:{token_file}
LoadCredential={ZONE_CREDENTIAL}:{zone_file}
Environment={ENV_API_TOKEN_FILE}=%d/{TOKEN_CREDENTIAL}
Environment={ENV_ZONE_ID_FILE}=%d/{ZONE_CREDENTIAL}
{SANDBOX}{read_write}",
        binary = binary.display(),
        config_path = config_path.display(),
        token_file = config.api_token_file.display(),
        zone_file = config.zone_id_file.display(),
    )
}

fn render_timer(config: &Config) -> String {
    let schedule = &config.schedule;
    format!(
        "\
[Unit]
Description=Run the Cloudflare DDNS reconciler periodically

[Timer]
OnBootSec={boot}
OnUnitActiveSec={interval}
RandomizedDelaySec={jitter}
Unit={UNIT_NAME}.service

[Install]
WantedBy=timers.target
",
        boot = systemd_span(schedule.boot_delay),
        interval = systemd_span(schedule.interval),
        jitter = systemd_span(schedule.jitter),
    )
}

fn systemd_span(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}
