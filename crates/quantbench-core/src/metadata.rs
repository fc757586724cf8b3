use serde::{Deserialize, Serialize};

use crate::config::RunConfig;

/// Identity of the machine the benchmark ran on, captured once per
/// sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub platform: String,
    pub release: String,
    pub username: String,
    pub hostname: String,
}

impl HostInfo {
    pub fn capture() -> Self {
        Self {
            platform: sysinfo::System::name().unwrap_or_else(|| "unknown".to_string()),
            release: sysinfo::System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            username: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "unknown".to_string()),
            hostname: sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// Per-run metadata attached to every metric row of that run.
/// Immutable after creation: all rows of one run carry an identical
/// copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub platform: String,
    pub release: String,
    pub device: String,
    pub username: String,
    pub hostname: String,
    pub size: String,
    pub quantize: String,
    pub seed: String,
    pub uuid: String,
}

impl RunMetadata {
    pub fn new(host: &HostInfo, device: &str, config: &RunConfig) -> Self {
        let short_id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            platform: host.platform.clone(),
            release: host.release.clone(),
            device: device.to_string(),
            username: host.username.clone(),
            hostname: host.hostname.clone(),
            size: config.size.to_string(),
            quantize: config.quantize.to_string(),
            seed: config.seed.to_string(),
            uuid: format!("uuid{}", &short_id[..8]),
        }
    }

    /// Raw artifact file name for this run:
    /// `{hostname}_{size}_{quantize}_seed{seed}_{uuid}.txt`
    pub fn artifact_file_name(&self) -> String {
        format!(
            "{}_{}_{}_seed{}_{}.txt",
            self.hostname, self.size, self.quantize, self.seed, self.uuid
        )
    }

    /// The `key: value` header written at the top of raw benchmark
    /// artifacts, in schema order.
    pub fn header_lines(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("platform", &self.platform),
            ("release", &self.release),
            ("device", &self.device),
            ("username", &self.username),
            ("hostname", &self.hostname),
            ("size", &self.size),
            ("quantize", &self.quantize),
            ("seed", &self.seed),
            ("uuid", &self.uuid),
        ]
    }
}
