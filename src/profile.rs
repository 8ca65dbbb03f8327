//! Transfer Profile Configuration
//!
//! Loads and validates transfer profiles from TOML config. A profile supplies
//! the externally-fixed probe parameters: repetition count, the two agent
//! indices under test, transfer size, and the signal-wait timeout. Selection
//! priority is CLI override, then the PEERLAT_TRANSFER_PROFILE environment
//! variable, then the default profile.

use crate::{PeerlatError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_PROFILE: &str = "smoke";

/// One transfer probe configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProfile {
    /// Number of allocate-copy-release rounds.
    pub repetitions: usize,

    /// Source agent registry index.
    pub src_agent: usize,

    /// Destination agent registry index.
    pub dst_agent: usize,

    /// Transfer size in bytes.
    pub size_bytes: u64,

    /// Per-copy signal-wait timeout in milliseconds.
    pub wait_timeout_ms: u64,

    /// Verbose diagnostics (optional).
    #[serde(default)]
    pub verbose: bool,
}

impl TransferProfile {
    /// Validate profile parameters.
    pub fn validate(&self) -> Result<()> {
        if self.repetitions == 0 || self.repetitions > 10_000 {
            return Err(PeerlatError::Config(format!(
                "repetitions {} outside 1..=10000",
                self.repetitions
            )));
        }

        if self.size_bytes == 0 {
            return Err(PeerlatError::Config("size_bytes must be > 0".to_string()));
        }

        if self.src_agent == self.dst_agent {
            return Err(PeerlatError::Config(format!(
                "src_agent and dst_agent must differ (both are {})",
                self.src_agent
            )));
        }

        if self.wait_timeout_ms == 0 || self.wait_timeout_ms > 600_000 {
            return Err(PeerlatError::Config(format!(
                "wait_timeout_ms {} outside 1..=600000",
                self.wait_timeout_ms
            )));
        }

        Ok(())
    }
}

impl Default for TransferProfile {
    fn default() -> Self {
        Self {
            repetitions: 10,
            src_agent: 0,
            dst_agent: 1,
            size_bytes: 1024,
            wait_timeout_ms: 30_000,
            verbose: false,
        }
    }
}

/// Container for all transfer profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferProfiles {
    pub transfer_profiles: HashMap<String, TransferProfile>,
}

impl TransferProfiles {
    /// Load transfer profiles from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = std::fs::read_to_string(path).map_err(|e| {
            PeerlatError::Config(format!(
                "Failed to read transfer profiles from {:?}: {}",
                path, e
            ))
        })?;

        let profiles: TransferProfiles = toml::from_str(&contents)
            .map_err(|e| PeerlatError::Config(format!("Failed to parse profiles TOML: {}", e)))?;

        for (name, profile) in &profiles.transfer_profiles {
            profile.validate().map_err(|e| {
                PeerlatError::Config(format!("Profile '{}' validation failed: {}", name, e))
            })?;
        }

        Ok(profiles)
    }

    /// Get profile by name.
    pub fn get(&self, name: &str) -> Option<&TransferProfile> {
        self.transfer_profiles.get(name)
    }

    /// List all profile names.
    pub fn list_names(&self) -> Vec<&str> {
        self.transfer_profiles.keys().map(|s| s.as_str()).collect()
    }
}

/// Load a transfer profile by priority: CLI override, then
/// PEERLAT_TRANSFER_PROFILE, then [`DEFAULT_PROFILE`].
pub fn load_transfer_profile(
    config_path: Option<&Path>,
    cli_override: Option<&str>,
) -> Result<(String, TransferProfile)> {
    let profiles_path = config_path.unwrap_or_else(|| Path::new("configs/transfer_profiles.toml"));

    println!("[PROFILE][LOAD] Loading profiles from {:?}", profiles_path);

    let profiles = TransferProfiles::from_file(profiles_path)?;

    let env_profile = std::env::var("PEERLAT_TRANSFER_PROFILE").ok();
    let profile_name = cli_override
        .or(env_profile.as_deref())
        .unwrap_or(DEFAULT_PROFILE)
        .to_string();

    println!("[PROFILE][LOAD] Selected profile: {}", profile_name);

    let profile = profiles
        .get(&profile_name)
        .ok_or_else(|| {
            PeerlatError::Config(format!(
                "Transfer profile '{}' not found. Available profiles: {:?}",
                profile_name,
                profiles.list_names()
            ))
        })?
        .clone();

    profile.validate()?;

    println!(
        "[PROFILE][LOAD] Profile loaded and validated: reps={}, agents {}->{}, size={} B",
        profile.repetitions, profile.src_agent, profile.dst_agent, profile.size_bytes
    );

    Ok((profile_name, profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_toml_parsing() {
        let toml = r#"
            [transfer_profiles.smoke]
            repetitions = 10
            src_agent = 0
            dst_agent = 1
            size_bytes = 1024
            wait_timeout_ms = 30000

            [transfer_profiles.soak]
            repetitions = 1000
            src_agent = 2
            dst_agent = 9
            size_bytes = 1048576
            wait_timeout_ms = 60000
            verbose = true
        "#;

        let profiles: TransferProfiles = toml::from_str(toml).unwrap();

        let smoke = profiles.get("smoke").unwrap();
        assert_eq!(smoke.repetitions, 10);
        assert_eq!(smoke.size_bytes, 1024);
        assert!(!smoke.verbose);

        let soak = profiles.get("soak").unwrap();
        assert_eq!(soak.src_agent, 2);
        assert_eq!(soak.dst_agent, 9);
        assert!(soak.verbose);
    }

    #[test]
    fn test_profile_validation() {
        let profile = TransferProfile::default();
        assert!(profile.validate().is_ok());

        let zero_size = TransferProfile {
            size_bytes: 0,
            ..TransferProfile::default()
        };
        assert!(zero_size.validate().is_err());

        let same_agents = TransferProfile {
            src_agent: 3,
            dst_agent: 3,
            ..TransferProfile::default()
        };
        assert!(same_agents.validate().is_err());

        let zero_reps = TransferProfile {
            repetitions: 0,
            ..TransferProfile::default()
        };
        assert!(zero_reps.validate().is_err());

        let huge_timeout = TransferProfile {
            wait_timeout_ms: 600_001,
            ..TransferProfile::default()
        };
        assert!(huge_timeout.validate().is_err());
    }
}
