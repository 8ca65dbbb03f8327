//! Agent Topology Discovery
//!
//! Enumerates the compute agents the runtime reports and builds a caller-owned
//! [`Registry`]. Discovery is fail-fast: a single failed attribute query means
//! the whole topology view is untrustworthy, so the entire operation aborts
//! and partial results are discarded. Unrecognized device-type codes are not
//! an error; they are recorded as [`DeviceType::Unknown`].

use crate::catalog::catalog_agent_pools;
use crate::runtime::{AgentHandle, DeviceRuntime, PoolHandle};
use crate::{PeerlatError, Result};
use serde::{Deserialize, Serialize};

/// Kind of compute agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Cpu,
    Gpu,
    Dsp,
    Unknown,
}

impl DeviceType {
    /// Map a raw platform device-type code (0 = CPU, 1 = GPU, 2 = DSP).
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => DeviceType::Cpu,
            1 => DeviceType::Gpu,
            2 => DeviceType::Dsp,
            _ => DeviceType::Unknown,
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceType::Cpu => "CPU",
            DeviceType::Gpu => "GPU",
            DeviceType::Dsp => "DSP",
            DeviceType::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// One eligible memory pool of an agent.
///
/// `max_size` is always the value queried for `pool`; keeping them in one
/// struct preserves the index-aligned pairing across the whole pool list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub pool: PoolHandle,
    pub max_size: u64,
}

/// One discovered compute agent and its cataloged pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Opaque platform identifier, immutable once assigned.
    pub handle: AgentHandle,

    /// Display name.
    pub name: String,

    /// Device classification.
    pub device_type: DeviceType,

    /// NUMA node grouping.
    pub numa_node: u32,

    /// The kernel-argument-capable pool, if one was found (last-found wins;
    /// multiple matches is a topology anomaly, not an error).
    pub system_pool: Option<PoolHandle>,

    /// Eligible pools in enumeration order.
    pub pools: Vec<PoolEntry>,
}

impl std::fmt::Display for AgentRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}]: node={}, pools={}, system_pool={}",
            self.name,
            self.device_type,
            self.numa_node,
            self.pools.len(),
            match self.system_pool {
                Some(p) => format!("{:#x}", p.0),
                None => "none".to_string(),
            },
        )
    }
}

/// Ordered registry of discovered agents.
///
/// Indexed by discovery order; downstream operations address agents by this
/// stable index, never by handle. Built once, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    pub agents: Vec<AgentRecord>,
}

impl Registry {
    /// Discover all agents and catalog their memory pools.
    ///
    /// Agent attribute queries are fail-fast and abort the whole discovery;
    /// pool cataloging is tolerant of per-pool attribute failure (see
    /// [`catalog_agent_pools`]).
    pub fn discover<R: DeviceRuntime>(runtime: &R) -> Result<Self> {
        let handles = runtime
            .agents()
            .map_err(|e| PeerlatError::AgentQuery(format!("Agent enumeration failed: {}", e)))?;

        println!("[TOPOLOGY][DISCOVER] Runtime reports {} agent(s)", handles.len());

        let mut agents = Vec::with_capacity(handles.len());

        for handle in handles {
            agents.push(Self::query_agent(runtime, handle)?);
        }

        let mut registry = Self { agents };

        for index in 0..registry.agents.len() {
            catalog_agent_pools(runtime, &mut registry.agents[index]);
            println!(
                "[TOPOLOGY][DISCOVER] Agent {}: {}",
                index, registry.agents[index]
            );
        }

        println!(
            "[TOPOLOGY][DISCOVER] Discovery complete: {} agent(s) registered",
            registry.agents.len()
        );

        Ok(registry)
    }

    /// Agent record at `index`, or an allocation-addressing error.
    pub fn agent(&self, index: usize) -> Result<&AgentRecord> {
        self.agents.get(index).ok_or_else(|| {
            PeerlatError::Allocation(format!(
                "Agent index {} out of range ({} agents discovered)",
                index,
                self.agents.len()
            ))
        })
    }

    /// Query the three mandatory attributes of one agent. Any failure aborts.
    fn query_agent<R: DeviceRuntime>(runtime: &R, handle: AgentHandle) -> Result<AgentRecord> {
        let name = runtime.agent_name(handle).map_err(|e| {
            PeerlatError::AgentQuery(format!("Agent name query failed for {:#x}: {}", handle.0, e))
        })?;

        let code = runtime.agent_device_code(handle).map_err(|e| {
            PeerlatError::AgentQuery(format!(
                "Device type query failed for '{}': {}",
                name, e
            ))
        })?;

        let numa_node = runtime.agent_numa_node(handle).map_err(|e| {
            PeerlatError::AgentQuery(format!("NUMA node query failed for '{}': {}", name, e))
        })?;

        let device_type = DeviceType::from_code(code);
        if device_type == DeviceType::Unknown {
            println!(
                "[TOPOLOGY][DISCOVER] Unknown device-type code {} for '{}'",
                code, name
            );
        }

        Ok(AgentRecord {
            handle,
            name,
            device_type,
            numa_node,
            system_pool: None,
            pools: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_mapping() {
        assert_eq!(DeviceType::from_code(0), DeviceType::Cpu);
        assert_eq!(DeviceType::from_code(1), DeviceType::Gpu);
        assert_eq!(DeviceType::from_code(2), DeviceType::Dsp);
        assert_eq!(DeviceType::from_code(3), DeviceType::Unknown);
        assert_eq!(DeviceType::from_code(255), DeviceType::Unknown);
    }

    #[test]
    fn test_agent_index_out_of_range() {
        let registry = Registry { agents: vec![] };
        assert!(matches!(
            registry.agent(0),
            Err(PeerlatError::Allocation(_))
        ));
    }
}
