//! Simulated Device Runtime
//!
//! Deterministic in-process implementation of [`DeviceRuntime`] for tests and
//! the demo binary. Topologies are declared with [`SimTopologyBuilder`];
//! enumeration order is declaration order, so repeated discovery against the
//! same builder output yields identical registries.
//!
//! The simulator tracks live buffers and signals, letting tests assert that
//! every exit path of the pipeline released what it acquired. Copies complete
//! instantly against a simulated device clock (fixed issue latency plus a
//! per-byte cost), unless the topology is built with [`SimTopologyBuilder::stall_copies`].

use crate::runtime::{
    AgentHandle, BufferHandle, DeviceRuntime, PoolAccess, PoolHandle, RuntimeError,
    RuntimeResult, Segment, SignalHandle, WaitOutcome,
};
use crate::topology::DeviceType;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const COPY_ISSUE_LATENCY_NS: u64 = 500;
const COPY_NS_PER_BYTE: u64 = 1;

#[derive(Debug, Clone)]
struct SimPool {
    handle: PoolHandle,
    segment: Segment,
    alloc_allowed: bool,
    max_size: u64,
    kernarg: bool,
    never_accessible: bool,
    grant_fails: bool,
    alloc_fails: bool,
}

#[derive(Debug, Clone)]
struct SimAgent {
    handle: AgentHandle,
    name: String,
    device_code: u32,
    numa_node: u32,
    fail_numa_query: bool,
    pools: Vec<SimPool>,
}

#[derive(Debug)]
struct SignalState {
    pending: bool,
    stalled: bool,
    timestamps: Option<(u64, u64)>,
}

#[derive(Debug, Default)]
struct SimState {
    next_buffer: u64,
    next_signal: u64,
    clock_ns: u64,
    /// Live buffer -> owning pool.
    buffers: HashMap<BufferHandle, PoolHandle>,
    signals: HashMap<SignalHandle, SignalState>,
}

/// In-process fake of the platform device runtime.
pub struct SimRuntime {
    agents: Vec<SimAgent>,
    fail_signal_creation: bool,
    fail_profiling: bool,
    stall_copies: bool,
    state: Mutex<SimState>,
}

impl SimRuntime {
    /// Number of currently live (allocated, unreleased) buffers.
    pub fn live_buffers(&self) -> usize {
        self.state.lock().expect("sim state").buffers.len()
    }

    /// Number of currently live (created, undestroyed) signals.
    pub fn live_signals(&self) -> usize {
        self.state.lock().expect("sim state").signals.len()
    }

    fn agent(&self, handle: AgentHandle) -> RuntimeResult<&SimAgent> {
        self.agents
            .iter()
            .find(|a| a.handle == handle)
            .ok_or_else(|| RuntimeError::new(format!("unknown agent handle {:#x}", handle.0)))
    }

    fn pool(&self, handle: PoolHandle) -> RuntimeResult<&SimPool> {
        self.agents
            .iter()
            .flat_map(|a| a.pools.iter())
            .find(|p| p.handle == handle)
            .ok_or_else(|| RuntimeError::new(format!("unknown pool handle {:#x}", handle.0)))
    }

    fn pool_owner(&self, handle: PoolHandle) -> Option<AgentHandle> {
        self.agents
            .iter()
            .find(|a| a.pools.iter().any(|p| p.handle == handle))
            .map(|a| a.handle)
    }
}

impl DeviceRuntime for SimRuntime {
    fn agents(&self) -> RuntimeResult<Vec<AgentHandle>> {
        Ok(self.agents.iter().map(|a| a.handle).collect())
    }

    fn agent_name(&self, agent: AgentHandle) -> RuntimeResult<String> {
        Ok(self.agent(agent)?.name.clone())
    }

    fn agent_device_code(&self, agent: AgentHandle) -> RuntimeResult<u32> {
        Ok(self.agent(agent)?.device_code)
    }

    fn agent_numa_node(&self, agent: AgentHandle) -> RuntimeResult<u32> {
        let agent = self.agent(agent)?;
        if agent.fail_numa_query {
            return Err(RuntimeError::new(format!(
                "NUMA query rejected for '{}'",
                agent.name
            )));
        }
        Ok(agent.numa_node)
    }

    fn agent_pools(&self, agent: AgentHandle) -> RuntimeResult<Vec<PoolHandle>> {
        Ok(self.agent(agent)?.pools.iter().map(|p| p.handle).collect())
    }

    fn pool_segment(&self, pool: PoolHandle) -> RuntimeResult<Segment> {
        Ok(self.pool(pool)?.segment)
    }

    fn pool_alloc_allowed(&self, pool: PoolHandle) -> RuntimeResult<bool> {
        Ok(self.pool(pool)?.alloc_allowed)
    }

    fn pool_max_size(&self, pool: PoolHandle) -> RuntimeResult<u64> {
        Ok(self.pool(pool)?.max_size)
    }

    fn pool_is_kernarg(&self, pool: PoolHandle) -> RuntimeResult<bool> {
        Ok(self.pool(pool)?.kernarg)
    }

    fn pool_accessible_by_all(&self, pool: PoolHandle) -> RuntimeResult<bool> {
        let pool = self.pool(pool)?;
        Ok(!pool.never_accessible)
    }

    fn agent_pool_access(
        &self,
        agent: AgentHandle,
        pool: PoolHandle,
    ) -> RuntimeResult<PoolAccess> {
        self.agent(agent)?;
        let owner = self.pool_owner(pool);
        let pool = self.pool(pool)?;

        if owner == Some(agent) {
            return Ok(PoolAccess::AllowedByDefault);
        }
        if pool.never_accessible {
            return Ok(PoolAccess::NeverAllowed);
        }
        Ok(PoolAccess::DisallowedByDefault)
    }

    fn allocate(&self, pool: PoolHandle, size: u64) -> RuntimeResult<BufferHandle> {
        let entry = self.pool(pool)?.clone();
        if entry.alloc_fails {
            return Err(RuntimeError::new(format!(
                "allocation rejected by pool {:#x}",
                pool.0
            )));
        }
        if size > entry.max_size {
            return Err(RuntimeError::new(format!(
                "allocation of {} B exceeds pool {:#x} capacity {} B",
                size, pool.0, entry.max_size
            )));
        }

        let mut state = self.state.lock().expect("sim state");
        state.next_buffer += 1;
        let buffer = BufferHandle(0x4000_0000 + state.next_buffer);
        state.buffers.insert(buffer, pool);
        Ok(buffer)
    }

    fn free(&self, buffer: BufferHandle) {
        let mut state = self.state.lock().expect("sim state");
        state.buffers.remove(&buffer);
    }

    fn grant_access(&self, agent: AgentHandle, buffer: BufferHandle) -> RuntimeResult<()> {
        self.agent(agent)?;
        let pool = {
            let state = self.state.lock().expect("sim state");
            *state.buffers.get(&buffer).ok_or_else(|| {
                RuntimeError::new(format!("unknown buffer handle {:#x}", buffer.0))
            })?
        };
        if self.pool(pool)?.grant_fails {
            return Err(RuntimeError::new(format!(
                "grant rejected for buffer {:#x} in pool {:#x}",
                buffer.0, pool.0
            )));
        }
        Ok(())
    }

    fn create_signal(&self, _initial: u64) -> RuntimeResult<SignalHandle> {
        if self.fail_signal_creation {
            return Err(RuntimeError::new("signal creation rejected"));
        }
        let mut state = self.state.lock().expect("sim state");
        state.next_signal += 1;
        let signal = SignalHandle(0x5000_0000 + state.next_signal);
        state.signals.insert(
            signal,
            SignalState {
                pending: true,
                stalled: false,
                timestamps: None,
            },
        );
        Ok(signal)
    }

    fn destroy_signal(&self, signal: SignalHandle) {
        let mut state = self.state.lock().expect("sim state");
        state.signals.remove(&signal);
    }

    fn async_copy(
        &self,
        dst_buffer: BufferHandle,
        dst_agent: AgentHandle,
        src_buffer: BufferHandle,
        src_agent: AgentHandle,
        size: u64,
        signal: SignalHandle,
    ) -> RuntimeResult<()> {
        self.agent(src_agent)?;
        self.agent(dst_agent)?;

        let mut state = self.state.lock().expect("sim state");
        if !state.buffers.contains_key(&src_buffer) {
            return Err(RuntimeError::new(format!(
                "unknown source buffer {:#x}",
                src_buffer.0
            )));
        }
        if !state.buffers.contains_key(&dst_buffer) {
            return Err(RuntimeError::new(format!(
                "unknown destination buffer {:#x}",
                dst_buffer.0
            )));
        }

        let start = state.clock_ns + COPY_ISSUE_LATENCY_NS;
        let end = start + size * COPY_NS_PER_BYTE;
        state.clock_ns = end;

        let stall = self.stall_copies;
        let signal_state = state.signals.get_mut(&signal).ok_or_else(|| {
            RuntimeError::new(format!("unknown signal handle {:#x}", signal.0))
        })?;

        if stall {
            signal_state.stalled = true;
        } else {
            signal_state.pending = false;
            signal_state.timestamps = Some((start, end));
        }
        Ok(())
    }

    fn wait_signal(&self, signal: SignalHandle, _timeout: Duration) -> RuntimeResult<WaitOutcome> {
        let state = self.state.lock().expect("sim state");
        let signal_state = state.signals.get(&signal).ok_or_else(|| {
            RuntimeError::new(format!("unknown signal handle {:#x}", signal.0))
        })?;

        if signal_state.pending {
            // A stalled (or never-issued) copy exhausts any finite timeout.
            return Ok(WaitOutcome::TimedOut);
        }
        Ok(WaitOutcome::Completed)
    }

    fn copy_timestamps(&self, signal: SignalHandle) -> RuntimeResult<(u64, u64)> {
        if self.fail_profiling {
            return Err(RuntimeError::new("profiling record unavailable"));
        }
        let state = self.state.lock().expect("sim state");
        let signal_state = state.signals.get(&signal).ok_or_else(|| {
            RuntimeError::new(format!("unknown signal handle {:#x}", signal.0))
        })?;
        signal_state
            .timestamps
            .ok_or_else(|| RuntimeError::new("no completed copy recorded on signal"))
    }
}

/// Declarative builder for simulated topologies.
///
/// Pool-shaping calls apply to the most recently declared agent.
pub struct SimTopologyBuilder {
    agents: Vec<SimAgent>,
    next_handle: u64,
    fail_signal_creation: bool,
    fail_profiling: bool,
    stall_copies: bool,
}

impl SimTopologyBuilder {
    pub fn new() -> Self {
        Self {
            agents: Vec::new(),
            next_handle: 0,
            fail_signal_creation: false,
            fail_profiling: false,
            stall_copies: false,
        }
    }

    /// Declare an agent with a recognized device type.
    pub fn agent(self, name: &str, device_type: DeviceType, numa_node: u32) -> Self {
        let code = match device_type {
            DeviceType::Cpu => 0,
            DeviceType::Gpu => 1,
            DeviceType::Dsp => 2,
            DeviceType::Unknown => 0xFF,
        };
        self.agent_with_code(name, code, numa_node)
    }

    /// Declare an agent reporting a raw device-type code.
    pub fn agent_with_code(mut self, name: &str, device_code: u32, numa_node: u32) -> Self {
        self.next_handle += 1;
        self.agents.push(SimAgent {
            handle: AgentHandle(0x1000 + self.next_handle),
            name: name.to_string(),
            device_code,
            numa_node,
            fail_numa_query: false,
            pools: Vec::new(),
        });
        self
    }

    /// Make the current agent's NUMA query fail, to exercise fail-fast
    /// discovery.
    pub fn fail_numa_query(mut self) -> Self {
        self.current_agent().fail_numa_query = true;
        self
    }

    /// Add an eligible pool (global segment, allocation allowed).
    pub fn pool(self, max_size: u64) -> Self {
        self.push_pool(max_size, Segment::Global, true, false, false, false, false)
    }

    /// Add a pool in a non-global segment.
    pub fn pool_in_segment(self, max_size: u64, segment: Segment) -> Self {
        self.push_pool(max_size, segment, true, false, false, false, false)
    }

    /// Add a global pool that forbids runtime allocation.
    pub fn pool_no_alloc(self, max_size: u64) -> Self {
        self.push_pool(max_size, Segment::Global, false, false, false, false, false)
    }

    /// Add an eligible kernel-argument-capable pool.
    pub fn kernarg_pool(self, max_size: u64) -> Self {
        self.push_pool(max_size, Segment::Global, true, true, false, false, false)
    }

    /// Add an eligible pool that no foreign agent may ever access.
    pub fn pool_never_accessible(self, max_size: u64) -> Self {
        self.push_pool(max_size, Segment::Global, true, false, true, false, false)
    }

    /// Add an eligible pool whose buffers reject access grants.
    pub fn pool_grant_fails(self, max_size: u64) -> Self {
        self.push_pool(max_size, Segment::Global, true, false, false, true, false)
    }

    /// Add an eligible pool that rejects every allocation attempt.
    pub fn pool_alloc_fails(self, max_size: u64) -> Self {
        self.push_pool(max_size, Segment::Global, true, false, false, false, true)
    }

    /// Make signal creation fail runtime-wide.
    pub fn fail_signal_creation(mut self) -> Self {
        self.fail_signal_creation = true;
        self
    }

    /// Make the copy profiling query fail runtime-wide.
    pub fn fail_profiling(mut self) -> Self {
        self.fail_profiling = true;
        self
    }

    /// Make every issued copy stall instead of completing.
    pub fn stall_copies(mut self) -> Self {
        self.stall_copies = true;
        self
    }

    pub fn build(self) -> SimRuntime {
        SimRuntime {
            agents: self.agents,
            fail_signal_creation: self.fail_signal_creation,
            fail_profiling: self.fail_profiling,
            stall_copies: self.stall_copies,
            state: Mutex::new(SimState::default()),
        }
    }

    fn current_agent(&mut self) -> &mut SimAgent {
        self.agents
            .last_mut()
            .expect("declare an agent before shaping it")
    }

    #[allow(clippy::too_many_arguments)]
    fn push_pool(
        mut self,
        max_size: u64,
        segment: Segment,
        alloc_allowed: bool,
        kernarg: bool,
        never_accessible: bool,
        grant_fails: bool,
        alloc_fails: bool,
    ) -> Self {
        self.next_handle += 1;
        let handle = PoolHandle(0x2000 + self.next_handle);
        self.current_agent().pools.push(SimPool {
            handle,
            segment,
            alloc_allowed,
            max_size,
            kernarg,
            never_accessible,
            grant_fails,
            alloc_fails,
        });
        self
    }
}

impl Default for SimTopologyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_accounting() {
        let runtime = SimTopologyBuilder::new()
            .agent("cpu0", DeviceType::Cpu, 0)
            .pool(4096)
            .build();

        let pool = runtime.agents[0].pools[0].handle;

        let buffer = runtime.allocate(pool, 1024).expect("alloc failed");
        assert_eq!(runtime.live_buffers(), 1);
        runtime.free(buffer);
        assert_eq!(runtime.live_buffers(), 0);

        let signal = runtime.create_signal(1).expect("signal failed");
        assert_eq!(runtime.live_signals(), 1);
        runtime.destroy_signal(signal);
        assert_eq!(runtime.live_signals(), 0);
    }

    #[test]
    fn test_oversized_allocation_rejected() {
        let runtime = SimTopologyBuilder::new()
            .agent("cpu0", DeviceType::Cpu, 0)
            .pool(512)
            .build();

        let pool = runtime.agents[0].pools[0].handle;
        assert!(runtime.allocate(pool, 1024).is_err());
    }

    #[test]
    fn test_owner_access_allowed_by_default() {
        let runtime = SimTopologyBuilder::new()
            .agent("gpu0", DeviceType::Gpu, 0)
            .pool_never_accessible(4096)
            .build();

        let agent = runtime.agents[0].handle;
        let pool = runtime.agents[0].pools[0].handle;

        // never_accessible applies to foreign agents, not the owner.
        assert_eq!(
            runtime.agent_pool_access(agent, pool).expect("query failed"),
            PoolAccess::AllowedByDefault
        );
    }
}
