//! Device Runtime Capability Interface
//!
//! Every platform call the pipeline needs, as a single trait over opaque
//! typed handles. The core depends only on this contract; concrete backends
//! (a real HSA-class runtime, or [`crate::sim::SimRuntime`] for tests) plug in
//! underneath. Each operation may fail independently and reports failure as a
//! status value, never a panic.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error reported by a single runtime call.
///
/// Carries only the backend's diagnostic text; callers wrap it into the
/// appropriate [`crate::PeerlatError`] variant.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct RuntimeError(pub String);

impl RuntimeError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Opaque platform identifier for a compute agent. Never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentHandle(pub u64);

/// Opaque platform identifier for a memory pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolHandle(pub u64);

/// Opaque handle to an allocated buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferHandle(pub u64);

/// Opaque handle to a completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalHandle(pub u64);

/// Placement classification of a memory pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    /// System-visible segment; the only one eligible for cross-device use.
    Global,
    Group,
    Private,
    Readonly,
    Kernarg,
}

/// Access level of an agent onto a pool (and the buffers drawn from it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolAccess {
    /// Access can never be granted; the pool is unusable for this agent.
    NeverAllowed,
    /// Access is available without an explicit grant.
    AllowedByDefault,
    /// Access is available but requires an explicit grant.
    DisallowedByDefault,
}

/// Outcome of a bounded wait on a completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    TimedOut,
}

/// Capability interface onto the platform device runtime.
///
/// Device-type codes follow the platform convention: 0 = CPU, 1 = GPU,
/// 2 = DSP; any other code is reported as-is and mapped to
/// [`crate::topology::DeviceType::Unknown`] by the enumerator.
pub trait DeviceRuntime {
    /// All compute agents, in the platform's native iteration order.
    fn agents(&self) -> RuntimeResult<Vec<AgentHandle>>;

    /// Display name of an agent.
    fn agent_name(&self, agent: AgentHandle) -> RuntimeResult<String>;

    /// Raw device-type code of an agent.
    fn agent_device_code(&self, agent: AgentHandle) -> RuntimeResult<u32>;

    /// NUMA node the agent belongs to.
    fn agent_numa_node(&self, agent: AgentHandle) -> RuntimeResult<u32>;

    /// Memory pools of an agent, in the platform's native iteration order.
    fn agent_pools(&self, agent: AgentHandle) -> RuntimeResult<Vec<PoolHandle>>;

    /// Placement segment of a pool.
    fn pool_segment(&self, pool: PoolHandle) -> RuntimeResult<Segment>;

    /// Whether runtime-initiated allocation is permitted in this pool.
    fn pool_alloc_allowed(&self, pool: PoolHandle) -> RuntimeResult<bool>;

    /// Maximum allocatable size of a pool, in bytes.
    fn pool_max_size(&self, pool: PoolHandle) -> RuntimeResult<u64>;

    /// Whether the pool is flagged kernel-argument-capable.
    fn pool_is_kernarg(&self, pool: PoolHandle) -> RuntimeResult<bool>;

    /// Whether the pool is accessible to all agents without a grant.
    fn pool_accessible_by_all(&self, pool: PoolHandle) -> RuntimeResult<bool>;

    /// Access level of `agent` onto `pool`.
    fn agent_pool_access(&self, agent: AgentHandle, pool: PoolHandle)
        -> RuntimeResult<PoolAccess>;

    /// Allocate `size` bytes from `pool`.
    fn allocate(&self, pool: PoolHandle, size: u64) -> RuntimeResult<BufferHandle>;

    /// Release a buffer. Releasing is infallible from the caller's view.
    fn free(&self, buffer: BufferHandle);

    /// Grant `agent` access to a buffer it does not own.
    fn grant_access(&self, agent: AgentHandle, buffer: BufferHandle) -> RuntimeResult<()>;

    /// Create a completion signal with the given initial value.
    fn create_signal(&self, initial: u64) -> RuntimeResult<SignalHandle>;

    /// Destroy a completion signal.
    fn destroy_signal(&self, signal: SignalHandle);

    /// Issue one asynchronous copy of `size` bytes, tagged with `signal`.
    #[allow(clippy::too_many_arguments)]
    fn async_copy(
        &self,
        dst_buffer: BufferHandle,
        dst_agent: AgentHandle,
        src_buffer: BufferHandle,
        src_agent: AgentHandle,
        size: u64,
        signal: SignalHandle,
    ) -> RuntimeResult<()>;

    /// Block until `signal` reports completion, or `timeout` elapses.
    fn wait_signal(&self, signal: SignalHandle, timeout: Duration) -> RuntimeResult<WaitOutcome>;

    /// Device-reported (start, end) timestamps of the copy tagged with
    /// `signal`, in nanoseconds.
    fn copy_timestamps(&self, signal: SignalHandle) -> RuntimeResult<(u64, u64)>;
}
