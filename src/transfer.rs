//! Cross-Device Buffer Negotiation
//!
//! Given two agent indices and a byte size, finds a compatible pool pair by a
//! greedy first-fit search over the Cartesian product of the source agent's
//! pools and the destination agent's pools, in list order. The first workable
//! pair is taken even if a later pair would be more favorable.
//!
//! Permission checks and access grants follow the platform's CPU-centric
//! directional convention: when the source agent is a CPU, both are issued
//! from the destination agent's perspective onto the source pool/buffer;
//! otherwise from the source agent's perspective onto the destination
//! pool/buffer. This asymmetry is deliberate and applies as-is to GPU-GPU and
//! DSP pairs.

use crate::runtime::{BufferHandle, DeviceRuntime, PoolAccess, PoolHandle};
use crate::topology::{DeviceType, Registry};
use crate::{PeerlatError, Result};

/// Result of a successful allocation negotiation.
///
/// Owned by the caller; both buffers must be released via [`BufferPair::release`]
/// (or by [`crate::timing::measure_copy`], which always releases them).
#[derive(Debug, Clone, Copy)]
pub struct BufferPair {
    pub src_pool: PoolHandle,
    pub src_buffer: BufferHandle,
    pub dst_pool: PoolHandle,
    pub dst_buffer: BufferHandle,
}

impl BufferPair {
    /// Release both buffers.
    pub fn release<R: DeviceRuntime>(&self, runtime: &R) {
        runtime.free(self.src_buffer);
        runtime.free(self.dst_buffer);
    }
}

/// Frees its buffer on drop unless defused by [`BufGuard::take`].
///
/// Keeps every failure path of the pair search leak-free without repeating
/// cleanup calls in each early return.
struct BufGuard<'r, R: DeviceRuntime> {
    runtime: &'r R,
    buffer: Option<BufferHandle>,
}

impl<'r, R: DeviceRuntime> BufGuard<'r, R> {
    fn new(runtime: &'r R, buffer: BufferHandle) -> Self {
        Self {
            runtime,
            buffer: Some(buffer),
        }
    }

    fn handle(&self) -> BufferHandle {
        self.buffer.expect("guard already defused")
    }

    fn take(mut self) -> BufferHandle {
        self.buffer.take().expect("guard already defused")
    }
}

impl<R: DeviceRuntime> Drop for BufGuard<'_, R> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.runtime.free(buffer);
        }
    }
}

/// Negotiate a cross-device buffer pair of `size` bytes between the agents at
/// `src_index` and `dst_index`.
///
/// Fails with [`PeerlatError::Allocation`] when the search space is exhausted
/// without a full pairing, and with [`PeerlatError::AccessGrant`] when a
/// permission query itself fails. Every buffer allocated along a failed path
/// has been released by the time this returns.
pub fn allocate_pair<R: DeviceRuntime>(
    runtime: &R,
    registry: &Registry,
    src_index: usize,
    dst_index: usize,
    size: u64,
) -> Result<BufferPair> {
    let src = registry.agent(src_index)?;
    let dst = registry.agent(dst_index)?;

    println!(
        "[TRANSFER][ALLOCATE] Src agent {} [{}], dst agent {} [{}], size {} B",
        src_index, src.device_type, dst_index, dst.device_type, size
    );

    for src_entry in &src.pools {
        if size > src_entry.max_size {
            continue;
        }

        let src_buffer = match runtime.allocate(src_entry.pool, size) {
            Ok(buffer) => buffer,
            Err(e) => {
                println!(
                    "[TRANSFER][ALLOCATE] Source allocation failed in pool {:#x} ({} B): {}",
                    src_entry.pool.0, size, e
                );
                continue;
            }
        };
        let src_guard = BufGuard::new(runtime, src_buffer);

        for dst_entry in &dst.pools {
            if size > dst_entry.max_size {
                continue;
            }

            // CPU-centric direction: dst perspective onto the source pool
            // when the source is a CPU, src perspective onto the destination
            // pool otherwise.
            let access = if src.device_type == DeviceType::Cpu {
                runtime.agent_pool_access(dst.handle, src_entry.pool)
            } else {
                runtime.agent_pool_access(src.handle, dst_entry.pool)
            }
            .map_err(|e| {
                PeerlatError::AccessGrant(format!(
                    "Pool access query failed for agents {}/{}: {}",
                    src_index, dst_index, e
                ))
            })?;

            if access == PoolAccess::NeverAllowed {
                continue;
            }

            let dst_buffer = match runtime.allocate(dst_entry.pool, size) {
                Ok(buffer) => buffer,
                Err(e) => {
                    println!(
                        "[TRANSFER][ALLOCATE] Destination allocation failed in pool {:#x}: {}",
                        dst_entry.pool.0, e
                    );
                    continue;
                }
            };
            let dst_guard = BufGuard::new(runtime, dst_buffer);

            // Same direction for the grant: the non-owning agent gets access
            // to whichever buffer it does not own.
            let grant = if src.device_type == DeviceType::Cpu {
                runtime.grant_access(dst.handle, src_guard.handle())
            } else {
                runtime.grant_access(src.handle, dst_guard.handle())
            };

            if let Err(e) = grant {
                println!(
                    "[TRANSFER][ALLOCATE] Access grant failed for pool pair {:#x}/{:#x}: {}",
                    src_entry.pool.0, dst_entry.pool.0, e
                );
                // dst_guard frees the destination buffer; the source buffer
                // stays held for the remaining destination candidates.
                drop(dst_guard);
                continue;
            }

            println!(
                "[TRANSFER][ALLOCATE] Paired pool {:#x} -> pool {:#x}",
                src_entry.pool.0, dst_entry.pool.0
            );

            return Ok(BufferPair {
                src_pool: src_entry.pool,
                src_buffer: src_guard.take(),
                dst_pool: dst_entry.pool,
                dst_buffer: dst_guard.take(),
            });
        }

        // No destination pool worked for this source pool; the guard frees
        // the source buffer on drop.
        drop(src_guard);
    }

    Err(PeerlatError::Allocation(format!(
        "No compatible pool pair for agents {} -> {} at {} B",
        src_index, dst_index, size
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTopologyBuilder;
    use crate::topology::Registry;

    #[test]
    fn test_first_fit_is_deterministic() {
        let runtime = SimTopologyBuilder::new()
            .agent("cpu0", DeviceType::Cpu, 0)
            .pool(1 << 20)
            .pool(1 << 20)
            .agent("gpu0", DeviceType::Gpu, 1)
            .pool(1 << 20)
            .pool(1 << 20)
            .build();

        let registry = Registry::discover(&runtime).expect("Discovery failed");

        let first = allocate_pair(&runtime, &registry, 0, 1, 4096).expect("Allocation failed");
        first.release(&runtime);

        let second = allocate_pair(&runtime, &registry, 0, 1, 4096).expect("Allocation failed");
        second.release(&runtime);

        // Same catalogs, same arguments: same pool pair.
        assert_eq!(first.src_pool, second.src_pool);
        assert_eq!(first.dst_pool, second.dst_pool);
        assert_eq!(first.src_pool, registry.agents[0].pools[0].pool);
        assert_eq!(first.dst_pool, registry.agents[1].pools[0].pool);
        assert_eq!(runtime.live_buffers(), 0);
    }

    #[test]
    fn test_undersized_pools_rejected() {
        let runtime = SimTopologyBuilder::new()
            .agent("cpu0", DeviceType::Cpu, 0)
            .pool(512)
            .agent("gpu0", DeviceType::Gpu, 1)
            .pool(512)
            .build();

        let registry = Registry::discover(&runtime).expect("Discovery failed");

        let result = allocate_pair(&runtime, &registry, 0, 1, 1024);
        assert!(matches!(result, Err(PeerlatError::Allocation(_))));
        assert_eq!(runtime.live_buffers(), 0);
    }

    #[test]
    fn test_never_allowed_pool_skipped_and_leak_free() {
        let runtime = SimTopologyBuilder::new()
            .agent("gpu0", DeviceType::Gpu, 0)
            .pool(4096)
            .agent("gpu1", DeviceType::Gpu, 1)
            .pool_never_accessible(4096)
            .build();

        let registry = Registry::discover(&runtime).expect("Discovery failed");

        // The only destination pool reports access never allowed: the search
        // must skip it and fail overall, leaving no buffers allocated.
        let result = allocate_pair(&runtime, &registry, 0, 1, 1024);
        assert!(matches!(result, Err(PeerlatError::Allocation(_))));
        assert_eq!(runtime.live_buffers(), 0);
    }

    #[test]
    fn test_grant_failure_unwinds_destination_buffer() {
        let runtime = SimTopologyBuilder::new()
            .agent("gpu0", DeviceType::Gpu, 0)
            .pool(4096)
            .agent("gpu1", DeviceType::Gpu, 1)
            .pool_grant_fails(4096)
            .pool(4096)
            .build();

        let registry = Registry::discover(&runtime).expect("Discovery failed");

        // First destination pool accepts the allocation but the grant fails;
        // the search must unwind that buffer and succeed on the second pool.
        let pair = allocate_pair(&runtime, &registry, 0, 1, 1024).expect("Allocation failed");
        assert_eq!(pair.dst_pool, registry.agents[1].pools[1].pool);
        pair.release(&runtime);
        assert_eq!(runtime.live_buffers(), 0);
    }

    #[test]
    fn test_empty_catalog_fails() {
        let runtime = SimTopologyBuilder::new()
            .agent("cpu0", DeviceType::Cpu, 0)
            .agent("gpu0", DeviceType::Gpu, 1)
            .pool(4096)
            .build();

        let registry = Registry::discover(&runtime).expect("Discovery failed");
        assert!(registry.agents[0].pools.is_empty());

        let result = allocate_pair(&runtime, &registry, 0, 1, 1024);
        assert!(matches!(result, Err(PeerlatError::Allocation(_))));
    }
}
