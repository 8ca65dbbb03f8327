//! Memory Pool Cataloging
//!
//! Filters each agent's reported pools down to the ones eligible for
//! cross-device buffer negotiation: global segment, runtime allocation
//! allowed. Unlike agent discovery, cataloging tolerates per-pool attribute
//! failures; most agent pools are expected to be ineligible and a
//! non-conforming pool is normal topology noise, so a failed query is logged
//! and the pool proceeds with a defaulted value instead of aborting.

use crate::runtime::{DeviceRuntime, PoolAccess, PoolHandle, Segment};
use crate::topology::{AgentRecord, PoolEntry};

/// Catalog the eligible pools of one agent, mutating its record in place.
///
/// Filters, in order: only global-segment pools; only pools permitting
/// runtime-initiated allocation. Eligible pools get their max allocatable
/// size recorded. A kernel-argument-capable pool becomes the agent's system
/// pool (last-found wins). Universal-access and owner-access queries are
/// observational only and never affect inclusion.
pub fn catalog_agent_pools<R: DeviceRuntime>(runtime: &R, agent: &mut AgentRecord) {
    let pools = match runtime.agent_pools(agent.handle) {
        Ok(pools) => pools,
        Err(e) => {
            println!(
                "[CATALOG][POOLS] Pool enumeration failed for '{}': {} (agent keeps empty catalog)",
                agent.name, e
            );
            return;
        }
    };

    println!(
        "[CATALOG][POOLS] Agent '{}' reports {} pool(s)",
        agent.name,
        pools.len()
    );

    for pool in pools {
        catalog_pool(runtime, agent, pool);
    }
}

fn catalog_pool<R: DeviceRuntime>(runtime: &R, agent: &mut AgentRecord, pool: PoolHandle) {
    // Only global-segment pools are eligible for cross-device use. A failed
    // segment query leaves the pool ineligible.
    match runtime.pool_segment(pool) {
        Ok(Segment::Global) => {}
        Ok(_) => return,
        Err(e) => {
            println!(
                "[CATALOG][POOLS] Segment query failed for pool {:#x}: {} (skipping)",
                pool.0, e
            );
            return;
        }
    }

    // Only pools that allow a runtime-initiated allocation are usable.
    match runtime.pool_alloc_allowed(pool) {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            println!(
                "[CATALOG][POOLS] Alloc-allowed query failed for pool {:#x}: {} (skipping)",
                pool.0, e
            );
            return;
        }
    }

    let max_size = match runtime.pool_max_size(pool) {
        Ok(size) => size,
        Err(e) => {
            println!(
                "[CATALOG][POOLS] Max-size query failed for pool {:#x}: {} (recording 0)",
                pool.0, e
            );
            0
        }
    };

    let is_kernarg = match runtime.pool_is_kernarg(pool) {
        Ok(flag) => flag,
        Err(e) => {
            println!(
                "[CATALOG][POOLS] Kernarg query failed for pool {:#x}: {}",
                pool.0, e
            );
            false
        }
    };

    // Observational queries; outcomes are diagnostic only.
    let accessible_by_all = match runtime.pool_accessible_by_all(pool) {
        Ok(flag) => flag,
        Err(e) => {
            println!(
                "[CATALOG][POOLS] Universal-access query failed for pool {:#x}: {}",
                pool.0, e
            );
            false
        }
    };

    let owner_access = match runtime.agent_pool_access(agent.handle, pool) {
        Ok(access) => Some(access),
        Err(e) => {
            println!(
                "[CATALOG][POOLS] Owner-access query failed for pool {:#x}: {}",
                pool.0, e
            );
            None
        }
    };

    if is_kernarg {
        agent.system_pool = Some(pool);
        println!(
            "[CATALOG][POOLS] Found system memory region {:#x} on '{}'",
            pool.0, agent.name
        );
    } else if owner_access != Some(PoolAccess::NeverAllowed) {
        println!(
            "[CATALOG][POOLS] Found regular memory region {:#x} on '{}' (max={} B, all-agents={})",
            pool.0, agent.name, max_size, accessible_by_all
        );
    }

    agent.pools.push(PoolEntry { pool, max_size });
}
