//! Copy Timing
//!
//! Issues one asynchronous copy between a negotiated buffer pair and extracts
//! the device-reported duration from the copy's profiling record. The wait on
//! the completion signal takes a caller-supplied timeout; a copy that does not
//! complete in time is a distinct error instead of a permanent hang.
//!
//! On every exit path, success or failure, both buffers are released and the
//! signal (once created) is destroyed.

use crate::runtime::{DeviceRuntime, SignalHandle, WaitOutcome};
use crate::topology::Registry;
use crate::transfer::BufferPair;
use crate::{PeerlatError, Result};
use std::time::Duration;

/// Sentinel duration reported when the device profiling query fails after a
/// completed copy. The copy itself succeeded; only its timing is unknown.
pub const COPY_TIME_UNAVAILABLE: i64 = -1;

/// Destroys its signal on drop.
struct SignalGuard<'r, R: DeviceRuntime> {
    runtime: &'r R,
    signal: SignalHandle,
}

impl<R: DeviceRuntime> Drop for SignalGuard<'_, R> {
    fn drop(&mut self) {
        self.runtime.destroy_signal(self.signal);
    }
}

/// Measure one asynchronous copy of `size` bytes over `pair`.
///
/// Returns the device-reported duration in nanoseconds, or
/// [`COPY_TIME_UNAVAILABLE`] when the profiling query fails. The buffer pair
/// is consumed: both buffers are freed before this returns, on success and on
/// every failure path.
pub fn measure_copy<R: DeviceRuntime>(
    runtime: &R,
    registry: &Registry,
    src_index: usize,
    dst_index: usize,
    pair: BufferPair,
    size: u64,
    timeout: Duration,
) -> Result<i64> {
    let result = measure_inner(runtime, registry, src_index, dst_index, &pair, size, timeout);
    pair.release(runtime);
    result
}

fn measure_inner<R: DeviceRuntime>(
    runtime: &R,
    registry: &Registry,
    src_index: usize,
    dst_index: usize,
    pair: &BufferPair,
    size: u64,
    timeout: Duration,
) -> Result<i64> {
    let src_agent = registry.agent(src_index)?.handle;
    let dst_agent = registry.agent(dst_index)?.handle;

    // Binary completion signal: starts at 1, the runtime decrements to 0 when
    // the copy finishes.
    let signal = runtime
        .create_signal(1)
        .map_err(|e| PeerlatError::Signal(format!("Signal creation failed: {}", e)))?;
    let _signal_guard = SignalGuard { runtime, signal };

    runtime
        .async_copy(pair.dst_buffer, dst_agent, pair.src_buffer, src_agent, size, signal)
        .map_err(|e| PeerlatError::Copy(format!("Async copy issue failed: {}", e)))?;

    match runtime
        .wait_signal(signal, timeout)
        .map_err(|e| PeerlatError::Copy(format!("Signal wait failed: {}", e)))?
    {
        WaitOutcome::Completed => {}
        WaitOutcome::TimedOut => {
            return Err(PeerlatError::Copy(format!(
                "Copy did not complete within {:?}",
                timeout
            )));
        }
    }

    match runtime.copy_timestamps(signal) {
        Ok((start, end)) => {
            let duration_ns = end.saturating_sub(start) as i64;
            println!(
                "[TIMING][MEASURE] Copy of {} B took {} ns",
                size, duration_ns
            );
            Ok(duration_ns)
        }
        Err(e) => {
            println!("[TIMING][MEASURE] Copy time query failed: {}", e);
            Ok(COPY_TIME_UNAVAILABLE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTopologyBuilder;
    use crate::topology::DeviceType;
    use crate::transfer::allocate_pair;

    #[test]
    fn test_successful_copy_reports_duration() {
        let runtime = SimTopologyBuilder::new()
            .agent("cpu0", DeviceType::Cpu, 0)
            .pool(1 << 20)
            .agent("gpu0", DeviceType::Gpu, 1)
            .pool(1 << 20)
            .build();

        let registry = Registry::discover(&runtime).expect("Discovery failed");
        let pair = allocate_pair(&runtime, &registry, 0, 1, 4096).expect("Allocation failed");

        let duration =
            measure_copy(&runtime, &registry, 0, 1, pair, 4096, Duration::from_secs(5))
                .expect("Measurement failed");

        assert!(duration >= 0);
        assert_eq!(runtime.live_buffers(), 0);
        assert_eq!(runtime.live_signals(), 0);
    }

    #[test]
    fn test_profiling_failure_yields_sentinel() {
        let runtime = SimTopologyBuilder::new()
            .agent("cpu0", DeviceType::Cpu, 0)
            .pool(1 << 20)
            .agent("gpu0", DeviceType::Gpu, 1)
            .pool(1 << 20)
            .fail_profiling()
            .build();

        let registry = Registry::discover(&runtime).expect("Discovery failed");
        let pair = allocate_pair(&runtime, &registry, 0, 1, 4096).expect("Allocation failed");

        let duration =
            measure_copy(&runtime, &registry, 0, 1, pair, 4096, Duration::from_secs(5))
                .expect("Measurement failed");

        assert_eq!(duration, COPY_TIME_UNAVAILABLE);
        assert_eq!(runtime.live_buffers(), 0);
        assert_eq!(runtime.live_signals(), 0);
    }

    #[test]
    fn test_signal_failure_releases_buffers() {
        let runtime = SimTopologyBuilder::new()
            .agent("cpu0", DeviceType::Cpu, 0)
            .pool(1 << 20)
            .agent("gpu0", DeviceType::Gpu, 1)
            .pool(1 << 20)
            .fail_signal_creation()
            .build();

        let registry = Registry::discover(&runtime).expect("Discovery failed");
        let pair = allocate_pair(&runtime, &registry, 0, 1, 4096).expect("Allocation failed");

        let result =
            measure_copy(&runtime, &registry, 0, 1, pair, 4096, Duration::from_secs(5));

        assert!(matches!(result, Err(PeerlatError::Signal(_))));
        assert_eq!(runtime.live_buffers(), 0);
        assert_eq!(runtime.live_signals(), 0);
    }

    #[test]
    fn test_stalled_copy_times_out() {
        let runtime = SimTopologyBuilder::new()
            .agent("cpu0", DeviceType::Cpu, 0)
            .pool(1 << 20)
            .agent("gpu0", DeviceType::Gpu, 1)
            .pool(1 << 20)
            .stall_copies()
            .build();

        let registry = Registry::discover(&runtime).expect("Discovery failed");
        let pair = allocate_pair(&runtime, &registry, 0, 1, 4096).expect("Allocation failed");

        let result =
            measure_copy(&runtime, &registry, 0, 1, pair, 4096, Duration::from_millis(10));

        assert!(matches!(result, Err(PeerlatError::Copy(_))));
        assert_eq!(runtime.live_buffers(), 0);
        assert_eq!(runtime.live_signals(), 0);
    }
}
