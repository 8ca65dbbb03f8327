//! Probe Harness
//!
//! Drives the full pipeline for a configured agent pair: one discovery, then
//! `repetitions` rounds of allocate -> timed copy -> release. Rounds whose
//! profiling record was unavailable are counted but excluded from the
//! duration statistics.

use crate::profile::TransferProfile;
use crate::runtime::DeviceRuntime;
use crate::telemetry::{RoundEvent, TelemetryLogger};
use crate::timing::{measure_copy, COPY_TIME_UNAVAILABLE};
use crate::topology::Registry;
use crate::transfer::allocate_pair;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Aggregated result of a probe run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSummary {
    pub src_agent: usize,
    pub dst_agent: usize,
    pub src_name: String,
    pub dst_name: String,
    pub size_bytes: u64,
    pub rounds: usize,
    pub unprofiled_rounds: usize,
    /// Per-round device-reported durations; -1 marks an unprofiled round.
    pub durations_ns: Vec<i64>,
    pub min_ns: Option<u64>,
    pub max_ns: Option<u64>,
    pub mean_ns: Option<u64>,
}

impl ProbeSummary {
    fn from_rounds(
        registry: &Registry,
        profile: &TransferProfile,
        durations_ns: Vec<i64>,
    ) -> Result<Self> {
        let valid: Vec<u64> = durations_ns
            .iter()
            .filter(|&&d| d != COPY_TIME_UNAVAILABLE)
            .map(|&d| d as u64)
            .collect();

        let mean_ns = if valid.is_empty() {
            None
        } else {
            Some(valid.iter().sum::<u64>() / valid.len() as u64)
        };

        Ok(Self {
            src_agent: profile.src_agent,
            dst_agent: profile.dst_agent,
            src_name: registry.agent(profile.src_agent)?.name.clone(),
            dst_name: registry.agent(profile.dst_agent)?.name.clone(),
            size_bytes: profile.size_bytes,
            rounds: durations_ns.len(),
            unprofiled_rounds: durations_ns.len() - valid.len(),
            min_ns: valid.iter().copied().min(),
            max_ns: valid.iter().copied().max(),
            mean_ns,
            durations_ns,
        })
    }

    /// Format summary for display.
    pub fn format_summary(&self) -> String {
        let mut lines = vec![
            "Peer Copy Probe Summary".to_string(),
            "=======================".to_string(),
            format!(
                "Transfer: agent {} '{}' -> agent {} '{}'",
                self.src_agent, self.src_name, self.dst_agent, self.dst_name
            ),
            format!("Size: {} B", self.size_bytes),
            format!(
                "Rounds: {} ({} without profiling data)",
                self.rounds, self.unprofiled_rounds
            ),
        ];

        match (self.min_ns, self.max_ns, self.mean_ns) {
            (Some(min), Some(max), Some(mean)) => {
                lines.push(format!(
                    "Duration: min={} ns, max={} ns, mean={} ns",
                    min, max, mean
                ));
            }
            _ => {
                lines.push("Duration: no profiled rounds".to_string());
            }
        }

        lines.join("\n")
    }
}

/// Run the configured probe against a runtime.
///
/// Discovery happens once; each round performs a fresh one-shot allocation
/// negotiation and a single timed copy, releasing everything before the next
/// round. Telemetry, when a logger is supplied, records one event per round.
pub fn run_probe<R: DeviceRuntime>(
    runtime: &R,
    profile: &TransferProfile,
    telemetry: Option<&TelemetryLogger>,
) -> Result<ProbeSummary> {
    profile.validate()?;

    let registry = Registry::discover(runtime)?;
    let timeout = Duration::from_millis(profile.wait_timeout_ms);

    println!(
        "[PROBE][RUN] {} round(s), agents {} -> {}, {} B",
        profile.repetitions, profile.src_agent, profile.dst_agent, profile.size_bytes
    );

    let mut durations_ns = Vec::with_capacity(profile.repetitions);

    for round in 0..profile.repetitions {
        let pair = allocate_pair(
            runtime,
            &registry,
            profile.src_agent,
            profile.dst_agent,
            profile.size_bytes,
        )?;

        let duration_ns = measure_copy(
            runtime,
            &registry,
            profile.src_agent,
            profile.dst_agent,
            pair,
            profile.size_bytes,
            timeout,
        )?;

        if profile.verbose {
            println!("[PROBE][RUN] Round {}: {} ns", round, duration_ns);
        }

        if let Some(logger) = telemetry {
            logger.log(RoundEvent {
                round,
                src_agent: profile.src_agent,
                dst_agent: profile.dst_agent,
                size_bytes: profile.size_bytes,
                duration_ns,
            });
        }

        durations_ns.push(duration_ns);
    }

    let summary = ProbeSummary::from_rounds(&registry, profile, durations_ns)?;

    println!(
        "[PROBE][RUN] Complete: {} round(s), mean {:?} ns",
        summary.rounds, summary.mean_ns
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTopologyBuilder;
    use crate::topology::DeviceType;

    fn cpu_gpu_runtime() -> crate::sim::SimRuntime {
        SimTopologyBuilder::new()
            .agent("cpu0", DeviceType::Cpu, 0)
            .pool(1 << 20)
            .agent("gpu0", DeviceType::Gpu, 1)
            .pool(1 << 20)
            .build()
    }

    #[test]
    fn test_probe_runs_all_rounds() {
        let runtime = cpu_gpu_runtime();
        let profile = TransferProfile {
            repetitions: 5,
            ..TransferProfile::default()
        };

        let summary = run_probe(&runtime, &profile, None).expect("Probe failed");

        assert_eq!(summary.rounds, 5);
        assert_eq!(summary.unprofiled_rounds, 0);
        assert_eq!(summary.durations_ns.len(), 5);
        assert!(summary.min_ns.is_some());
        assert!(summary.mean_ns.unwrap() >= summary.min_ns.unwrap());
        assert!(summary.max_ns.unwrap() >= summary.mean_ns.unwrap());
        assert_eq!(runtime.live_buffers(), 0);
        assert_eq!(runtime.live_signals(), 0);
    }

    #[test]
    fn test_probe_counts_unprofiled_rounds() {
        let runtime = SimTopologyBuilder::new()
            .agent("cpu0", DeviceType::Cpu, 0)
            .pool(1 << 20)
            .agent("gpu0", DeviceType::Gpu, 1)
            .pool(1 << 20)
            .fail_profiling()
            .build();

        let profile = TransferProfile {
            repetitions: 3,
            ..TransferProfile::default()
        };

        let summary = run_probe(&runtime, &profile, None).expect("Probe failed");

        assert_eq!(summary.rounds, 3);
        assert_eq!(summary.unprofiled_rounds, 3);
        assert!(summary.mean_ns.is_none());
        assert!(summary.format_summary().contains("no profiled rounds"));
    }

    #[test]
    fn test_summary_formatting() {
        let runtime = cpu_gpu_runtime();
        let profile = TransferProfile::default();

        let summary = run_probe(&runtime, &profile, None).expect("Probe failed");
        let formatted = summary.format_summary();

        assert!(formatted.contains("Peer Copy Probe Summary"));
        assert!(formatted.contains("agent 0 'cpu0' -> agent 1 'gpu0'"));
        assert!(formatted.contains("Size: 1024 B"));
    }
}
