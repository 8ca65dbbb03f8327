//! peerlat: heterogeneous agent topology discovery and peer-to-peer copy
//! latency probing.
//!
//! The pipeline is topology discovery -> pool cataloging -> cross-device
//! buffer negotiation -> copy timing. All device interaction goes through the
//! [`runtime::DeviceRuntime`] capability trait, so the whole pipeline can run
//! against the in-process [`sim::SimRuntime`] without real hardware.

pub mod catalog;
pub mod probe;
pub mod profile;
pub mod runtime;
pub mod sim;
pub mod telemetry;
pub mod timing;
pub mod topology;
pub mod transfer;

// Re-export key types
pub use probe::{run_probe, ProbeSummary};
pub use profile::{load_transfer_profile, TransferProfile, TransferProfiles};
pub use runtime::{
    AgentHandle, BufferHandle, DeviceRuntime, PoolAccess, PoolHandle, Segment, SignalHandle,
    WaitOutcome,
};
pub use sim::{SimRuntime, SimTopologyBuilder};
pub use timing::{measure_copy, COPY_TIME_UNAVAILABLE};
pub use topology::{AgentRecord, DeviceType, PoolEntry, Registry};
pub use transfer::{allocate_pair, BufferPair};

/// Main error type for peerlat
#[derive(Debug, thiserror::Error)]
pub enum PeerlatError {
    #[error("Agent query error: {0}")]
    AgentQuery(String),

    #[error("Pool attribute error: {0}")]
    PoolAttribute(String),

    #[error("Allocation error: {0}")]
    Allocation(String),

    #[error("Access grant error: {0}")]
    AccessGrant(String),

    #[error("Signal error: {0}")]
    Signal(String),

    #[error("Copy error: {0}")]
    Copy(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PeerlatError>;
