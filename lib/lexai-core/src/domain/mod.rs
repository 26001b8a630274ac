//! Core entities: tenant-owned contracts, analysis attempts, and the wire
//! shapes shared with the job queue and the event bus.

pub mod analysis;
pub mod contract;
pub mod events;

pub use analysis::{Analysis, AnalysisResult, AnalysisState, CachedSummary, Obligations, RiskLevel};
pub use contract::{AlertRecord, Contract, ContractDates, ContractVersion, DEFAULT_ALERT_THRESHOLDS};
pub use events::{
    AlertJob, AnalysisCompletePayload, AnalysisFailedPayload, AnalysisJob, ContractExpiringPayload,
    DiffCompletePayload, DiffJob, SocketEvent, SOCKET_EVENTS_CHANNEL,
};
