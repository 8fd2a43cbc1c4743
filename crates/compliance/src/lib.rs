//! Schedule compliance: run ledger, per-tick evaluation, alert
//! deduplication and the scheduler loop that ties them together.

pub mod activity;
pub mod clock;
pub mod dedup;
pub mod engine;
pub mod evaluator;
pub mod health;
pub mod ledger;
pub mod metrics;
pub mod registry;
pub mod runner;
pub mod store;

pub use activity::{ActivityEntry, ActivityKind, ActivityLevel, ActivityLog, ActivityQuery};
pub use clock::{Clock, IntervalTicker, ManualClock, ManualTicker, SystemClock, TickHandle, Ticker};
pub use dedup::{AlertDeduplicator, Decision, IncidentPhase, SuppressionEntry};
pub use engine::{ComplianceEngine, EngineHandle, EngineSettings, StatusBoard, TargetView, TickSummary};
pub use evaluator::{ComplianceEvaluator, Evaluation, EvaluationError};
pub use health::{HealthPolicy, HealthStatus, TargetHealth};
pub use ledger::{LedgerSnapshot, RecordOutcome, RunLedger};
pub use metrics::EngineMetrics;
pub use registry::ScheduleRegistry;
pub use runner::{LoopExit, SchedulerLoop};
pub use store::{JsonLinesStore, LedgerStore, MemoryStore, StoreError};
