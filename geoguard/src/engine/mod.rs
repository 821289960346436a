pub mod alerts;
pub mod risk;

pub use alerts::{JsonlAlertSink, LogAlertSink, MemoryAlertSink, SecurityAlertSink};
pub use risk::{EngineStats, RiskEngine, StatsSnapshot};
