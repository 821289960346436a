// geoguard/src/lib.rs
//
// geoguard — login geolocation risk engine.
//
// For each authentication attempt the engine resolves the source IP to a
// location, compares it with the user's recent login history, and returns a
// risk verdict (LOW / MEDIUM / HIGH) plus human-readable alerts. It never
// blocks a login itself; the calling authentication flow decides whether to
// step up (e.g. force MFA).
//
//   events   — domain types (GeoLocation, VerificationResult, SecurityAlert)
//   config   — EngineConfig, loaded once and shared read-only
//   geo      — distance/speed math, lookup collaborators, ASN reputation
//   state    — per-user location history cache
//   rules    — unknown location, impossible travel, VPN/ASN, high-risk country
//   engine   — RiskEngine orchestrator and security alert sinks

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod geo;
pub mod rules;
pub mod state;

pub use config::EngineConfig;
pub use engine::{RiskEngine, SecurityAlertSink};
pub use error::{EngineError, LookupError, ReputationError, StoreError};
pub use events::{GeoLocation, RiskLevel, VerificationResult};
