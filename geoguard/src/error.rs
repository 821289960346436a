// geoguard/src/error.rs
//
// Error taxonomy. Providers return tagged kinds so the engine can tell a
// benign "no data" answer apart from a broken lookup subsystem.

use thiserror::Error;

/// Failure reported by a `GeoLocationProvider` or `AsnLookup`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("no data for address {0}")]
    NotFound(String),

    #[error("invalid address format: {0:?}")]
    InvalidAddress(String),

    #[error("lookup subsystem unavailable: {0}")]
    Unavailable(String),

    #[error("lookup timed out after {0}ms")]
    Timeout(u64),
}

impl LookupError {
    /// Recoverable errors are treated as "unknown location"; the rest are
    /// infrastructure failures.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

/// Failure on the optional ASN reputation path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReputationError {
    #[error("reputation lookup failed for {asn}: {reason}")]
    LookupFailed { asn: String, reason: String },

    #[error("malformed ASN: {0:?}")]
    Malformed(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("alert sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("alert sink rejected alert: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Unrecoverable failure inside one verification. Never escapes `RiskEngine`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("location lookup failed: {0}")]
    Lookup(#[from] LookupError),
}
