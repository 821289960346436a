// geoguard/src/events.rs
//
// Shared domain types flowing through geoguard: resolved locations, the
// risk verdict handed back to the authentication flow, rule findings, and
// the structured security alert emitted on impossible travel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Country code sentinel for "location could not be determined".
pub const UNKNOWN_COUNTRY: &str = "unknown";

// ── Locations ─────────────────────────────────────────────────────────────────

/// A latitude/longitude pair. Held as one optional value on `GeoLocation`
/// so a location can never carry one coordinate without the other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Resolved location of an IP address. Treated as an immutable value:
/// enrichment (`with_asn`) produces a new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country_code: String, // ISO 3166-1 alpha-2, or UNKNOWN_COUNTRY
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub subdivision_name: Option<String>,
    #[serde(default)]
    pub subdivision_code: Option<String>,
    #[serde(default)]
    pub asn: Option<String>, // "AS<digits>"
}

impl GeoLocation {
    /// The "no data" location returned for addresses the provider cannot place.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_COUNTRY)
    }

    pub fn new(country_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            country_name: None,
            city: None,
            postal_code: None,
            coordinates: None,
            time_zone: None,
            subdivision_name: None,
            subdivision_code: None,
            asn: None,
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.coordinates = Some(Coordinates::new(latitude, longitude));
        self
    }

    /// Returns a copy of this location carrying the supplied ASN.
    pub fn with_asn(&self, asn: impl Into<String>) -> Self {
        Self { asn: Some(asn.into()), ..self.clone() }
    }

    pub fn is_unknown(&self) -> bool {
        self.country_code.is_empty() || self.country_code.eq_ignore_ascii_case(UNKNOWN_COUNTRY)
    }

    /// City for human-readable output ("Unknown" when absent).
    pub fn city_label(&self) -> &str {
        self.city.as_deref().filter(|c| !c.is_empty()).unwrap_or("Unknown")
    }

    /// Country for human-readable output ("XX" when absent or unknown).
    pub fn country_label(&self) -> &str {
        if self.is_unknown() { "XX" } else { &self.country_code }
    }
}

// ── Risk verdict ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Escalate to at least `proposed`. Never lowers the level.
    pub fn escalate(self, proposed: RiskLevel) -> RiskLevel {
        self.max(proposed)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Result handed back to the authentication flow.
///
/// The risk level only moves upward: every mutation goes through
/// `escalate`, and alerts are append-only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationResult {
    risk_level: RiskLevel,
    alerts: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VerificationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail-closed verdict for blank ip / user id.
    pub fn invalid_input() -> Self {
        let mut r = Self::new();
        r.escalate(RiskLevel::High);
        r.push_alert("Invalid input: IP address and user ID are required");
        r
    }

    /// Fail-closed verdict for any unexpected failure inside the engine.
    pub fn internal_error() -> Self {
        let mut r = Self::new();
        r.escalate(RiskLevel::High);
        r.push_alert("Internal error during location verification");
        r
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    pub fn escalate(&mut self, proposed: RiskLevel) {
        self.risk_level = self.risk_level.escalate(proposed);
    }

    pub fn push_alert(&mut self, alert: impl Into<String>) {
        self.alerts.push(alert.into());
    }

    /// Fold one rule finding into the verdict.
    pub fn apply(&mut self, finding: &RuleFinding) {
        self.escalate(finding.level);
        self.push_alert(finding.alert.clone());
        for (k, v) in &finding.meta {
            self.metadata.insert(k.clone(), v.clone());
        }
    }
}

// ── Rule findings ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RuleKind {
    UnknownLocation,
    ImpossibleTravel,
    VpnRisk,
    CountryRisk,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLocation => write!(f, "unknown_location"),
            Self::ImpossibleTravel => write!(f, "impossible_travel"),
            Self::VpnRisk => write!(f, "vpn_risk"),
            Self::CountryRisk => write!(f, "country_risk"),
        }
    }
}

/// What a single rule concluded. Rules return `None` when they have nothing
/// to say; the engine folds each finding into the `VerificationResult`.
#[derive(Debug, Clone)]
pub struct RuleFinding {
    pub rule: RuleKind,
    pub level: RiskLevel,
    pub alert: String,
    pub meta: HashMap<String, serde_json::Value>,
    pub security_alert: Option<SecurityAlert>,
}

impl RuleFinding {
    pub fn new(rule: RuleKind, level: RiskLevel, alert: impl Into<String>) -> Self {
        Self {
            rule,
            level,
            alert: alert.into(),
            meta: HashMap::new(),
            security_alert: None,
        }
    }
}

// ── Security alerts ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Structured event handed to a `SecurityAlertSink`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub user_id: String,
    pub title: String,
    pub attributes: HashMap<String, String>,
    pub severity: AlertSeverity,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
}

impl SecurityAlert {
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ── Feed input ────────────────────────────────────────────────────────────────

/// One authentication attempt as read from a JSONL feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub user_id: String,
    pub ip: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}
