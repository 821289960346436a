// geoguard/src/config.rs
//
// Engine configuration. Loaded once at startup (JSON file or defaults),
// normalised, validated, then shared read-only behind an Arc.
//
// Example:
//   {
//     "suspicious_distance_km": 300,
//     "time_window_hours": 24,
//     "known_vpn_asns": ["AS9009", "20473"],
//     "high_risk_countries": ["kp", "IR"],
//     "vpn_risk_level": "HIGH"
//   }

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::events::RiskLevel;

/// Speed above which two consecutive logins are considered physically
/// impossible (km/h). Above cruising speed of commercial aircraft.
pub const IMPOSSIBLE_SPEED_KMH: f64 = 1100.0;

// VPN exit / VPS / bulk hosting networks.
const DEFAULT_VPN_ASNS: &[&str] = &[
    "AS9009",   // M247
    "AS20473",  // Choopa / Vultr
    "AS14061",  // DigitalOcean
    "AS63949",  // Linode / Akamai
    "AS16276",  // OVH
    "AS24940",  // Hetzner
    "AS60068",  // Datacamp (CDN77)
    "AS212238", // Datacamp
    "AS60781",  // Leaseweb
    "AS51167",  // Contabo
    "AS8100",   // QuadraNet
    "AS53667",  // FranTech / BuyVM
    "AS40676",  // Psychz
    "AS46844",  // Sharktech
    "AS136787", // TEFINCOM (NordVPN)
    "AS147049", // PacketHub
];

const DEFAULT_HIGH_RISK_COUNTRIES: &[&str] = &["KP", "IR", "SY", "CU"];

/// Upper bounds keeping time arithmetic in range: ten years of history TTL,
/// one day of non-detection window.
pub const MAX_TIME_WINDOW_HOURS: u32 = 87_600;
pub const MAX_MIN_TRAVEL_ELAPSED_SECS: i64 = 86_400;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub suspicious_distance_km:      f64,
    pub time_window_hours:           u32,   // history cache TTL
    pub impossible_travel_speed_kmh: f64,
    pub min_travel_elapsed_secs:     i64,   // elapsed must be strictly greater
    pub vpn_reputation_threshold:    f64,
    pub known_vpn_asns:              HashSet<String>,
    pub high_risk_countries:         HashSet<String>,
    pub vpn_risk_level:              RiskLevel,
    pub country_risk_level:          RiskLevel,
    pub max_history_entries:         usize,
    pub lookup_timeout_ms:           u64,
    pub environment:                 String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            suspicious_distance_km:      500.0,
            time_window_hours:           24,
            impossible_travel_speed_kmh: IMPOSSIBLE_SPEED_KMH,
            min_travel_elapsed_secs:     1,
            vpn_reputation_threshold:    0.3,
            known_vpn_asns:      DEFAULT_VPN_ASNS.iter().map(|s| s.to_string()).collect(),
            high_risk_countries: DEFAULT_HIGH_RISK_COUNTRIES.iter().map(|s| s.to_string()).collect(),
            vpn_risk_level:      RiskLevel::Medium,
            country_risk_level:  RiskLevel::Medium,
            max_history_entries: 10,
            lookup_timeout_ms:   500,
            environment:         "production".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load, normalise and validate a JSON config file. Missing fields take
    /// their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(content)?;
        cfg.normalized().validated()
    }

    /// Canonical forms: ASNs as "AS<digits>", country codes upper-case.
    pub fn normalized(mut self) -> Self {
        self.known_vpn_asns = self.known_vpn_asns.iter()
            .map(|a| normalize_asn(a))
            .filter(|a| !a.is_empty())
            .collect();
        self.high_risk_countries = self.high_risk_countries.iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        self
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.known_vpn_asns.is_empty() {
            return Err(ConfigError::Invalid("known_vpn_asns must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.vpn_reputation_threshold) {
            return Err(ConfigError::Invalid(format!(
                "vpn_reputation_threshold must be within [0, 1], got {}",
                self.vpn_reputation_threshold
            )));
        }
        if !(self.impossible_travel_speed_kmh > 0.0) {
            return Err(ConfigError::Invalid("impossible_travel_speed_kmh must be > 0".into()));
        }
        if !(self.suspicious_distance_km >= 0.0) {
            return Err(ConfigError::Invalid("suspicious_distance_km must be >= 0".into()));
        }
        if self.time_window_hours == 0 || self.time_window_hours > MAX_TIME_WINDOW_HOURS {
            return Err(ConfigError::Invalid(format!(
                "time_window_hours must be within 1..={}, got {}",
                MAX_TIME_WINDOW_HOURS, self.time_window_hours
            )));
        }
        if self.max_history_entries == 0 {
            return Err(ConfigError::Invalid("max_history_entries must be >= 1".into()));
        }
        if !(0..=MAX_MIN_TRAVEL_ELAPSED_SECS).contains(&self.min_travel_elapsed_secs) {
            return Err(ConfigError::Invalid(format!(
                "min_travel_elapsed_secs must be within 0..={}, got {}",
                MAX_MIN_TRAVEL_ELAPSED_SECS, self.min_travel_elapsed_secs
            )));
        }
        for (name, level) in [("vpn_risk_level", self.vpn_risk_level),
                              ("country_risk_level", self.country_risk_level)] {
            if level == RiskLevel::Low {
                return Err(ConfigError::Invalid(format!("{} must be MEDIUM or HIGH", name)));
            }
        }
        Ok(self)
    }

    pub fn history_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.time_window_hours as i64)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn is_known_vpn_asn(&self, asn: &str) -> bool {
        self.known_vpn_asns.contains(&normalize_asn(asn))
    }

    pub fn is_high_risk_country(&self, country_code: &str) -> bool {
        self.high_risk_countries.contains(&country_code.trim().to_ascii_uppercase())
    }
}

/// "as1234", "AS1234" and "1234" all become "AS1234". Anything else is
/// returned trimmed and upper-cased so it can still be compared.
pub fn normalize_asn(asn: &str) -> String {
    let upper = asn.trim().to_ascii_uppercase();
    let digits = upper.strip_prefix("AS").unwrap_or(&upper);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        format!("AS{}", digits)
    } else {
        upper
    }
}
