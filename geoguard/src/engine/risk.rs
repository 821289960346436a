// geoguard/src/engine/risk.rs
//
// RiskEngine — per-login orchestration.
//
//   1. blank ip / user id                      → HIGH, "invalid input"
//   2. resolve location (timeout-bounded)      not-found / bad format / timeout → unknown
//                                              subsystem broken → HIGH internal error
//   3. enrich missing ASN (best effort)
//   4. get-or-create the user's history
//   5. unknown location guard                  → MEDIUM, single alert, no history update
//   6. impossible travel → VPN → country       escalation = max(), never lowers
//   7. append location, write history back     write failure logged, verdict unchanged
//
// Anything that goes wrong inside 2–7, panics included, becomes a HIGH
// "internal error" verdict. Nothing escapes to the authentication flow.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::{normalize_asn, EngineConfig};
use crate::engine::alerts::SecurityAlertSink;
use crate::error::{EngineError, LookupError, ReputationError};
use crate::events::{GeoLocation, LoginAttempt, RiskLevel, RuleKind, VerificationResult};
use crate::geo::provider::{AsnLookup, GeoLocationProvider};
use crate::geo::reputation::AsnReputationProvider;
use crate::rules::{self, impossible_travel, unknown_location, vpn, RuleContext};
use crate::state::history::{HistoryStore, LocationHistory};

// ── Counters ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct EngineStats {
    pub verifications:          AtomicU64,
    pub low:                    AtomicU64,
    pub medium:                 AtomicU64,
    pub high:                   AtomicU64,
    pub internal_errors:        AtomicU64,
    pub unknown_locations:      AtomicU64,
    pub impossible_travel:      AtomicU64,
    pub history_write_failures: AtomicU64,
    pub alert_failures:         AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub verifications:          u64,
    pub low:                    u64,
    pub medium:                 u64,
    pub high:                   u64,
    pub internal_errors:        u64,
    pub unknown_locations:      u64,
    pub impossible_travel:      u64,
    pub history_write_failures: u64,
    pub alert_failures:         u64,
}

impl EngineStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_level(&self, level: RiskLevel) {
        match level {
            RiskLevel::Low    => Self::bump(&self.low),
            RiskLevel::Medium => Self::bump(&self.medium),
            RiskLevel::High   => Self::bump(&self.high),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            verifications:          self.verifications.load(Ordering::Relaxed),
            low:                    self.low.load(Ordering::Relaxed),
            medium:                 self.medium.load(Ordering::Relaxed),
            high:                   self.high.load(Ordering::Relaxed),
            internal_errors:        self.internal_errors.load(Ordering::Relaxed),
            unknown_locations:      self.unknown_locations.load(Ordering::Relaxed),
            impossible_travel:      self.impossible_travel.load(Ordering::Relaxed),
            history_write_failures: self.history_write_failures.load(Ordering::Relaxed),
            alert_failures:         self.alert_failures.load(Ordering::Relaxed),
        }
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct RiskEngine {
    config:     Arc<EngineConfig>,
    geo:        Arc<dyn GeoLocationProvider>,
    asn_lookup: Option<Arc<dyn AsnLookup>>,
    reputation: Option<Arc<dyn AsnReputationProvider>>,
    history:    Arc<dyn HistoryStore>,
    alerts:     Arc<dyn SecurityAlertSink>,
    stats:      EngineStats,
}

impl RiskEngine {
    pub fn new(
        config:  Arc<EngineConfig>,
        geo:     Arc<dyn GeoLocationProvider>,
        history: Arc<dyn HistoryStore>,
        alerts:  Arc<dyn SecurityAlertSink>,
    ) -> Self {
        Self {
            config,
            geo,
            asn_lookup: None,
            reputation: None,
            history,
            alerts,
            stats: EngineStats::default(),
        }
    }

    pub fn with_asn_lookup(mut self, lookup: Arc<dyn AsnLookup>) -> Self {
        self.asn_lookup = Some(lookup);
        self
    }

    pub fn with_reputation(mut self, reputation: Arc<dyn AsnReputationProvider>) -> Self {
        self.reputation = Some(reputation);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub async fn verify(&self, ip: &str, user_id: &str) -> VerificationResult {
        self.verify_at(ip, user_id, Utc::now()).await
    }

    /// Verify an attempt from a feed, using its recorded time when present.
    pub async fn verify_attempt(&self, attempt: &LoginAttempt) -> VerificationResult {
        let now = attempt.timestamp.unwrap_or_else(Utc::now);
        self.verify_at(&attempt.ip, &attempt.user_id, now).await
    }

    pub async fn verify_at(&self, ip: &str, user_id: &str, now: DateTime<Utc>) -> VerificationResult {
        EngineStats::bump(&self.stats.verifications);
        let (ip, user_id) = (ip.trim(), user_id.trim());

        let result = if ip.is_empty() || user_id.is_empty() {
            warn!("Rejecting verification with blank ip or user id");
            VerificationResult::invalid_input()
        } else {
            match AssertUnwindSafe(self.evaluate(ip, user_id, now)).catch_unwind().await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    EngineStats::bump(&self.stats.internal_errors);
                    error!(user_id, ip, error = %e, "Verification failed; failing closed");
                    VerificationResult::internal_error()
                }
                Err(_) => {
                    EngineStats::bump(&self.stats.internal_errors);
                    error!(user_id, ip, "Verification panicked; failing closed");
                    VerificationResult::internal_error()
                }
            }
        };

        self.stats.record_level(result.risk_level());
        if result.risk_level() == RiskLevel::High {
            info!(user_id, ip, alerts = ?result.alerts(), "HIGH risk login");
        }
        result
    }

    async fn evaluate(
        &self,
        ip: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationResult, EngineError> {
        let location = self.resolve_location(ip).await?;
        let location = self.enrich_asn(ip, location).await;

        let mut result = VerificationResult::new();

        let (history, detached) = match self.history.get_or_create(user_id).await {
            Ok(h) => (h, false),
            Err(e) => {
                warn!(user_id, error = %e, "History unavailable; evaluating without it");
                result.metadata.insert("history_unavailable".into(), json!(true));
                let empty = LocationHistory::new(user_id, self.config.max_history_entries);
                (Arc::new(RwLock::new(empty)), true)
            }
        };

        if let Some(finding) = unknown_location::analyze(Some(&location)) {
            EngineStats::bump(&self.stats.unknown_locations);
            debug!(user_id, ip, "Location unknown; skipping location rules");
            result.apply(&finding);
            return Ok(result);
        }

        result.metadata.insert("country".into(), json!(location.country_code));
        if let Some(asn) = &location.asn {
            result.metadata.insert("asn".into(), json!(asn));
        }

        let findings = {
            let h = history.read();
            let ctx = RuleContext {
                user_id,
                current: &location,
                history: &*h,
                now,
                config:  &self.config,
            };

            if let Some(m) = impossible_travel::measure(&ctx) {
                let suspicious = m.distance_km > self.config.suspicious_distance_km;
                result.metadata.insert("distance_km".into(), json!((m.distance_km * 10.0).round() / 10.0));
                result.metadata.insert("elapsed_secs".into(), json!(m.elapsed.num_seconds()));
                if m.speed_kmh.is_finite() {
                    result.metadata.insert("speed_kmh".into(), json!(m.speed_kmh.round()));
                }
                result.metadata.insert("suspicious_distance".into(), json!(suspicious));
                if suspicious {
                    debug!(user_id, distance_km = m.distance_km, speed_kmh = m.speed_kmh,
                           "Long-distance move since last login");
                }
            }

            rules::run_all(&ctx)
        };

        for finding in &findings {
            result.apply(finding);
            if finding.rule == RuleKind::ImpossibleTravel {
                EngineStats::bump(&self.stats.impossible_travel);
            }
            if let Some(alert) = &finding.security_alert {
                if let Err(e) = self.alerts.emit(alert).await {
                    EngineStats::bump(&self.stats.alert_failures);
                    warn!(user_id, error = %e, "Security alert delivery failed");
                }
            }
        }

        if !detached {
            let size = {
                let mut h = history.write();
                h.record(location, now);
                h.len()
            };
            result.metadata.insert("history_size".into(), json!(size));

            if let Err(e) = self.history.put(user_id, Arc::clone(&history)).await {
                EngineStats::bump(&self.stats.history_write_failures);
                warn!(user_id, error = %e, "History write-back failed; verdict unaffected");
                result.metadata.insert("history_write_failed".into(), json!(true));
            }
        }

        Ok(result)
    }

    async fn resolve_location(&self, ip: &str) -> Result<GeoLocation, EngineError> {
        match timeout(self.config.lookup_timeout(), self.geo.lookup(ip)).await {
            Ok(Ok(location)) => Ok(location),
            Ok(Err(e)) if e.is_recoverable() => {
                debug!(ip, error = %e, "Geolocation lookup gave no location");
                Ok(GeoLocation::unknown())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                let e = LookupError::Timeout(self.config.lookup_timeout_ms);
                warn!(ip, error = %e, "Geolocation lookup timed out; treating as unknown");
                Ok(GeoLocation::unknown())
            }
        }
    }

    /// Best effort: any failure leaves the location as it was.
    async fn enrich_asn(&self, ip: &str, location: GeoLocation) -> GeoLocation {
        if location.asn.is_some() || location.is_unknown() {
            return location;
        }
        let Some(lookup) = &self.asn_lookup else {
            return location;
        };
        match timeout(self.config.lookup_timeout(), lookup.lookup_asn(ip)).await {
            Ok(Ok(asn)) if !asn.trim().is_empty() => location.with_asn(normalize_asn(&asn)),
            Ok(Ok(_)) => location,
            Ok(Err(e)) => {
                debug!(ip, error = %e, "ASN enrichment failed; continuing without ASN");
                location
            }
            Err(_) => {
                warn!(ip, timeout_ms = self.config.lookup_timeout_ms,
                      "ASN enrichment timed out; continuing without ASN");
                location
            }
        }
    }

    /// Reputation-backed VPN check for one ASN. Not part of `verify`.
    pub async fn deep_vpn_check(&self, asn: &str) -> Result<bool, ReputationError> {
        let reputation = self.reputation.as_ref().ok_or_else(|| ReputationError::LookupFailed {
            asn:    asn.to_string(),
            reason: "no reputation provider configured".into(),
        })?;
        match timeout(
            self.config.lookup_timeout(),
            vpn::deep_check(asn, &self.config, reputation.as_ref()),
        ).await {
            Ok(verdict) => verdict,
            Err(_) => Err(ReputationError::LookupFailed {
                asn:    asn.to_string(),
                reason: format!("timed out after {}ms", self.config.lookup_timeout_ms),
            }),
        }
    }
}
