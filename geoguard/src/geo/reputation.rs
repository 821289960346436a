// geoguard/src/geo/reputation.rs
//
// ASN reputation — optional deep-check collaborator for the VPN rule.
//
// InMemoryReputation keeps per-ASN VPN / non-VPN observation counts and
// derives a Laplace-smoothed score:
//
//   score = (clean + 1) / (total + 2)       ∈ (0, 1), 0.5 for an unseen ASN
//
// High = trustworthy, low = mostly seen as VPN traffic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::normalize_asn;
use crate::error::ReputationError;

#[async_trait]
pub trait AsnReputationProvider: Send + Sync {
    async fn record_activity(&self, asn: &str, was_vpn: bool) -> Result<(), ReputationError>;
    async fn reputation_score(&self, asn: &str) -> Result<f64, ReputationError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsnReputationEntry {
    pub asn:          String,
    pub score:        f64,
    pub vpn_hits:     u64,
    pub total:        u64,
    pub last_updated: DateTime<Utc>,
}

impl AsnReputationEntry {
    fn new(asn: String, now: DateTime<Utc>) -> Self {
        Self { asn, score: 0.5, vpn_hits: 0, total: 0, last_updated: now }
    }

    fn observe(&mut self, was_vpn: bool, now: DateTime<Utc>) {
        self.total += 1;
        if was_vpn { self.vpn_hits += 1; }
        let clean = self.total - self.vpn_hits;
        self.score = (clean as f64 + 1.0) / (self.total as f64 + 2.0);
        self.last_updated = now;
    }
}

/// Validate and canonicalise an ASN string ("AS<digits>" or "<digits>").
pub fn parse_asn(asn: &str) -> Result<String, ReputationError> {
    let norm = normalize_asn(asn);
    let digits = norm.strip_prefix("AS").unwrap_or("");
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ReputationError::Malformed(asn.to_string()));
    }
    Ok(norm)
}

#[derive(Debug, Default)]
pub struct InMemoryReputation {
    entries: DashMap<String, AsnReputationEntry>,
}

impl InMemoryReputation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, asn: &str) -> Option<AsnReputationEntry> {
        let key = parse_asn(asn).ok()?;
        self.entries.get(&key).map(|e| e.clone())
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[async_trait]
impl AsnReputationProvider for InMemoryReputation {
    async fn record_activity(&self, asn: &str, was_vpn: bool) -> Result<(), ReputationError> {
        let key = parse_asn(asn)?;
        let now = Utc::now();
        self.entries
            .entry(key.clone())
            .or_insert_with(|| AsnReputationEntry::new(key, now))
            .observe(was_vpn, now);
        Ok(())
    }

    async fn reputation_score(&self, asn: &str) -> Result<f64, ReputationError> {
        let key = parse_asn(asn)?;
        Ok(self.entries.get(&key).map(|e| e.score).unwrap_or(0.5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseen_asn_is_neutral() {
        let rep = InMemoryReputation::new();
        assert_eq!(rep.reputation_score("AS64500").await.unwrap(), 0.5);
    }

    #[tokio::test]
    async fn vpn_observations_lower_score() {
        let rep = InMemoryReputation::new();
        for _ in 0..8 {
            rep.record_activity("64500", true).await.unwrap();
        }
        let score = rep.reputation_score("AS64500").await.unwrap();
        assert!((score - 0.1).abs() < 1e-9, "got {}", score);
        let entry = rep.entry("as64500").unwrap();
        assert_eq!(entry.vpn_hits, 8);
        assert_eq!(entry.total, 8);
    }

    #[tokio::test]
    async fn clean_observations_raise_score() {
        let rep = InMemoryReputation::new();
        rep.record_activity("AS64501", false).await.unwrap();
        rep.record_activity("AS64501", false).await.unwrap();
        assert!(rep.reputation_score("AS64501").await.unwrap() > 0.7);
    }

    #[tokio::test]
    async fn malformed_asn_rejected() {
        let rep = InMemoryReputation::new();
        assert!(matches!(rep.reputation_score("ASX1").await, Err(ReputationError::Malformed(_))));
        assert!(matches!(rep.record_activity("", true).await, Err(ReputationError::Malformed(_))));
        assert!(rep.is_empty());
    }
}
