// geoguard/src/rules/vpn.rs
//
// VPN / hosting-network risk.
//
// Default path: the location's ASN is in the configured known-VPN set
//   → escalate to vpn_risk_level (MEDIUM unless policy says HIGH).
//
// Deep check (standalone, not run by run_all): records the VPN / non-VPN
// observation with the reputation collaborator, then
//   verdict = known_vpn || reputation_score < vpn_reputation_threshold

use serde_json::json;

use crate::config::{normalize_asn, EngineConfig};
use crate::error::ReputationError;
use crate::events::{RuleFinding, RuleKind};
use crate::geo::reputation::{parse_asn, AsnReputationProvider};
use crate::rules::RuleContext;

pub fn analyze(ctx: &RuleContext<'_>) -> Option<RuleFinding> {
    let asn = ctx.current.asn.as_deref()?;
    if !ctx.config.is_known_vpn_asn(asn) {
        return None;
    }
    let asn = normalize_asn(asn);
    let mut finding = RuleFinding::new(
        RuleKind::VpnRisk,
        ctx.config.vpn_risk_level,
        format!("Login from known VPN or hosting network ({})", asn),
    );
    finding.meta.insert("vpn_asn".into(), json!(asn));
    Some(finding)
}

pub async fn deep_check(
    asn: &str,
    config: &EngineConfig,
    reputation: &dyn AsnReputationProvider,
) -> Result<bool, ReputationError> {
    let asn = parse_asn(asn)?;
    let is_vpn = config.is_known_vpn_asn(&asn);
    reputation.record_activity(&asn, is_vpn).await?;
    let score = reputation.reputation_score(&asn).await?;
    Ok(is_vpn || score < config.vpn_reputation_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{GeoLocation, RiskLevel, VerificationResult};
    use crate::geo::reputation::InMemoryReputation;
    use crate::state::history::LocationHistory;
    use chrono::Utc;

    fn config() -> EngineConfig {
        EngineConfig::from_json(r#"{ "known_vpn_asns": ["AS1234"] }"#).unwrap()
    }

    fn run(current: &GeoLocation, cfg: &EngineConfig) -> Option<RuleFinding> {
        let history = LocationHistory::new("u1", 10);
        analyze(&RuleContext { user_id: "u1", current, history: &history, now: Utc::now(), config: cfg })
    }

    #[test]
    fn known_vpn_asn_escalates_to_medium() {
        let cfg = config();
        let f = run(&GeoLocation::new("NL").with_asn("AS1234"), &cfg).unwrap();
        assert_eq!(f.level, RiskLevel::Medium);
        assert!(f.alert.contains("AS1234"));
    }

    #[test]
    fn asn_matching_is_normalised() {
        let cfg = config();
        assert!(run(&GeoLocation::new("NL").with_asn("1234"), &cfg).is_some());
    }

    #[test]
    fn missing_or_unlisted_asn_is_silent() {
        let cfg = config();
        assert!(run(&GeoLocation::new("NL"), &cfg).is_none());
        assert!(run(&GeoLocation::new("NL").with_asn("AS9999"), &cfg).is_none());
    }

    #[test]
    fn never_downgrades_existing_high() {
        let cfg = config();
        let mut result = VerificationResult::new();
        result.escalate(RiskLevel::High);
        result.apply(&run(&GeoLocation::new("NL").with_asn("AS1234"), &cfg).unwrap());
        assert_eq!(result.risk_level(), RiskLevel::High);
        assert_eq!(result.alerts().len(), 1);
    }

    #[test]
    fn policy_can_raise_to_high() {
        let cfg = EngineConfig::from_json(
            r#"{ "known_vpn_asns": ["AS1234"], "vpn_risk_level": "HIGH" }"#,
        ).unwrap();
        assert_eq!(run(&GeoLocation::new("NL").with_asn("AS1234"), &cfg).unwrap().level, RiskLevel::High);
    }

    #[tokio::test]
    async fn deep_check_known_vpn() {
        let cfg = config();
        let rep = InMemoryReputation::new();
        assert!(deep_check("AS1234", &cfg, &rep).await.unwrap());
        assert_eq!(rep.entry("AS1234").unwrap().vpn_hits, 1);
    }

    #[tokio::test]
    async fn deep_check_low_reputation() {
        let cfg = config();
        let rep = InMemoryReputation::new();
        for _ in 0..10 {
            rep.record_activity("AS4321", true).await.unwrap();
        }
        // One more clean observation is recorded by the check itself.
        assert!(deep_check("AS4321", &cfg, &rep).await.unwrap());
    }

    #[tokio::test]
    async fn deep_check_clean_asn() {
        let cfg = config();
        let rep = InMemoryReputation::new();
        assert!(!deep_check("AS4321", &cfg, &rep).await.unwrap());
    }

    #[tokio::test]
    async fn deep_check_malformed() {
        let cfg = config();
        let rep = InMemoryReputation::new();
        assert!(matches!(deep_check("bogus", &cfg, &rep).await, Err(ReputationError::Malformed(_))));
    }
}
