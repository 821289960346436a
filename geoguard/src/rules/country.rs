// geoguard/src/rules/country.rs
//
// High-risk country: the location's country code is in the configured set
// → escalate to country_risk_level (MEDIUM unless policy says HIGH).

use serde_json::json;

use crate::events::{RuleFinding, RuleKind};
use crate::rules::RuleContext;

pub fn analyze(ctx: &RuleContext<'_>) -> Option<RuleFinding> {
    let current = ctx.current;
    if current.is_unknown() || !ctx.config.is_high_risk_country(&current.country_code) {
        return None;
    }
    let code = current.country_code.to_ascii_uppercase();
    let label = match current.country_name.as_deref() {
        Some(name) if !name.is_empty() => format!("{} ({})", name, code),
        _ => code.clone(),
    };
    let mut finding = RuleFinding::new(
        RuleKind::CountryRisk,
        ctx.config.country_risk_level,
        format!("Login from high-risk country: {}", label),
    );
    finding.meta.insert("high_risk_country".into(), json!(code));
    Some(finding)
}
