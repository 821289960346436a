// geoguard/src/rules/unknown_location.rs
//
// Entry guard. When the location cannot be determined there is nothing for
// the other rules to compare, so the verification short-circuits at MEDIUM
// with a single alert and the history is left untouched.

use crate::events::{GeoLocation, RiskLevel, RuleFinding, RuleKind};

pub fn analyze(location: Option<&GeoLocation>) -> Option<RuleFinding> {
    match location {
        Some(loc) if !loc.is_unknown() => None,
        _ => Some(RuleFinding::new(
            RuleKind::UnknownLocation,
            RiskLevel::Medium,
            "Unable to determine location for this login",
        )),
    }
}
