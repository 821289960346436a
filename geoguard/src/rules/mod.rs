pub mod country;
pub mod impossible_travel;
pub mod unknown_location;
pub mod vpn;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::events::{GeoLocation, RuleFinding};
use crate::state::history::LocationHistory;

/// Everything a rule may look at for one verification.
pub struct RuleContext<'a> {
    pub user_id:  &'a str,
    pub current:  &'a GeoLocation,
    pub history:  &'a LocationHistory,
    pub now:      DateTime<Utc>,
    pub config:   &'a EngineConfig,
}

/// Run the location rules in their fixed order and collect findings.
/// Order only affects alert order; escalation is max(), so the final level
/// is the same for any permutation. Rules returning None are dropped.
pub fn run_all(ctx: &RuleContext<'_>) -> Vec<RuleFinding> {
    [
        impossible_travel::analyze(ctx),
        vpn::analyze(ctx),
        country::analyze(ctx),
    ]
    .into_iter()
    .flatten()
    .collect()
}
