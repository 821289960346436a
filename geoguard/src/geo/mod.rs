pub mod distance;
pub mod provider;
pub mod reputation;

pub use provider::{AsnLookup, GeoLocationProvider, StaticGeoProvider};
pub use reputation::{AsnReputationProvider, InMemoryReputation};
