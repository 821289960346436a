// geoguard/src/geo/provider.rs
//
// Lookup collaborators consumed by the engine, plus a table-backed
// implementation of both.
//
// Contract for GeoLocationProvider::lookup:
//   valid IP, no data    → Ok(GeoLocation::unknown())
//   malformed IP         → Err(LookupError::InvalidAddress)   (engine: unknown)
//   subsystem broken     → Err(LookupError::Unavailable)      (engine: HIGH)
//
// StaticGeoProvider table format (JSON):
//   {
//     "locations": { "203.0.113.7": { "country_code": "JP", "city": "Tokyo",
//                                     "coordinates": { "latitude": 35.68, "longitude": 139.69 } } },
//     "asns":      { "203.0.113.7": "AS2516" }
//   }

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::normalize_asn;
use crate::error::{ConfigError, LookupError};
use crate::events::GeoLocation;

#[async_trait]
pub trait GeoLocationProvider: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<GeoLocation, LookupError>;
}

/// Supplementary ASN source used to enrich locations that came back without one.
#[async_trait]
pub trait AsnLookup: Send + Sync {
    async fn lookup_asn(&self, ip: &str) -> Result<String, LookupError>;
}

/// Parse an address, rejecting anything that isn't a literal IPv4/IPv6.
pub fn parse_ip(ip: &str) -> Result<IpAddr, LookupError> {
    ip.trim().parse::<IpAddr>().map_err(|_| LookupError::InvalidAddress(ip.to_string()))
}

/// Addresses no geolocation database can place.
fn is_unroutable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_unspecified()
            || v4.is_link_local() || v4.is_broadcast(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ── Table-backed provider ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoTable {
    #[serde(default)]
    pub locations: HashMap<IpAddr, GeoLocation>,
    #[serde(default)]
    pub asns: HashMap<IpAddr, String>,
}

#[derive(Debug, Clone, Default)]
pub struct StaticGeoProvider {
    table: GeoTable,
}

impl StaticGeoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: GeoTable) -> Self {
        Self { table }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let table: GeoTable = serde_json::from_str(&content)?;
        debug!(locations = table.locations.len(), asns = table.asns.len(),
               "Loaded geo table from {}", path.display());
        Ok(Self { table })
    }

    pub fn insert(&mut self, ip: IpAddr, location: GeoLocation) {
        self.table.locations.insert(ip, location);
    }

    pub fn insert_asn(&mut self, ip: IpAddr, asn: &str) {
        self.table.asns.insert(ip, normalize_asn(asn));
    }

    pub fn with_location(mut self, ip: &str, location: GeoLocation) -> Self {
        if let Ok(addr) = parse_ip(ip) {
            self.insert(addr, location);
        }
        self
    }

    pub fn with_asn(mut self, ip: &str, asn: &str) -> Self {
        if let Ok(addr) = parse_ip(ip) {
            self.insert_asn(addr, asn);
        }
        self
    }

    pub fn len(&self) -> usize { self.table.locations.len() }
    pub fn is_empty(&self) -> bool { self.table.locations.is_empty() }
}

#[async_trait]
impl GeoLocationProvider for StaticGeoProvider {
    async fn lookup(&self, ip: &str) -> Result<GeoLocation, LookupError> {
        let addr = parse_ip(ip)?;
        if is_unroutable(&addr) {
            return Ok(GeoLocation::unknown());
        }
        Ok(self.table.locations.get(&addr).cloned().unwrap_or_else(GeoLocation::unknown))
    }
}

#[async_trait]
impl AsnLookup for StaticGeoProvider {
    async fn lookup_asn(&self, ip: &str) -> Result<String, LookupError> {
        let addr = parse_ip(ip)?;
        self.table.asns.get(&addr)
            .map(|a| normalize_asn(a))
            .ok_or_else(|| LookupError::NotFound(ip.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> StaticGeoProvider {
        StaticGeoProvider::new()
            .with_location("203.0.113.7", GeoLocation::new("JP").with_city("Tokyo")
                .with_coordinates(35.68, 139.69))
            .with_asn("203.0.113.7", "2516")
    }

    #[tokio::test]
    async fn known_ip_resolves() {
        let loc = provider().lookup("203.0.113.7").await.unwrap();
        assert_eq!(loc.country_code, "JP");
        assert_eq!(loc.city_label(), "Tokyo");
    }

    #[tokio::test]
    async fn unknown_ip_is_unknown_not_error() {
        let loc = provider().lookup("198.51.100.1").await.unwrap();
        assert!(loc.is_unknown());
    }

    #[tokio::test]
    async fn private_ip_is_unknown() {
        assert!(provider().lookup("10.0.0.5").await.unwrap().is_unknown());
        assert!(provider().lookup("::1").await.unwrap().is_unknown());
    }

    #[tokio::test]
    async fn malformed_ip_is_invalid_address() {
        let err = provider().lookup("not-an-ip").await.unwrap_err();
        assert!(matches!(err, LookupError::InvalidAddress(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn asn_lookup_normalises_and_reports_missing() {
        let p = provider();
        assert_eq!(p.lookup_asn("203.0.113.7").await.unwrap(), "AS2516");
        assert!(matches!(p.lookup_asn("198.51.100.1").await, Err(LookupError::NotFound(_))));
    }

    #[test]
    fn table_parses_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geo.json");
        std::fs::write(&path, r#"{
            "locations": { "192.0.2.1": { "country_code": "US", "city": "New York",
                           "coordinates": { "latitude": 40.71, "longitude": -74.0 } } },
            "asns": { "192.0.2.1": "AS7922" }
        }"#).unwrap();
        let p = StaticGeoProvider::from_file(&path).unwrap();
        assert_eq!(p.len(), 1);
    }
}
