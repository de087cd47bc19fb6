//! Geolocation services and their response mappings
//!
//! Each service answers with its own JSON shape; every parser normalizes to
//! [`GeoLookup`] or returns `None` when the body is unusable or reports failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeoProvider {
    /// ip-api.com (HTTP only on the free tier)
    #[serde(rename = "ip-api")]
    IpApi,
    /// ipapi.co
    #[serde(rename = "ipapi-co")]
    IpapiCo,
    /// ipwho.is
    #[serde(rename = "ipwho-is")]
    IpWhoIs,
}

/// Normalized egress location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLookup {
    pub ip: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country_code: Option<String>,
    pub country: Option<String>,
    pub isp: Option<String>,
}

impl GeoProvider {
    pub fn name(self) -> &'static str {
        match self {
            GeoProvider::IpApi => "ip-api",
            GeoProvider::IpapiCo => "ipapi-co",
            GeoProvider::IpWhoIs => "ipwho-is",
        }
    }

    pub fn url(self) -> &'static str {
        match self {
            GeoProvider::IpApi => "http://ip-api.com/json",
            GeoProvider::IpapiCo => "https://ipapi.co/json/",
            GeoProvider::IpWhoIs => "https://ipwho.is/",
        }
    }

    pub fn parse(self, body: &[u8]) -> Option<GeoLookup> {
        let json: Value = serde_json::from_slice(body).ok()?;
        let obj = json.as_object()?;

        match self {
            GeoProvider::IpApi => {
                if obj.get("status").and_then(Value::as_str) != Some("success") {
                    return None;
                }
                Some(GeoLookup {
                    ip: text(obj, "query")?,
                    city: text(obj, "city"),
                    region: text(obj, "regionName"),
                    country_code: text(obj, "countryCode"),
                    country: text(obj, "country"),
                    isp: text(obj, "isp"),
                })
            }
            GeoProvider::IpapiCo => {
                if obj.get("error").and_then(Value::as_bool) == Some(true) {
                    return None;
                }
                Some(GeoLookup {
                    ip: text(obj, "ip")?,
                    city: text(obj, "city"),
                    region: text(obj, "region"),
                    country_code: text(obj, "country_code"),
                    country: text(obj, "country_name"),
                    isp: text(obj, "org"),
                })
            }
            GeoProvider::IpWhoIs => {
                if obj.get("success").and_then(Value::as_bool) == Some(false) {
                    return None;
                }
                let isp = obj
                    .get("connection")
                    .and_then(Value::as_object)
                    .and_then(|conn| text(conn, "isp"));
                Some(GeoLookup {
                    ip: text(obj, "ip")?,
                    city: text(obj, "city"),
                    region: text(obj, "region"),
                    country_code: text(obj, "country_code"),
                    country: text(obj, "country"),
                    isp,
                })
            }
        }
    }
}

fn text(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
