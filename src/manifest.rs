//! Tolerant decoding of the semi-trusted per-run manifest.
//!
//! Manifests are written by submitters and have drifted across the
//! pipeline's history: fields go missing, numbers arrive as strings,
//! author keys exist under legacy names. Decoding never rejects a record
//! for bad-quality fields; a field that cannot be understood becomes
//! absent and the normalizer picks the documented default. Only a
//! document that is not JSON at all is unreadable.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::model::Metrics;

fn lenient_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

fn lenient_u32<'de, D>(d: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| match v {
        Value::Number(n) => n
            .as_i64()
            .and_then(|i| u32::try_from(i).ok())
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u32)),
        Value::String(s) => s.trim().parse::<i64>().ok().and_then(|i| u32::try_from(i).ok()),
        _ => None,
    }))
}

fn lenient_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
    .filter(|f| f.is_finite()))
}

fn lenient_bool<'de, D>(d: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Bool(b)) => Some(b),
        _ => None,
    })
}

/// Decode a sub-object, degrading to `None` when its shape is wrong
/// instead of failing the whole manifest.
fn lenient_object<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_sockets<'de, D>(d: D) -> Result<Option<Vec<RawSocket>>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                // a malformed element degrades to an empty socket, keeping
                // its position (slot 0 drives the CPU label)
                .map(|item| serde_json::from_value(item).unwrap_or_default())
                .collect(),
        ),
        _ => None,
    })
}

/// Author sub-object with every name the field has carried over time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAuthor {
    #[serde(deserialize_with = "lenient_string")]
    pub display_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(
        rename = "alternateName",
        alias = "alternate_name",
        deserialize_with = "lenient_string"
    )]
    pub alternate_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub handle: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub orcid: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub affiliation_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub affiliation_ror: Option<String>,
}

/// One processor-socket descriptor as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSocket {
    #[serde(deserialize_with = "lenient_string")]
    pub slot: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub vendor: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub model: Option<String>,
    #[serde(deserialize_with = "lenient_u32")]
    pub cores: Option<u32>,
    #[serde(deserialize_with = "lenient_u32")]
    pub threads: Option<u32>,
    #[serde(deserialize_with = "lenient_string")]
    pub architecture: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawMetrics {
    #[serde(deserialize_with = "lenient_f64")]
    pub avg_power_w: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub peak_power_w: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub energy_wh: Option<f64>,
}

impl RawMetrics {
    pub fn to_metrics(&self) -> Metrics {
        Metrics {
            avg_power_w: self.avg_power_w,
            peak_power_w: self.peak_power_w,
            energy_wh: self.energy_wh,
        }
    }
}

/// The per-run manifest, as found under `submission/<user>/<run_id>/`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawManifest {
    #[serde(deserialize_with = "lenient_string")]
    pub run_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub node: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub created: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub username: Option<String>,
    #[serde(deserialize_with = "lenient_object")]
    pub author: Option<RawAuthor>,
    #[serde(deserialize_with = "lenient_sockets")]
    pub processor: Option<Vec<RawSocket>>,
    #[serde(deserialize_with = "lenient_bool")]
    pub threading_enabled: Option<bool>,
    #[serde(deserialize_with = "lenient_object")]
    pub metrics: Option<RawMetrics>,
    #[serde(deserialize_with = "lenient_string")]
    pub zenodo_html: Option<String>,
}

impl RawManifest {
    /// Parse a manifest document. This is the only place a run can become
    /// unreadable; everything past it degrades per-field.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Parse the optional supplementary metrics document found at
/// `energy/metrics.json`. Accepts both the wrapped form
/// `{"metrics": {...}}` and the bare metrics object. Returns `None` when
/// the document is not usable, in which case the caller falls back to the
/// manifest's embedded metrics.
pub fn parse_supplementary_metrics(bytes: &[u8]) -> Option<Metrics> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let inner = match &value {
        Value::Object(map) if map.get("metrics").map_or(false, Value::is_object) => {
            map.get("metrics").cloned()?
        }
        Value::Object(_) => value,
        _ => return None,
    };
    serde_json::from_value::<RawMetrics>(inner)
        .ok()
        .map(|m| m.to_metrics())
}
