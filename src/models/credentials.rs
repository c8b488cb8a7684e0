use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const PAIRING_CODE: &str = "TUNZYMD1";
pub const APP_NAME: &str = "TUNZYMD1 Bot";
pub const PLATFORM: &str = "WhatsApp MD";
pub const RECORD_VERSION: &str = "2.0.1";
pub const FEATURES: [&str; 3] = ["multi-device", "encrypted", "cloud-sync"];
pub const MIN_NUMBER_LEN: usize = 10;

/// Lifetime stamped into every generated record
pub fn record_validity() -> Duration {
    Duration::days(7)
}

/// Body of POST /api/pair
#[derive(Debug, Clone, Deserialize)]
pub struct PairRequest {
    #[serde(default)]
    pub number: Option<String>,
}

impl PairRequest {
    /// Returns the number when it is present and long enough
    pub fn validated_number(&self) -> Option<&str> {
        self.number
            .as_deref()
            .filter(|n| n.chars().count() >= MIN_NUMBER_LEN)
    }
}

/// Synthetic session credentials written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRecord {
    pub user_number: String,
    pub pairing_code: String,
    pub session_id: String,
    pub app_name: String,
    pub platform: String,
    pub version: String,
    #[serde(with = "iso_millis")]
    pub generated_at: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub expires_at: DateTime<Utc>,
    pub status: String,
    pub features: Vec<String>,
}

impl CredentialsRecord {
    pub fn new(number: &str, session_id: String, generated_at: DateTime<Utc>) -> Self {
        Self {
            user_number: number.to_string(),
            pairing_code: PAIRING_CODE.to_string(),
            session_id,
            app_name: APP_NAME.to_string(),
            platform: PLATFORM.to_string(),
            version: RECORD_VERSION.to_string(),
            generated_at,
            expires_at: generated_at + record_validity(),
            status: "active".to_string(),
            features: FEATURES.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// `TUNZYMD_<unix millis>_<6 random chars>`, uppercased
pub fn generate_session_id(now: DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("TUNZYMD_{}_{}", now.timestamp_millis(), &random[..6]).to_uppercase()
}

/// Truncate to whole milliseconds so the value survives a round trip
/// through its serialized form unchanged
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Response for a successful pairing
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResponse {
    pub success: bool,
    pub message: String,
    pub user_message: String,
    pub download_link: String,
    pub session_id: String,
    pub pairing_code: String,
    pub data: CredentialsRecord,
    pub video_link: String,
}

/// ISO-8601 UTC timestamps with millisecond precision, e.g. `2024-01-01T00:00:00.000Z`
pub mod iso_millis {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
