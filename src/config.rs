use crate::errors::AppResult;
use crate::models::Language;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DATA_DIR_ENV: &str = "SITE_ANALYTICS_DATA_DIR";
pub const SETTINGS_FILE: &str = "settings.json";
pub const DATABASE_FILE: &str = "site-analytics.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageKeys {
    pub analytics: String,
    pub messages: String,
    pub visitor: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            analytics: "site_analytics".to_string(),
            messages: "site_messages".to_string(),
            visitor: "site_visitor_id".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    pub recipient_email: String,
    pub relay_base: String,
    pub subject_prefix: String,
    pub activation_sender: String,
    pub timeout_ms: u64,
}

impl RelaySettings {
    pub fn endpoint(&self) -> String {
        format!("{}/ajax/{}", self.relay_base.trim_end_matches('/'), self.recipient_email)
    }

    pub fn activation_endpoint(&self) -> String {
        format!("{}/{}", self.relay_base.trim_end_matches('/'), self.recipient_email)
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            recipient_email: "kukuladevz.team@gmail.com".to_string(),
            relay_base: "https://formsubmit.co".to_string(),
            subject_prefix: "[Ku_KulaDevz]".to_string(),
            activation_sender: "sistema@kukuladevz.com".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerSettings {
    pub keys: StorageKeys,
    pub max_value_bytes: usize,
    pub language: Language,
    pub relay: RelaySettings,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            keys: StorageKeys::default(),
            max_value_bytes: 5 * 1024 * 1024,
            language: Language::Pt,
            relay: RelaySettings::default(),
        }
    }
}

// Missing or malformed files fall back to defaults.
pub fn load_settings(path: &Path) -> AppResult<TrackerSettings> {
    if !path.exists() {
        return Ok(TrackerSettings::default());
    }
    let raw = fs::read_to_string(path)?;
    match serde_json::from_str::<TrackerSettings>(&raw) {
        Ok(settings) => Ok(settings),
        Err(error) => {
            tracing::warn!(path = %path.to_string_lossy(), error = %error, "malformed settings file; using defaults");
            Ok(TrackerSettings::default())
        }
    }
}

pub fn save_settings(path: &Path, settings: &TrackerSettings) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}

pub fn merge_settings(current: &TrackerSettings, update: serde_json::Value) -> AppResult<TrackerSettings> {
    let mut merged = serde_json::to_value(current)?;
    merge_json(&mut merged, update);
    Ok(serde_json::from_value(merged)?)
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target, value) => *target = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(&dir.path().join(SETTINGS_FILE)).expect("load");
        assert_eq!(settings, TrackerSettings::default());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "{not json").expect("write");
        let settings = load_settings(&path).expect("load");
        assert_eq!(settings, TrackerSettings::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, r#"{"language":"en","keys":{"messages":"inbox"}}"#).expect("write");
        let settings = load_settings(&path).expect("load");
        assert_eq!(settings.language, Language::En);
        assert_eq!(settings.keys.messages, "inbox");
        assert_eq!(settings.keys.analytics, "site_analytics");
        assert_eq!(settings.max_value_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn merge_updates_nested_fields_only() {
        let merged = merge_settings(
            &TrackerSettings::default(),
            json!({ "relay": { "timeoutMs": 500 }, "maxValueBytes": 64 }),
        )
        .expect("merge");
        assert_eq!(merged.relay.timeout_ms, 500);
        assert_eq!(merged.relay.relay_base, "https://formsubmit.co");
        assert_eq!(merged.max_value_bytes, 64);
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let mut settings = TrackerSettings::default();
        settings.language = Language::En;
        save_settings(&path, &settings).expect("save");
        assert_eq!(load_settings(&path).expect("load"), settings);
    }

    #[test]
    fn relay_endpoints_use_recipient() {
        let relay = RelaySettings {
            relay_base: "https://relay.test/".to_string(),
            recipient_email: "team@x.com".to_string(),
            ..RelaySettings::default()
        };
        assert_eq!(relay.endpoint(), "https://relay.test/ajax/team@x.com");
        assert_eq!(relay.activation_endpoint(), "https://relay.test/team@x.com");
    }
}
