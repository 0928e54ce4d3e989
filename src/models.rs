use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Pt,
    En,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pt => "pt",
            Self::En => "en",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pt" => Ok(Self::Pt),
            "en" => Ok(Self::En),
            other => Err(format!("unsupported language '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DailyStats {
    pub visits: u64,
    pub messages: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRecord {
    #[serde(default)]
    pub visits: u64,
    #[serde(default)]
    pub messages: u64,
    #[serde(default)]
    pub unique_visitors: u64,
    pub last_visit: DateTime<Utc>,
    #[serde(default)]
    pub page_views: BTreeMap<String, u64>,
    #[serde(default)]
    pub traffic_sources: BTreeMap<String, u64>,
    #[serde(default)]
    pub daily_stats: BTreeMap<String, DailyStats>,
}

impl AggregateRecord {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            visits: 0,
            messages: 0,
            unique_visitors: 0,
            last_visit: now,
            page_views: BTreeMap::new(),
            traffic_sources: BTreeMap::new(),
            daily_stats: BTreeMap::new(),
        }
    }

    pub fn day_mut(&mut self, day: &str) -> &mut DailyStats {
        self.daily_stats.entry(day.to_string()).or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    New,
    Read,
    Replied,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Read => "read",
            Self::Replied => "replied",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "read" => Ok(Self::Read),
            "replied" => Ok(Self::Replied),
            other => Err(format!("unknown message status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub id: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub date: DateTime<Utc>,
    pub status: MessageStatus,
    #[serde(default)]
    pub client_meta: ClientMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStat {
    pub page: String,
    pub views: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStat {
    pub source: String,
    pub visitors: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedStats {
    pub total_visits: u64,
    pub total_messages: u64,
    pub total_unique_visitors: u64,
    pub today_visits: u64,
    pub today_messages: u64,
    pub this_month_messages: u64,
    pub conversion_rate: f64,
    pub avg_session_time: String,
    pub bounce_rate: u64,
    pub top_pages: Vec<PageStat>,
    pub top_sources: Vec<SourceStat>,
}

impl Default for CalculatedStats {
    fn default() -> Self {
        Self {
            total_visits: 0,
            total_messages: 0,
            total_unique_visitors: 0,
            today_visits: 0,
            today_messages: 0,
            this_month_messages: 0,
            conversion_rate: 0.0,
            avg_session_time: "0m 0s".to_string(),
            bounce_rate: 0,
            top_pages: Vec::new(),
            top_sources: Vec::new(),
        }
    }
}
