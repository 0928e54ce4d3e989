mod cli;
pub mod config;
pub mod db;
pub mod delivery;
pub mod errors;
pub mod export;
pub mod models;
pub mod stats;
pub mod tracker;
pub mod traffic;

use crate::config::{TrackerSettings, DATABASE_FILE, DATA_DIR_ENV, SETTINGS_FILE};
use crate::db::RecordStore;
use crate::errors::AppResult;
use crate::tracker::AnalyticsTracker;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;

pub use cli::run;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub struct SiteProfile {
    pub data_dir: PathBuf,
    pub settings_path: PathBuf,
    pub settings: TrackerSettings,
    pub tracker: AnalyticsTracker,
}

impl SiteProfile {
    pub fn open(data_dir: &Path, settings_path: Option<&Path>) -> AppResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let settings_path = settings_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_dir.join(SETTINGS_FILE));
        let settings = config::load_settings(&settings_path)?;
        let store = RecordStore::open(&data_dir.join(DATABASE_FILE), settings.max_value_bytes)?;
        let tracker = AnalyticsTracker::from_settings(store, &settings);

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            settings_path,
            settings,
            tracker,
        })
    }
}

pub fn default_data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".site-analytics"))
}

pub fn init_tracing(data_dir: &Path) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "site-analytics.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
