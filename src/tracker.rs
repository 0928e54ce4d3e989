use crate::config::{StorageKeys, TrackerSettings};
use crate::db::{RecordStore, StoreRead};
use crate::models::{AggregateRecord, CalculatedStats, ClientMeta, ContactMessage, Language, MessageStatus, NewMessage};
use crate::stats::{compute_stats, day_key};
use crate::traffic::{detect_source, page_path};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashSet;

const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Visit counters and contact messages for one device profile.
///
/// The aggregate record and the message list live under separate keys and are
/// written independently. A failure between the two writes of
/// [`AnalyticsTracker::record_message`] leaves them out of step; nothing here
/// tries to repair that.
pub struct AnalyticsTracker {
    store: RecordStore,
    keys: StorageKeys,
    language: Language,
}

impl AnalyticsTracker {
    pub fn new(store: RecordStore, keys: StorageKeys, language: Language) -> Self {
        Self { store, keys, language }
    }

    pub fn from_settings(store: RecordStore, settings: &TrackerSettings) -> Self {
        Self::new(store, settings.keys.clone(), settings.language)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    pub fn aggregate(&self) -> StoreRead<AggregateRecord> {
        self.store.read::<AggregateRecord>(&self.keys.analytics)
    }

    // `None` only when storage itself failed.
    pub fn load_or_init(&self, now: DateTime<Utc>) -> Option<AggregateRecord> {
        match self.aggregate() {
            StoreRead::Found(record) => Some(record),
            StoreRead::NotFound => {
                let record = AggregateRecord::empty(now);
                self.persist_aggregate(&record);
                Some(record)
            }
            StoreRead::StorageError(_) => None,
        }
    }

    pub fn record_visit(&self, page: &str, source: &str) {
        self.record_visit_at(page, source, Utc::now());
    }

    pub fn record_visit_at(&self, page: &str, source: &str, now: DateTime<Utc>) {
        let Some(mut record) = self.load_or_init(now) else {
            tracing::warn!(page, source, "storage unavailable; visit not recorded");
            return;
        };

        record.visits += 1;
        record.last_visit = now;
        *record.page_views.entry(page.to_string()).or_insert(0) += 1;
        *record.traffic_sources.entry(source.to_string()).or_insert(0) += 1;
        record.day_mut(&day_key(now)).visits += 1;

        if self.claim_first_visit(now) {
            record.unique_visitors += 1;
        }

        self.persist_aggregate(&record);
        tracing::debug!(page, source, visits = record.visits, "visit recorded");
    }

    pub fn track_page_load(&self, location: &str, referrer: Option<&str>) -> String {
        let source = detect_source(location, referrer);
        self.record_visit(&page_path(location), &source);
        source
    }

    // Sentinel marks this profile as seen. Approximate: clearing storage or
    // switching devices counts the same person again.
    fn claim_first_visit(&self, now: DateTime<Utc>) -> bool {
        match self.store.read_raw(&self.keys.visitor) {
            StoreRead::Found(_) | StoreRead::StorageError(_) => false,
            StoreRead::NotFound => {
                match self
                    .store
                    .write_raw(&self.keys.visitor, &now.timestamp_millis().to_string())
                {
                    Ok(()) => true,
                    Err(error) => {
                        tracing::warn!(error = %error, "failed to store visitor sentinel");
                        false
                    }
                }
            }
        }
    }

    pub fn record_message(&self, submission: NewMessage, client_meta: ClientMeta) -> String {
        self.record_message_at(submission, client_meta, Utc::now())
    }

    pub fn record_message_at(&self, submission: NewMessage, client_meta: ClientMeta, now: DateTime<Utc>) -> String {
        let loaded = self.load_messages();
        let list_readable = loaded.is_some();
        let mut messages = loaded.unwrap_or_default();
        let taken: HashSet<&str> = messages.iter().map(|message| message.id.as_str()).collect();
        let mut id = generate_message_id(now);
        while taken.contains(id.as_str()) {
            id = generate_message_id(now);
        }

        let message = ContactMessage {
            id: id.clone(),
            name: submission.name,
            email: submission.email,
            subject: submission.subject,
            message: submission.message,
            date: now,
            status: MessageStatus::New,
            client_meta,
        };
        messages.insert(0, message);
        if list_readable {
            self.persist_messages(&messages);
        } else {
            tracing::warn!(message_id = %id, "storage unavailable; message not stored");
        }

        if let Some(mut record) = self.load_or_init(now) {
            record.messages += 1;
            record.day_mut(&day_key(now)).messages += 1;
            self.persist_aggregate(&record);
            tracing::info!(message_id = %id, total = record.messages, "contact message recorded");
        }
        id
    }

    pub fn messages(&self) -> Vec<ContactMessage> {
        self.load_messages().unwrap_or_default()
    }

    // Undecodable lists read as empty; `None` only when storage failed, so
    // callers never write an empty list over one they could not read.
    fn load_messages(&self) -> Option<Vec<ContactMessage>> {
        match self.store.read::<Vec<ContactMessage>>(&self.keys.messages) {
            StoreRead::Found(messages) => Some(messages),
            StoreRead::NotFound => Some(Vec::new()),
            StoreRead::StorageError(_) => None,
        }
    }

    pub fn set_message_status(&self, id: &str, status: MessageStatus) -> bool {
        let Some(mut messages) = self.load_messages() else {
            return false;
        };
        let Some(message) = messages.iter_mut().find(|message| message.id == id) else {
            tracing::debug!(message_id = id, "status update for unknown message ignored");
            return false;
        };
        message.status = status;
        self.persist_messages(&messages)
    }

    pub fn stats(&self) -> CalculatedStats {
        self.stats_in(self.language)
    }

    pub fn stats_in(&self, language: Language) -> CalculatedStats {
        self.stats_at(Utc::now(), language)
    }

    pub fn stats_at(&self, now: DateTime<Utc>, language: Language) -> CalculatedStats {
        let record = self.aggregate().into_option();
        compute_stats(record.as_ref(), now, language)
    }

    pub fn reset(&self) {
        for key in [&self.keys.analytics, &self.keys.messages, &self.keys.visitor] {
            if let Err(error) = self.store.remove(key) {
                tracing::warn!(key = %key, error = %error, "failed to clear stored key");
            }
        }
    }

    fn persist_aggregate(&self, record: &AggregateRecord) -> bool {
        match self.store.write(&self.keys.analytics, record) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(error = %error, "failed to save analytics");
                false
            }
        }
    }

    fn persist_messages(&self, messages: &[ContactMessage]) -> bool {
        match self.store.write(&self.keys.messages, &messages) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(error = %error, count = messages.len(), "failed to save messages");
                false
            }
        }
    }
}

fn generate_message_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{}", now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KeyValueBackend;
    use crate::errors::{AppError, AppResult};
    use chrono::{Duration, TimeZone};

    fn tracker_in(dir: &tempfile::TempDir) -> AnalyticsTracker {
        let store = RecordStore::open(&dir.path().join("test.db"), 1024 * 1024).expect("store");
        AnalyticsTracker::new(store, StorageKeys::default(), Language::Pt)
    }

    fn submission(name: &str) -> NewMessage {
        NewMessage {
            name: name.to_string(),
            email: format!("{}@x.com", name.to_ascii_lowercase()),
            subject: "Hello".to_string(),
            message: "Hi there".to_string(),
        }
    }

    fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, 12, 0, 0).single().expect("valid date")
    }

    #[test]
    fn visits_accumulate_per_page_and_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);

        for _ in 0..3 {
            tracker.record_visit("/", "direct");
        }
        tracker.record_visit("/about", "google");

        let record = tracker.aggregate().into_option().expect("record");
        assert_eq!(record.visits, 4);
        assert_eq!(record.page_views.get("/"), Some(&3));
        assert_eq!(record.page_views.get("/about"), Some(&1));
        assert_eq!(record.traffic_sources.get("direct"), Some(&3));
        assert_eq!(record.traffic_sources.get("google"), Some(&1));

        let stats = tracker.stats();
        assert_eq!(stats.top_pages[0].page, "/");
        assert_eq!(stats.top_pages[0].views, 3);
        assert_eq!(stats.top_pages[0].percentage, 75.0);
    }

    #[test]
    fn stats_language_can_differ_from_profile_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);
        tracker.record_visit("/", "direct");

        assert_eq!(tracker.stats().top_sources[0].source, "Direto");
        assert_eq!(tracker.stats_in(Language::En).top_sources[0].source, "Direct");
        assert_eq!(tracker.stats_at(noon(1), Language::En).total_visits, 1);
    }

    #[test]
    fn daily_rollups_sum_to_totals_across_days() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);

        let mut calls = 0;
        for day in [1, 1, 2, 5, 5, 5, 17] {
            tracker.record_visit_at("/", "direct", noon(day));
            calls += 1;
        }
        tracker.record_visit_at("/", "direct", noon(31) + Duration::hours(13));
        calls += 1;

        let record = tracker.aggregate().into_option().expect("record");
        assert_eq!(record.visits, calls);
        let daily: u64 = record.daily_stats.values().map(|stats| stats.visits).sum();
        assert_eq!(daily, record.visits);
        assert!(record.daily_stats.contains_key("2026-11-01"));
    }

    #[test]
    fn unique_visitor_counted_once_per_profile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);

        tracker.record_visit("/", "direct");
        tracker.record_visit("/team", "internal");
        let record = tracker.aggregate().into_option().expect("record");
        assert_eq!(record.unique_visitors, 1);

        tracker.reset();
        tracker.record_visit("/", "direct");
        let record = tracker.aggregate().into_option().expect("record");
        assert_eq!(record.unique_visitors, 1);
        assert_eq!(record.visits, 1);
    }

    #[test]
    fn recorded_message_is_new_and_counted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);

        let id = tracker.record_message(submission("Ana"), ClientMeta::default());
        assert!(!id.is_empty());

        let record = tracker.aggregate().into_option().expect("record");
        assert_eq!(record.messages, 1);
        let messages = tracker.messages();
        assert_eq!(messages[0].id, id);
        assert_eq!(messages[0].status, MessageStatus::New);
        assert_eq!(messages[0].email, "ana@x.com");
    }

    #[test]
    fn messages_are_most_recent_first_with_distinct_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);

        let mut ids = Vec::new();
        for (offset, name) in ["Ana", "Bruno", "Carla", "Dinis"].iter().enumerate() {
            let now = noon(3) + Duration::minutes(offset as i64);
            ids.push(tracker.record_message_at(submission(name), ClientMeta::default(), now));
        }

        let messages = tracker.messages();
        assert_eq!(messages.len(), 4);
        assert!(messages.windows(2).all(|pair| pair[0].date > pair[1].date));
        assert_eq!(messages[0].name, "Dinis");

        let distinct: HashSet<&String> = ids.iter().collect();
        assert_eq!(distinct.len(), ids.len());

        let record = tracker.aggregate().into_option().expect("record");
        let daily: u64 = record.daily_stats.values().map(|stats| stats.messages).sum();
        assert_eq!(record.messages, 4);
        assert_eq!(daily, 4);
    }

    #[test]
    fn same_instant_messages_get_distinct_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);
        let now = noon(9);

        let first = tracker.record_message_at(submission("Ana"), ClientMeta::default(), now);
        let second = tracker.record_message_at(submission("Ana"), ClientMeta::default(), now);
        assert_ne!(first, second);
    }

    #[test]
    fn status_update_for_unknown_id_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);
        tracker.record_message(submission("Ana"), ClientMeta::default());
        let before = tracker.messages();

        assert!(!tracker.set_message_status("does-not-exist", MessageStatus::Read));
        assert_eq!(tracker.messages(), before);
    }

    #[test]
    fn status_update_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);
        let id = tracker.record_message(submission("Ana"), ClientMeta::default());

        assert!(tracker.set_message_status(&id, MessageStatus::Read));
        assert_eq!(tracker.messages()[0].status, MessageStatus::Read);
        assert!(tracker.set_message_status(&id, MessageStatus::Replied));
        assert_eq!(tracker.messages()[0].status, MessageStatus::Replied);
    }

    #[test]
    fn empty_store_stats_are_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);
        let stats = tracker.stats();
        assert_eq!(stats.total_visits, 0);
        assert_eq!(stats.conversion_rate, 0.0);
        assert!(stats.top_pages.is_empty());
        assert!(stats.top_sources.is_empty());
    }

    #[test]
    fn corrupted_aggregate_is_reinitialized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);
        tracker
            .store()
            .write_raw(&tracker.keys().analytics, "not json")
            .expect("write raw");

        tracker.record_visit("/", "direct");
        let record = tracker.aggregate().into_option().expect("record");
        assert_eq!(record.visits, 1);
    }

    #[test]
    fn quota_failures_are_swallowed() {
        let store = RecordStore::in_memory(16);
        let tracker = AnalyticsTracker::new(store, StorageKeys::default(), Language::Pt);

        tracker.record_visit("/", "direct");
        let id = tracker.record_message(submission("Ana"), ClientMeta::default());

        assert!(!id.is_empty());
        assert!(tracker.messages().is_empty());
        assert!(!tracker.aggregate().is_found());
        assert_eq!(tracker.stats().total_visits, 0);
    }

    struct UnreadableBackend {
        writes: std::sync::Mutex<usize>,
    }

    impl KeyValueBackend for UnreadableBackend {
        fn get(&self, _key: &str) -> AppResult<Option<String>> {
            Err(AppError::Storage("storage unavailable".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> AppResult<()> {
            *self.writes.lock().expect("writes lock") += 1;
            Ok(())
        }

        fn remove(&self, _key: &str) -> AppResult<()> {
            Ok(())
        }
    }

    #[test]
    fn unreadable_storage_is_never_overwritten() {
        let backend = std::sync::Arc::new(UnreadableBackend {
            writes: std::sync::Mutex::new(0),
        });
        let store = RecordStore::new(Box::new(SharedBackend(backend.clone())), 1024 * 1024);
        let tracker = AnalyticsTracker::new(store, StorageKeys::default(), Language::Pt);

        tracker.record_visit("/", "direct");
        let id = tracker.record_message(submission("Ana"), ClientMeta::default());
        assert!(!tracker.set_message_status(&id, MessageStatus::Read));

        assert!(!id.is_empty());
        assert_eq!(*backend.writes.lock().expect("writes lock"), 0);
        assert_eq!(tracker.stats().total_visits, 0);
    }

    struct SharedBackend(std::sync::Arc<UnreadableBackend>);

    impl KeyValueBackend for SharedBackend {
        fn get(&self, key: &str) -> AppResult<Option<String>> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> AppResult<()> {
            self.0.set(key, value)
        }

        fn remove(&self, key: &str) -> AppResult<()> {
            self.0.remove(key)
        }
    }

    #[test]
    fn page_load_hook_uses_location_path_and_referrer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);

        let source = tracker.track_page_load(
            "https://kukuladevz.example/projects",
            Some("https://www.instagram.com/kukuladevz"),
        );
        assert_eq!(source, "social");
        let record = tracker.aggregate().into_option().expect("record");
        assert_eq!(record.page_views.get("/projects"), Some(&1));
        assert_eq!(record.traffic_sources.get("social"), Some(&1));
    }

    #[test]
    fn reset_clears_all_slots() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = tracker_in(&dir);
        tracker.record_visit("/", "direct");
        tracker.record_message(submission("Ana"), ClientMeta::default());

        tracker.reset();
        assert!(!tracker.aggregate().is_found());
        assert!(tracker.messages().is_empty());
        assert!(!tracker.store().read_raw(&tracker.keys().visitor).is_found());
    }
}
