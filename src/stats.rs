use crate::models::{AggregateRecord, CalculatedStats, Language, PageStat, SourceStat};
use crate::traffic::source_display_name;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const TOP_LIMIT: usize = 5;
// Rough minutes spent per page view.
const MINUTES_PER_PAGE: f64 = 1.5;
const BOUNCE_ADJUSTMENT: f64 = 0.6;

pub fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

pub fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

pub fn compute_stats(record: Option<&AggregateRecord>, now: DateTime<Utc>, language: Language) -> CalculatedStats {
    let Some(record) = record else {
        return CalculatedStats::default();
    };

    let today = record
        .daily_stats
        .get(&day_key(now))
        .copied()
        .unwrap_or_default();
    let month = month_key(now);
    let this_month_messages: u64 = record
        .daily_stats
        .iter()
        .filter(|(date, _)| date.starts_with(&month))
        .map(|(_, stats)| stats.messages)
        .sum();

    let top_pages = ranked(&record.page_views)
        .into_iter()
        .map(|(page, views, percentage)| PageStat {
            page,
            views,
            percentage,
        })
        .collect();
    let top_sources = ranked(&record.traffic_sources)
        .into_iter()
        .map(|(source, visitors, percentage)| SourceStat {
            source: source_display_name(&source, language),
            visitors,
            percentage,
        })
        .collect();

    CalculatedStats {
        total_visits: record.visits,
        total_messages: record.messages,
        total_unique_visitors: record.unique_visitors,
        today_visits: today.visits,
        today_messages: today.messages,
        this_month_messages,
        conversion_rate: conversion_rate(record.visits, record.messages),
        avg_session_time: avg_session_time(record),
        bounce_rate: bounce_rate(record),
        top_pages,
        top_sources,
    }
}

pub fn conversion_rate(visits: u64, messages: u64) -> f64 {
    if visits == 0 {
        return 0.0;
    }
    let rate = messages as f64 / visits as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

fn ranked(counts: &BTreeMap<String, u64>) -> Vec<(String, u64, f64)> {
    let total: u64 = counts.values().sum();
    let mut entries: Vec<(&String, &u64)> = counts.iter().collect();
    // BTreeMap iteration is key-ordered, so the stable sort breaks ties by key.
    entries.sort_by(|a, b| b.1.cmp(a.1));
    entries
        .into_iter()
        .take(TOP_LIMIT)
        .map(|(key, count)| {
            let percentage = if total > 0 {
                *count as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            (key.clone(), *count, percentage)
        })
        .collect()
}

// Simulated from page views per visit.
fn avg_session_time(record: &AggregateRecord) -> String {
    if record.visits == 0 {
        return "0m 0s".to_string();
    }
    let total_views: u64 = record.page_views.values().sum();
    let minutes = total_views as f64 / record.visits as f64 * MINUTES_PER_PAGE;
    let whole = minutes.floor();
    let seconds = ((minutes - whole) * 60.0).floor();
    format!("{}m {}s", whole as u64, seconds as u64)
}

// Simulated: home page views stand in for single-page visits.
fn bounce_rate(record: &AggregateRecord) -> u64 {
    if record.visits == 0 {
        return 0;
    }
    let landing = record.page_views.get("/").copied().unwrap_or(0);
    (landing as f64 / record.visits as f64 * 100.0 * BOUNCE_ADJUSTMENT).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyStats;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single().expect("valid date")
    }

    fn record_with_pages(pages: &[(&str, u64)], visits: u64) -> AggregateRecord {
        let mut record = AggregateRecord::empty(at(2026, 10, 17));
        record.visits = visits;
        for (page, views) in pages {
            record.page_views.insert(page.to_string(), *views);
        }
        record
    }

    #[test]
    fn absent_record_yields_zero_stats() {
        let stats = compute_stats(None, at(2026, 10, 17), Language::Pt);
        assert_eq!(stats, CalculatedStats::default());
        assert_eq!(stats.avg_session_time, "0m 0s");
    }

    #[test]
    fn empty_record_yields_zero_stats() {
        let record = AggregateRecord::empty(at(2026, 10, 17));
        let stats = compute_stats(Some(&record), at(2026, 10, 17), Language::Pt);
        assert_eq!(stats, CalculatedStats::default());
    }

    #[test]
    fn conversion_rate_rounds_to_two_places() {
        assert_eq!(conversion_rate(0, 0), 0.0);
        assert_eq!(conversion_rate(3, 1), 33.33);
        assert_eq!(conversion_rate(4, 1), 25.0);
    }

    #[test]
    fn top_pages_are_limited_and_sorted() {
        let record = record_with_pages(
            &[("/a", 1), ("/b", 7), ("/c", 3), ("/d", 3), ("/e", 2), ("/f", 4)],
            20,
        );
        let stats = compute_stats(Some(&record), at(2026, 10, 17), Language::Pt);
        let pages: Vec<&str> = stats.top_pages.iter().map(|p| p.page.as_str()).collect();
        assert_eq!(pages, vec!["/b", "/f", "/c", "/d", "/e"]);
        assert!((stats.top_pages[0].percentage - 35.0).abs() < 1e-9);
    }

    #[test]
    fn month_and_day_rollups_use_current_date() {
        let mut record = AggregateRecord::empty(at(2026, 10, 17));
        record.daily_stats.insert("2026-10-17".to_string(), DailyStats { visits: 4, messages: 1 });
        record.daily_stats.insert("2026-10-02".to_string(), DailyStats { visits: 2, messages: 2 });
        record.daily_stats.insert("2026-09-30".to_string(), DailyStats { visits: 9, messages: 5 });
        let stats = compute_stats(Some(&record), at(2026, 10, 17), Language::Pt);
        assert_eq!(stats.today_visits, 4);
        assert_eq!(stats.today_messages, 1);
        assert_eq!(stats.this_month_messages, 3);
    }

    #[test]
    fn simulated_session_and_bounce_follow_page_views() {
        let record = record_with_pages(&[("/", 3), ("/about", 1)], 4);
        let stats = compute_stats(Some(&record), at(2026, 10, 17), Language::Pt);
        assert_eq!(stats.avg_session_time, "1m 30s");
        assert_eq!(stats.bounce_rate, 45);
    }

    #[test]
    fn source_labels_are_translated() {
        let mut record = AggregateRecord::empty(at(2026, 10, 17));
        record.visits = 3;
        record.traffic_sources.insert("direct".to_string(), 2);
        record.traffic_sources.insert("newsletter".to_string(), 1);
        let stats = compute_stats(Some(&record), at(2026, 10, 17), Language::En);
        assert_eq!(stats.top_sources[0].source, "Direct");
        assert_eq!(stats.top_sources[1].source, "newsletter");
    }
}
