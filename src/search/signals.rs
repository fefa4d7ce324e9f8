//! Business signal scorers
//!
//! Every scorer maps raw metadata or content to a value in [0, 1], so a
//! weighted sum with weights totalling 1.0 stays in [0, 1].

use chrono::{DateTime, Utc};

/// How well `title` matches the query text
///
/// 1.0 on a case-insensitive exact match, 0.8 when the title contains the
/// whole query, otherwise 0.6 times the share of query words the title
/// contains. A query without words scores 0.
pub fn title_match(query: &str, title: &str) -> f32 {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return 0.0;
    }
    let title = title.to_lowercase();

    if query == title.trim() {
        return 1.0;
    }
    if title.contains(&query) {
        return 0.8;
    }

    let words: Vec<&str> = query.split_whitespace().collect();
    let matched = words.iter().filter(|w| title.contains(*w)).count();
    0.6 * matched as f32 / words.len() as f32
}

/// Recency of an RFC 3339 `created_at` timestamp relative to `now`
pub fn freshness(created_at: Option<&str>, now: DateTime<Utc>) -> f32 {
    let Some(created_at) = created_at.and_then(|s| DateTime::parse_from_rfc3339(s).ok()) else {
        return 0.5;
    };

    let days = (now - created_at.with_timezone(&Utc)).num_seconds() as f64 / 86_400.0;
    match days {
        d if d <= 7.0 => 1.0,
        d if d <= 30.0 => 0.8,
        d if d <= 90.0 => 0.6,
        d if d <= 180.0 => 0.4,
        _ => 0.2,
    }
}

pub fn prd_status(status: Option<&str>) -> f32 {
    match normalized(status).as_deref() {
        Some("published") => 1.0,
        Some("draft") => 0.7,
        Some("archived") => 0.3,
        _ => 0.5,
    }
}

pub fn test_case_status(status: Option<&str>) -> f32 {
    match normalized(status).as_deref() {
        Some("active") => 1.0,
        Some("draft") => 0.6,
        Some("deprecated") => 0.2,
        _ => 0.5,
    }
}

/// Accepts both high/medium/low and P0..P4 scales
pub fn priority(priority: Option<&str>) -> f32 {
    match normalized(priority).as_deref() {
        Some("high" | "p0" | "p1") => 1.0,
        Some("medium" | "p2") => 0.6,
        Some("low" | "p3" | "p4") => 0.3,
        _ => 0.5,
    }
}

pub fn prd_link(prd_id: Option<&str>) -> f32 {
    match prd_id {
        Some(id) if !id.trim().is_empty() => 1.0,
        _ => 0.0,
    }
}

/// Content length in characters, bucketed
pub fn completeness(content: &str) -> f32 {
    match content.chars().count() {
        n if n >= 500 => 1.0,
        n if n >= 200 => 0.8,
        n if n >= 100 => 0.6,
        n if n >= 50 => 0.4,
        _ => 0.2,
    }
}

fn normalized(value: Option<&str>) -> Option<String> {
    value.map(|v| v.trim().to_ascii_lowercase())
}
