//! Parser for TikTok activity logs
//!
//! The text export is a sequence of blocks like
//!
//! ```text
//! Date: 2024-03-01 21:14:09 UTC
//! Link: https://www.tiktokv.com/share/video/7341234567890123456/
//! ```
//!
//! Dates and links are matched independently and paired by position. JSON
//! exports carry the same pair as `Date`/`Link` keys on list items.

use crate::archive::{ArchiveUpload, EntryKind};
use crate::error::{Result, TokLensError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Date:\s*(.+?)\s*UTC").expect("date regex should compile"));
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Link:\s*(https?://\S+)").expect("link regex should compile"));
static VIDEO_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/video/(\d+)").expect("video id regex should compile"));

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// One watched or liked clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipEvent {
    pub ts_utc: DateTime<Utc>,
    pub url: String,
    pub video_id: Option<String>,
}

/// Rows of one activity log, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClipTable {
    rows: Vec<ClipEvent>,
}

/// Parsed watch and like logs for one selection
#[derive(Debug, Clone, Default, Serialize)]
pub struct Engagement {
    pub watched: ClipTable,
    pub liked: ClipTable,
}

impl ClipTable {
    pub fn new(rows: Vec<ClipEvent>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ClipEvent] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows newest first; ties keep file order
    pub fn sorted_desc(&self) -> Vec<&ClipEvent> {
        let mut rows: Vec<&ClipEvent> = self.rows.iter().collect();
        rows.sort_by(|a, b| b.ts_utc.cmp(&a.ts_utc));
        rows
    }

    /// Up to `n` distinct clips, newest first, keeping the latest row per url
    pub fn recent_unique(&self, n: usize) -> Vec<&ClipEvent> {
        let mut seen = HashSet::new();
        self.sorted_desc()
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .filter(|r| {
                let row: &ClipEvent = *r;
                seen.insert(row.url.as_str())
            })
            .take(n)
            .collect()
    }

    /// Keep rows whose local date (in `tz`) lies in `[from, to]`
    pub fn filter_dates(&self, from: Option<NaiveDate>, to: Option<NaiveDate>, tz: Tz) -> Self {
        if from.is_none() && to.is_none() {
            return self.clone();
        }
        let rows = self
            .rows
            .iter()
            .filter(|r| {
                let day = r.ts_utc.with_timezone(&tz).date_naive();
                from.is_none_or(|f| day >= f) && to.is_none_or(|t| day <= t)
            })
            .cloned()
            .collect();
        Self { rows }
    }

    /// Tabular export with an `ts_utc,url,video_id` header
    pub fn to_csv(&self) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(["ts_utc", "url", "video_id"])?;
        for r in &self.rows {
            wtr.write_record([
                r.ts_utc.format("%Y-%m-%d %H:%M:%S").to_string().as_str(),
                r.url.as_str(),
                r.video_id.as_deref().unwrap_or(""),
            ])?;
        }
        let bytes = wtr.into_inner().map_err(|e| TokLensError::Internal {
            message: format!("CSV flush failed: {}", e),
        })?;
        String::from_utf8(bytes).map_err(|e| TokLensError::Internal {
            message: e.to_string(),
        })
    }
}

impl Engagement {
    pub fn filter_dates(&self, from: Option<NaiveDate>, to: Option<NaiveDate>, tz: Tz) -> Self {
        Self {
            watched: self.watched.filter_dates(from, to, tz),
            liked: self.liked.filter_dates(from, to, tz),
        }
    }

    pub fn table(&self, kind: EntryKind) -> &ClipTable {
        match kind {
            EntryKind::WatchHistory => &self.watched,
            EntryKind::LikeList => &self.liked,
        }
    }
}

/// Digits after `/video/` in a clip URL
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Interpret an export timestamp as UTC
///
/// Values outside the nanosecond-representable range (1677-09-21 to
/// 2262-04-11) are treated as unparseable.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    parse_timestamp_any(raw.trim()).filter(|ts| ts.timestamp_nanos_opt().is_some())
}

fn parse_timestamp_any(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn is_web_link(link: &str) -> bool {
    let lower = link.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn make_event(date: &str, link: &str) -> Option<ClipEvent> {
    if !is_web_link(link) {
        return None;
    }
    let ts_utc = parse_timestamp(date)?;
    Some(ClipEvent {
        ts_utc,
        url: link.to_string(),
        video_id: extract_video_id(link),
    })
}

/// Pair `Date: ... UTC` and `Link: ...` matches by position
///
/// Surplus dates or links are ignored; rows with an unreadable date are dropped.
pub fn parse_date_link_txt(text: &str) -> ClipTable {
    let dates: Vec<&str> = DATE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    let links: Vec<&str> = LINK_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    let paired = dates.len().min(links.len());
    let rows: Vec<ClipEvent> = dates
        .iter()
        .zip(links.iter())
        .filter_map(|(d, l)| make_event(d, l))
        .collect();

    if rows.len() < paired {
        tracing::debug!(
            "Dropped {} of {} rows with unparseable dates",
            paired - rows.len(),
            paired
        );
    }
    ClipTable::new(rows)
}

fn lookup_ci<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    obj.iter()
        .find(|(k, _)| keys.iter().any(|want| k.eq_ignore_ascii_case(want)))
        .and_then(|(_, v)| v.as_str())
}

fn collect_json_rows(value: &Value, out: &mut Vec<ClipEvent>) {
    match value {
        Value::Object(obj) => {
            let date = lookup_ci(obj, &["date"]);
            let link = lookup_ci(obj, &["link", "videolink"]);
            if let (Some(d), Some(l)) = (date, link) {
                if let Some(ev) = make_event(d, l) {
                    out.push(ev);
                }
                return;
            }
            for v in obj.values() {
                collect_json_rows(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_json_rows(v, out);
            }
        }
        _ => {}
    }
}

fn find_section<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    match value {
        Value::Object(obj) => {
            for (k, v) in obj {
                if names.iter().any(|n| k.eq_ignore_ascii_case(n)) {
                    return Some(v);
                }
            }
            obj.values().find_map(|v| find_section(v, names))
        }
        Value::Array(items) => items.iter().find_map(|v| find_section(v, names)),
        _ => None,
    }
}

fn section_names(kind: EntryKind) -> &'static [&'static str] {
    match kind {
        EntryKind::WatchHistory => &["Video Browsing History", "Watch History"],
        EntryKind::LikeList => &["Like List", "Favorite Videos"],
    }
}

/// Collect date/link items from a JSON export
///
/// With `section`, only the subtree under the first key naming that log is
/// walked; a missing section yields an empty table.
pub fn parse_json_export(text: &str, section: Option<EntryKind>) -> Result<ClipTable> {
    let doc: Value = serde_json::from_str(text).map_err(|e| TokLensError::Parse {
        message: format!("invalid JSON export: {}", e),
    })?;
    let root = match section {
        Some(kind) => match find_section(&doc, section_names(kind)) {
            Some(v) => v,
            None => {
                tracing::debug!("JSON export has no {} section", kind.label());
                return Ok(ClipTable::default());
            }
        },
        None => &doc,
    };
    let mut rows = Vec::new();
    collect_json_rows(root, &mut rows);
    Ok(ClipTable::new(rows))
}

fn looks_like_json(path: &str, text: &str) -> bool {
    path.to_lowercase().ends_with(".json")
        || matches!(text.trim_start().chars().next(), Some('{') | Some('['))
}

/// Parse one archive entry selected for `kind`
pub fn parse_entry(path: &str, text: &str, kind: EntryKind) -> Result<ClipTable> {
    if looks_like_json(path, text) {
        parse_json_export(text, Some(kind))
    } else {
        Ok(parse_date_link_txt(text))
    }
}

/// Read and parse the watch and like selections of an upload
pub fn load_engagement(
    upload: &ArchiveUpload,
    watch_path: &str,
    likes_path: &str,
) -> Result<Engagement> {
    let watch_txt = upload.read_text(watch_path)?;
    let likes_txt = upload.read_text(likes_path)?;
    let watched = parse_entry(watch_path, &watch_txt, EntryKind::WatchHistory)?;
    let liked = parse_entry(likes_path, &likes_txt, EntryKind::LikeList)?;
    tracing::debug!(
        "Parsed {} watched rows from {:?}, {} liked rows from {:?}",
        watched.len(),
        watch_path,
        liked.len(),
        likes_path
    );
    Ok(Engagement { watched, liked })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = "\
Date: 2024-03-01 21:14:09 UTC
Link: https://www.tiktokv.com/share/video/7341234567890123456/

Date: 2024-03-02 08:00:00 UTC
Link: https://www.tiktokv.com/share/video/7341234567890999999/

Date: 2024-03-03 09:30:00 UTC
";

    #[test]
    fn test_pairs_by_position_and_ignores_surplus() {
        let table = parse_date_link_txt(SAMPLE);
        assert_eq!(table.len(), 2);
        let first = &table.rows()[0];
        assert_eq!(
            first.ts_utc,
            Utc.with_ymd_and_hms(2024, 3, 1, 21, 14, 9).unwrap()
        );
        assert_eq!(first.video_id.as_deref(), Some("7341234567890123456"));
        assert_eq!(
            table.rows()[1].video_id.as_deref(),
            Some("7341234567890999999")
        );
    }

    #[test]
    fn test_drops_unparseable_dates() {
        let text = "Date: not a date UTC\nLink: https://x.test/video/1\n\
                    Date: 2024-01-01 00:00:00 UTC\nLink: https://x.test/video/2\n";
        let table = parse_date_link_txt(text);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].video_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_date_link_txt("").is_empty());
        assert!(parse_date_link_txt("nothing to see").is_empty());
    }

    #[test]
    fn test_extract_video_id() {
        assert_eq!(
            extract_video_id("https://www.tiktokv.com/share/video/7234567890123456789/"),
            Some("7234567890123456789".to_string())
        );
        assert_eq!(extract_video_id("https://www.tiktok.com/@someone"), None);
    }

    #[test]
    fn test_parse_timestamp_shapes() {
        let want = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-06 07:08:00"), Some(want));
        assert_eq!(parse_timestamp("2024-05-06 07:08"), Some(want));
        assert_eq!(parse_timestamp("2024-05-06T07:08:00"), Some(want));
        assert_eq!(parse_timestamp("2024-05-06T09:08:00+02:00"), Some(want));
        assert_eq!(
            parse_timestamp("2024-05-06"),
            Some(Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("06/05/2024"), None);
    }

    #[test]
    fn test_recent_unique_keeps_latest_per_url() {
        let text = "\
Date: 2024-01-01 10:00:00 UTC\nLink: https://x.test/video/1\n\
Date: 2024-01-03 10:00:00 UTC\nLink: https://x.test/video/2\n\
Date: 2024-01-05 10:00:00 UTC\nLink: https://x.test/video/1\n\
Date: 2024-01-04 10:00:00 UTC\nLink: https://x.test/video/3\n";
        let table = parse_date_link_txt(text);
        let recent = table.recent_unique(10);
        let ids: Vec<_> = recent.iter().map(|r| r.video_id.as_deref().unwrap()).collect();
        assert_eq!(ids, vec!["1", "3", "2"]);
        assert_eq!(recent[0].ts_utc.format("%d").to_string(), "05");
        assert_eq!(table.recent_unique(2).len(), 2);
    }

    #[test]
    fn test_json_export_sections() {
        let doc = r#"{
          "Activity": {
            "Video Browsing History": {"VideoList": [
              {"Date": "2024-02-01 12:00:00", "Link": "https://x.test/video/11"},
              {"Date": "garbage", "Link": "https://x.test/video/12"}
            ]},
            "Like List": {"ItemFavoriteList": [
              {"date": "2024-02-02 12:00:00", "link": "https://x.test/video/21"}
            ]}
          }
        }"#;
        let watched = parse_json_export(doc, Some(EntryKind::WatchHistory)).unwrap();
        assert_eq!(watched.len(), 1);
        assert_eq!(watched.rows()[0].video_id.as_deref(), Some("11"));

        let liked = parse_json_export(doc, Some(EntryKind::LikeList)).unwrap();
        assert_eq!(liked.len(), 1);
        assert_eq!(liked.rows()[0].video_id.as_deref(), Some("21"));

        let all = parse_json_export(doc, None).unwrap();
        assert_eq!(all.len(), 2);

        assert!(matches!(
            parse_json_export("{not json", None),
            Err(TokLensError::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_entry_dispatch() {
        let table = parse_entry("Watch History.txt", SAMPLE, EntryKind::WatchHistory).unwrap();
        assert_eq!(table.len(), 2);
        let json = r#"[{"Date": "2024-02-01 12:00:00", "Link": "https://x.test/video/5"}]"#;
        let table = parse_entry("whatever.txt", json, EntryKind::LikeList).unwrap();
        assert!(table.is_empty(), "no Like List section in a bare array");
    }

    #[test]
    fn test_filter_dates_in_timezone() {
        let text = "Date: 2024-01-01 23:30:00 UTC\nLink: https://x.test/video/1\n\
                    Date: 2024-01-03 12:00:00 UTC\nLink: https://x.test/video/2\n";
        let table = parse_date_link_txt(text);
        let jan2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        // 23:30 UTC is already Jan 2 in Berlin
        let berlin = table.filter_dates(Some(jan2), Some(jan2), chrono_tz::Europe::Berlin);
        assert_eq!(berlin.len(), 1);
        let utc = table.filter_dates(Some(jan2), Some(jan2), Tz::UTC);
        assert!(utc.is_empty());
        assert_eq!(table.filter_dates(None, None, Tz::UTC).len(), 2);
    }

    #[test]
    fn test_to_csv() {
        let table = parse_date_link_txt(SAMPLE);
        let csv = table.to_csv().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("ts_utc,url,video_id"));
        assert_eq!(
            lines.next(),
            Some(
                "2024-03-01 21:14:09,https://www.tiktokv.com/share/video/7341234567890123456/,7341234567890123456"
            )
        );
    }

    #[test]
    fn test_out_of_range_timestamps_are_dropped() {
        assert_eq!(parse_timestamp("+200000-01-01 00:00:00"), None);
        assert_eq!(parse_timestamp("0001-01-01 00:00:00"), None);
        assert_eq!(parse_timestamp("9999-12-31"), None);
        assert!(parse_timestamp("1677-09-22 00:00:00").is_some());
        assert!(parse_timestamp("2262-04-10 00:00:00").is_some());

        let text = "Date: 0001-01-01 00:00:00 UTC\nLink: https://x.test/video/1\n\
                    Date: 2024-01-01 00:00:00 UTC\nLink: https://x.test/video/2\n\
                    Date: 9999-12-31 00:00:00 UTC\nLink: https://x.test/video/3\n";
        let table = parse_date_link_txt(text);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].video_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_non_web_links_are_dropped() {
        let doc = r#"{"Video Browsing History": [
            {"Date": "2024-01-01 00:00:00", "Link": "javascript:alert(1)"},
            {"Date": "2024-01-01 00:00:00", "Link": "data:text/html,hi"},
            {"Date": "2024-01-02 00:00:00", "Link": "HTTPS://x.test/video/7"}
        ]}"#;
        let table = parse_json_export(doc, Some(EntryKind::WatchHistory)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].video_id.as_deref(), Some("7"));
    }
}
