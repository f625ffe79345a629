//! Aggregates over parsed activity logs: counts over time and frequency histograms
//!
//! Every bucket is computed in the display time zone so a late-night session
//! lands on the day the viewer experienced it.

use crate::parse::{ClipEvent, ClipTable, Engagement};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Time bucket granularity for activity series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    #[default]
    Day,
    Week,
    Month,
}

impl std::str::FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Bucket::Day),
            "week" => Ok(Bucket::Week),
            "month" => Ok(Bucket::Month),
            other => Err(format!("unknown bucket '{other}' (expected day, week or month)")),
        }
    }
}

/// One point of an activity series; `start` is the first local day of the bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub start: NaiveDate,
    pub count: usize,
}

/// Headline figures for one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub unique_clips: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub active_days: usize,
    pub avg_per_active_day: f64,
    pub longest_streak_days: usize,
    /// Streak ending on the last active day
    pub current_streak_days: usize,
}

/// A clip that shows up more than once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repeat {
    pub url: String,
    pub video_id: Option<String>,
    pub count: usize,
    pub last_seen: DateTime<Utc>,
}

/// How much of the like list overlaps the watch history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LikeOverlap {
    pub unique_watched: usize,
    pub unique_liked: usize,
    pub liked_and_watched: usize,
    pub like_rate: f64,
}

/// Everything the dashboard and the JSON API show for a selection
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub timezone: String,
    pub bucket: Bucket,
    pub watched: Summary,
    pub liked: Summary,
    pub watched_series: Vec<BucketCount>,
    pub liked_series: Vec<BucketCount>,
    pub watched_hours: [usize; 24],
    pub watched_weekdays: [usize; 7],
    pub top_repeats: Vec<Repeat>,
    pub overlap: LikeOverlap,
}

fn local_day(ts: &DateTime<Utc>, tz: Tz) -> NaiveDate {
    ts.with_timezone(&tz).date_naive()
}

/// Clip identity: the video id when present, the url otherwise
fn clip_key(ev: &ClipEvent) -> &str {
    ev.video_id.as_deref().unwrap_or(ev.url.as_str())
}

fn streaks(days: &BTreeSet<NaiveDate>) -> (usize, usize) {
    let mut longest = 0;
    let mut current = 0;
    let mut prev: Option<NaiveDate> = None;
    for day in days {
        current = match prev {
            Some(p) if p.succ_opt() == Some(*day) => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        prev = Some(*day);
    }
    (longest, current)
}

/// Counts, span, and active-day streaks of a table
pub fn summarize(table: &ClipTable, tz: Tz) -> Summary {
    let rows = table.rows();
    let unique_clips = rows
        .iter()
        .map(|r| r.url.as_str())
        .collect::<HashSet<_>>()
        .len();
    let days: BTreeSet<NaiveDate> = rows.iter().map(|r| local_day(&r.ts_utc, tz)).collect();
    let (longest, current) = streaks(&days);
    let active_days = days.len();

    Summary {
        total: rows.len(),
        unique_clips,
        first: rows.iter().map(|r| r.ts_utc).min(),
        last: rows.iter().map(|r| r.ts_utc).max(),
        active_days,
        avg_per_active_day: if active_days == 0 {
            0.0
        } else {
            rows.len() as f64 / active_days as f64
        },
        longest_streak_days: longest,
        current_streak_days: current,
    }
}

fn bucket_start(day: NaiveDate, bucket: Bucket) -> NaiveDate {
    match bucket {
        Bucket::Day => day,
        Bucket::Week => day - Duration::days(day.weekday().num_days_from_monday() as i64),
        Bucket::Month => day.with_day(1).unwrap_or(day),
    }
}

fn next_bucket(start: NaiveDate, bucket: Bucket) -> Option<NaiveDate> {
    match bucket {
        Bucket::Day => start.succ_opt(),
        Bucket::Week => start.checked_add_signed(Duration::days(7)),
        Bucket::Month => {
            let (y, m) = if start.month() == 12 {
                (start.year() + 1, 1)
            } else {
                (start.year(), start.month() + 1)
            };
            NaiveDate::from_ymd_opt(y, m, 1)
        }
    }
}

/// Longest series returned by [`bucket_counts`]; older buckets are dropped
pub const MAX_SERIES_BUCKETS: usize = 3660;

/// Events per bucket, with zero-count buckets filled between first and last
///
/// At most [`MAX_SERIES_BUCKETS`] buckets are kept, ending at the last one.
pub fn bucket_counts(table: &ClipTable, bucket: Bucket, tz: Tz) -> Vec<BucketCount> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for r in table.rows() {
        *counts
            .entry(bucket_start(local_day(&r.ts_utc, tz), bucket))
            .or_default() += 1;
    }
    let (Some(first), Some(last)) = (
        counts.keys().next().copied(),
        counts.keys().next_back().copied(),
    ) else {
        return Vec::new();
    };

    let mut out = VecDeque::new();
    let mut cursor = Some(first);
    while let Some(start) = cursor {
        if start > last {
            break;
        }
        if out.len() == MAX_SERIES_BUCKETS {
            out.pop_front();
        }
        out.push_back(BucketCount {
            start,
            count: counts.get(&start).copied().unwrap_or(0),
        });
        cursor = next_bucket(start, bucket);
    }
    out.into()
}

/// Events per local hour of day
pub fn hour_histogram(table: &ClipTable, tz: Tz) -> [usize; 24] {
    let mut bins = [0usize; 24];
    for r in table.rows() {
        bins[r.ts_utc.with_timezone(&tz).hour() as usize] += 1;
    }
    bins
}

/// Events per local weekday, Monday first
pub fn weekday_histogram(table: &ClipTable, tz: Tz) -> [usize; 7] {
    let mut bins = [0usize; 7];
    for r in table.rows() {
        let wd: Weekday = r.ts_utc.with_timezone(&tz).weekday();
        bins[wd.num_days_from_monday() as usize] += 1;
    }
    bins
}

/// Clips seen more than once, most repeated first, then most recent
pub fn top_repeats(table: &ClipTable, n: usize) -> Vec<Repeat> {
    let mut by_clip: HashMap<&str, Repeat> = HashMap::new();
    for r in table.rows() {
        let entry = by_clip.entry(clip_key(r)).or_insert_with(|| Repeat {
            url: r.url.clone(),
            video_id: r.video_id.clone(),
            count: 0,
            last_seen: r.ts_utc,
        });
        entry.count += 1;
        if r.ts_utc > entry.last_seen {
            entry.last_seen = r.ts_utc;
            entry.url = r.url.clone();
        }
    }
    let mut repeats: Vec<Repeat> = by_clip.into_values().filter(|r| r.count > 1).collect();
    repeats.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(b.last_seen.cmp(&a.last_seen))
            .then(a.url.cmp(&b.url))
    });
    repeats.truncate(n);
    repeats
}

/// Share of distinct watched clips that were also liked
pub fn like_overlap(engagement: &Engagement) -> LikeOverlap {
    let watched: HashSet<&str> = engagement.watched.rows().iter().map(clip_key).collect();
    let liked: HashSet<&str> = engagement.liked.rows().iter().map(clip_key).collect();
    let both = liked.intersection(&watched).count();
    LikeOverlap {
        unique_watched: watched.len(),
        unique_liked: liked.len(),
        liked_and_watched: both,
        like_rate: if watched.is_empty() {
            0.0
        } else {
            both as f64 / watched.len() as f64
        },
    }
}

/// Build the full aggregate report for an already filtered selection
pub fn build_report(engagement: &Engagement, bucket: Bucket, tz: Tz, top_n: usize) -> Report {
    Report {
        timezone: tz.name().to_string(),
        bucket,
        watched: summarize(&engagement.watched, tz),
        liked: summarize(&engagement.liked, tz),
        watched_series: bucket_counts(&engagement.watched, bucket, tz),
        liked_series: bucket_counts(&engagement.liked, bucket, tz),
        watched_hours: hour_histogram(&engagement.watched, tz),
        watched_weekdays: weekday_histogram(&engagement.watched, tz),
        top_repeats: top_repeats(&engagement.watched, top_n),
        overlap: like_overlap(engagement),
    }
}
