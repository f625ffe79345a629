//! Offline pipeline behind the `inspect` and `paths` subcommands

use crate::archive::{ArchiveUpload, EntryKind};
use crate::config::Config;
use crate::error::Result;
use crate::http::selection::{DashboardQuery, Selection};
use crate::metrics::{Bucket, Report, build_report};
use crate::parse::{Engagement, load_engagement};
use prettytable::{Table, row};
use serde_json::json;

/// Command-line selection for one archive
#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    pub watch: Option<String>,
    pub likes: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub bucket: Bucket,
    pub top: usize,
}

/// Everything `inspect` can print
#[derive(Debug)]
pub struct Inspection {
    pub upload: ArchiveUpload,
    pub selection: Selection,
    pub engagement: Engagement,
    pub report: Report,
}

/// Index the archive, resolve the selection, parse and aggregate
pub fn inspect_archive(bytes: Vec<u8>, config: &Config, opts: &InspectOptions) -> Result<Inspection> {
    let upload = ArchiveUpload::from_bytes(bytes, config.limits())?;
    let query = DashboardQuery {
        watch: opts.watch.clone(),
        likes: opts.likes.clone(),
        from: opts.from.clone(),
        to: opts.to.clone(),
        bucket: Some(opts.bucket),
        ..Default::default()
    };
    let selection = query.resolve(&upload, &config.display)?;
    let tz = config.runtime.tz;
    let engagement = load_engagement(&upload, &selection.watch, &selection.likes)?
        .filter_dates(selection.from, selection.to, tz);
    let report = build_report(&engagement, selection.bucket, tz, opts.top);
    Ok(Inspection {
        upload,
        selection,
        engagement,
        report,
    })
}

impl Inspection {
    pub fn to_json(&self) -> Result<String> {
        let doc = json!({
            "archive": {
                "fingerprint": self.upload.fingerprint(),
                "size_bytes": self.upload.size(),
                "entries": self.upload.list_paths().len()
            },
            "selection": {
                "watch": self.selection.watch,
                "likes": self.selection.likes,
                "from": self.selection.from,
                "to": self.selection.to,
                "bucket": self.selection.bucket
            },
            "report": self.report
        });
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Summary table followed by the most repeated clips
    pub fn to_table(&self) -> String {
        let w = &self.report.watched;
        let l = &self.report.liked;
        let fmt_ts = |ts: Option<chrono::DateTime<chrono::Utc>>| {
            ts.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string())
        };

        let mut summary = Table::new();
        summary.add_row(row!["", "Watched", "Liked"]);
        summary.add_row(row!["Entry", self.selection.watch, self.selection.likes]);
        summary.add_row(row!["Events", w.total, l.total]);
        summary.add_row(row!["Distinct clips", w.unique_clips, l.unique_clips]);
        summary.add_row(row!["First (UTC)", fmt_ts(w.first), fmt_ts(l.first)]);
        summary.add_row(row!["Last (UTC)", fmt_ts(w.last), fmt_ts(l.last)]);
        summary.add_row(row!["Active days", w.active_days, l.active_days]);
        summary.add_row(row![
            "Per active day",
            format!("{:.1}", w.avg_per_active_day),
            format!("{:.1}", l.avg_per_active_day)
        ]);
        summary.add_row(row![
            "Longest streak",
            w.longest_streak_days,
            l.longest_streak_days
        ]);
        summary.add_row(row![
            "Current streak",
            w.current_streak_days,
            l.current_streak_days
        ]);
        summary.add_row(row![
            "Liked after watching",
            format!(
                "{} of {} ({:.1}%)",
                self.report.overlap.liked_and_watched,
                self.report.overlap.unique_liked,
                self.report.overlap.like_rate * 100.0
            ),
            ""
        ]);

        let mut out = summary.to_string();
        if !self.report.top_repeats.is_empty() {
            let mut repeats = Table::new();
            repeats.add_row(row!["Clip", "Views", "Last seen (UTC)"]);
            for r in &self.report.top_repeats {
                repeats.add_row(row![
                    r.video_id.as_deref().unwrap_or(&r.url),
                    r.count,
                    r.last_seen.format("%Y-%m-%d %H:%M")
                ]);
            }
            out.push('\n');
            out.push_str(&repeats.to_string());
        }
        out
    }
}

/// Entry listing with the default pick for each selector
pub fn paths_table(upload: &ArchiveUpload) -> String {
    let watch = upload.guess_entry(EntryKind::WatchHistory);
    let likes = upload.guess_entry(EntryKind::LikeList);
    let mut table = Table::new();
    table.add_row(row!["#", "Entry", "Default for"]);
    for (i, p) in upload.list_paths().iter().enumerate() {
        let mut picks = Vec::new();
        if watch == Some(p.as_str()) {
            picks.push(EntryKind::WatchHistory.label());
        }
        if likes == Some(p.as_str()) {
            picks.push(EntryKind::LikeList.label());
        }
        table.add_row(row![i + 1, p, picks.join(", ")]);
    }
    table.to_string()
}
