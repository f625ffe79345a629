//! Server-rendered HTML pages: upload form, dashboard, error pages

use super::AppState;
use super::selection::{DashboardQuery, Loaded, Selection, Tab, load, parse_session_id};
use crate::archive::ArchiveUpload;
use crate::cards::{
    CARDS_PER_ROW_MAX, CARDS_PER_ROW_MIN, NUM_CARDS_MAX, NUM_CARDS_MIN, NUM_CARDS_STEP,
    render_cards,
};
use crate::charts::{ChartStyle, bar_chart, hour_bars, series_bars, weekday_bars};
use crate::error::TokLensError;
use crate::metrics::{Bucket, Report, Summary, build_report};
use crate::utils::escape_html;
use axum::{
    extract::{Multipart, Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt::Write;

const PAGE_TITLE: &str = "Engagement & Retention Dashboard";
const UPLOAD_FIELD: &str = "archive";
const TOP_REPEATS: usize = 10;
const LIKED_COLOR: &str = "#25a4b5";

const STYLE: &str = r#"
body{font-family:system-ui,-apple-system,Segoe UI,Roboto,sans-serif;margin:0;background:#f6f6f8;color:#161823}
header{background:#161823;color:#fff;padding:14px 24px;display:flex;justify-content:space-between;align-items:center}
header a{color:#fff;text-decoration:none;font-weight:600}
main{display:flex;gap:24px;padding:24px;align-items:flex-start}
aside{width:280px;flex:none;background:#fff;border-radius:12px;padding:16px;box-shadow:0 1px 3px rgba(0,0,0,.08)}
aside label{display:block;font-size:13px;margin-top:12px;color:#555}
aside select,aside input{width:100%;box-sizing:border-box;margin-top:4px}
section.content{flex:1;min-width:0}
.panel{background:#fff;border-radius:12px;padding:16px;margin-bottom:20px;box-shadow:0 1px 3px rgba(0,0,0,.08)}
.tiles{display:grid;grid-template-columns:repeat(auto-fill,minmax(150px,1fr));gap:12px}
.tile{background:#fff;border-radius:12px;padding:12px;box-shadow:0 1px 3px rgba(0,0,0,.08)}
.tile .v{font-size:22px;font-weight:700}.tile .k{font-size:12px;color:#777}
.tabs a{display:inline-block;padding:8px 14px;border-radius:18px;margin-right:6px;text-decoration:none;color:#161823;background:#e9e9ee}
.tabs a.active{background:#fe2c55;color:#fff}
.grid{display:grid;gap:12px;overflow-y:auto;margin-top:12px}
.card{background:#fff;border-radius:12px;overflow:hidden;box-shadow:0 1px 3px rgba(0,0,0,.1);display:flex;flex-direction:column}
.cover{height:160px;background:#ddd}.cover img,.cover .gradient{width:100%;height:100%;object-fit:cover;display:block}
.meta{padding:8px 10px;display:flex;flex-direction:column;gap:4px}
.title{font-weight:600;font-size:14px;overflow:hidden;text-overflow:ellipsis;white-space:nowrap}
.sub{font-size:12px;color:#777}
.btn{align-self:flex-start;font-size:12px;padding:4px 10px;border-radius:14px;background:#161823;color:#fff;text-decoration:none}
.grid-empty{padding:24px;color:#777}
.chart-title{font-size:13px;font-weight:600;fill:#161823}
.chart-axis{font-size:10px;fill:#777}.chart-baseline{stroke:#ccc}.chart-empty{font-size:13px;fill:#999}
table{border-collapse:collapse;width:100%;font-size:13px}td,th{padding:6px;border-bottom:1px solid #eee;text-align:left}
.error{color:#b00020}
.note{font-size:12px;color:#777}
button{padding:8px 14px;border-radius:18px;border:0;background:#fe2c55;color:#fff;font-weight:600;cursor:pointer}
"#;

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!doctype html><html lang="en"><head><meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1"><title>{t}</title><style>{STYLE}</style></head><body><header><a href="/">{app}</a><span class="note">tok-lens {ver}</span></header>{body}</body></html>"#,
        t = escape_html(title),
        app = escape_html(PAGE_TITLE),
        ver = env!("CARGO_PKG_VERSION"),
    ))
}

/// HTML rendition of a [`TokLensError`]
#[derive(Debug)]
pub struct PageError(pub TokLensError);

impl From<TokLensError> for PageError {
    fn from(err: TokLensError) -> Self {
        PageError(err)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if status.is_server_error() {
            tracing::error!("{}", self.0);
        } else {
            tracing::debug!("{}", self.0);
        }
        let body = format!(
            r#"<main><section class="content"><div class="panel"><h2>{code} {reason}</h2><p class="error">{msg}</p><p><a href="/">Upload another archive</a></p></div></section></main>"#,
            code = status.as_u16(),
            reason = status.canonical_reason().unwrap_or("Error"),
            msg = escape_html(&self.0.to_string()),
        );
        (status, layout("Error", &body)).into_response()
    }
}

type PageResult<T> = std::result::Result<T, PageError>;

/// Upload page
pub async fn index_handler(State(state): State<AppState>) -> Html<String> {
    let body = format!(
        r#"<main><section class="content"><div class="panel"><h1>{title}</h1>
<p>Upload the ZIP of your TikTok data export (TXT or JSON format). The archive is kept in memory for this session only and discarded when you end the session or after {ttl} minutes of inactivity.</p>
<form method="post" action="/upload" enctype="multipart/form-data">
<input type="file" name="{UPLOAD_FIELD}" accept=".zip,application/zip" required>
<button type="submit">Analyze</button>
</form>
<p class="note">Maximum upload size: {max} MB</p></div></section></main>"#,
        title = escape_html(PAGE_TITLE),
        ttl = state.config.sessions.ttl_secs.div_ceil(60),
        max = state.config.server.max_upload_mb,
    );
    layout(PAGE_TITLE, &body)
}

/// Accept a multipart upload and open a session for it
pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> PageResult<Redirect> {
    let limits = state.config.limits();
    let mut archive: Option<Vec<u8>> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_error(e, limits.max_upload_bytes).into()),
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, limits.max_upload_bytes))?;
        archive = Some(bytes.to_vec());
        break;
    }

    let bytes = archive.ok_or_else(|| TokLensError::InvalidParams {
        message: format!("missing form field '{UPLOAD_FIELD}'"),
    })?;

    let upload = tokio::task::spawn_blocking(move || ArchiveUpload::from_bytes(bytes, limits))
        .await
        .map_err(TokLensError::from)??;
    let entries = upload.list_paths().len();
    let id = state.sessions.create(upload).await;
    state.metrics.lock().await.uploads_total += 1;
    tracing::info!("Session {} opened with {} archive entries", id, entries);

    Ok(Redirect::to(&format!("/s/{id}")))
}

fn multipart_error(err: axum::extract::multipart::MultipartError, limit: u64) -> TokLensError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        TokLensError::UploadTooLarge { limit_bytes: limit }
    } else {
        TokLensError::InvalidParams {
            message: format!("malformed upload: {}", err.body_text()),
        }
    }
}

/// End a session and return to the upload page
pub async fn end_session_handler(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> PageResult<Redirect> {
    let id = parse_session_id(&raw_id)?;
    if state.sessions.remove(id).await {
        tracing::info!("Session {} ended by user", id);
    }
    Ok(Redirect::to("/"))
}

pub async fn not_found_handler() -> Response {
    let body = r#"<main><section class="content"><div class="panel"><h2>404 Not Found</h2><p><a href="/">Back to upload</a></p></div></section></main>"#;
    (StatusCode::NOT_FOUND, layout("Not found", body)).into_response()
}

/// Per-session dashboard
pub async fn dashboard_handler(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    query: std::result::Result<Query<DashboardQuery>, QueryRejection>,
) -> PageResult<Html<String>> {
    let Loaded {
        handle,
        selection,
        engagement,
    } = load(&state, &raw_id, &DashboardQuery::from_extracted(query)?).await?;
    let tz = state.config.runtime.tz;
    let report = build_report(&engagement, selection.bucket, tz, TOP_REPEATS);

    let cards = render_cards(
        engagement.table(selection.tab.kind()),
        state.meta.as_ref(),
        selection.per_row,
        selection.n,
        tz,
        state.config.oembed.concurrency,
    )
    .await;

    let base = format!("/s/{}", handle.id);
    let current_qs = selection.query_string(selection.tab)?;

    let mut body = String::from("<main>");
    body.push_str(&sidebar(&base, &selection, handle.upload.list_paths()));
    body.push_str(r#"<section class="content">"#);

    if engagement.watched.is_empty() && engagement.liked.is_empty() {
        body.push_str(
            r#"<div class="panel note">No Date/Link pairs found in the selected entries and date range. Pick other entries on the left.</div>"#,
        );
    }

    body.push_str(&tiles(&report, tz));
    body.push_str(&charts(&report));

    let _ = write!(body, r#"<div class="panel"><div class="tabs">"#);
    for tab in [Tab::Watched, Tab::Liked] {
        let qs = selection.query_string(tab)?;
        let _ = write!(
            body,
            r#"<a href="{}"{}>{} ({})</a>"#,
            escape_html(&format!("{base}?{qs}")),
            if tab == selection.tab {
                r#" class="active""#
            } else {
                ""
            },
            tab.label(),
            engagement.table(tab.kind()).len(),
        );
    }
    body.push_str("</div>");
    body.push_str(&cards);
    body.push_str("</div>");

    body.push_str(&repeats_table(&report, tz));

    let _ = write!(
        body,
        r#"<div class="panel note">Export: <a href="{json}">metrics JSON</a> · <a href="{csv}">{tab} CSV</a> · archive {fp} ({size} bytes), session opened {opened}</div>"#,
        json = escape_html(&format!("/api/s/{}/metrics?{current_qs}", handle.id)),
        csv = escape_html(&format!("/api/s/{}/export.csv?{current_qs}", handle.id)),
        tab = selection.tab.label(),
        fp = escape_html(&handle.upload.fingerprint()[..12]),
        size = handle.upload.size(),
        opened = format_ts(&handle.created_at, tz),
    );
    body.push_str("</section></main>");

    Ok(layout(PAGE_TITLE, &body))
}

fn options(paths: &[String], selected: &str) -> String {
    let mut html = String::new();
    for p in paths {
        let _ = write!(
            html,
            r#"<option value="{v}"{s}>{v}</option>"#,
            v = escape_html(p),
            s = if p == selected { " selected" } else { "" },
        );
    }
    html
}

fn sidebar(base: &str, sel: &Selection, paths: &[String]) -> String {
    let day = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
    let bucket_opts: String = [(Bucket::Day, "Day"), (Bucket::Week, "Week"), (Bucket::Month, "Month")]
        .iter()
        .map(|(b, label)| {
            format!(
                r#"<option value="{v}"{s}>{label}</option>"#,
                v = label.to_lowercase(),
                s = if *b == sel.bucket { " selected" } else { "" },
            )
        })
        .collect();

    format!(
        r#"<aside><form method="get" action="{base}">
<input type="hidden" name="tab" value="{tab}">
<label>Watch History entry<select name="watch">{watch}</select></label>
<label>Like List entry<select name="likes">{likes}</select></label>
<label>From<input type="date" name="from" value="{from}"></label>
<label>To<input type="date" name="to" value="{to}"></label>
<label>Group activity by<select name="bucket">{bucket_opts}</select></label>
<label>Cards per row: <output>{per_row}</output><input type="range" name="per_row" min="{pr_min}" max="{pr_max}" step="1" value="{per_row}" oninput="this.previousElementSibling.value=this.value"></label>
<label>Number of clips: <output>{n}</output><input type="range" name="n" min="{n_min}" max="{n_max}" step="{n_step}" value="{n}" oninput="this.previousElementSibling.value=this.value"></label>
<p><button type="submit">Apply</button></p>
</form>
<form method="post" action="{base}/end"><button type="submit">End session</button></form>
<p class="note">Uploads live in memory only and are discarded when the session ends.</p></aside>"#,
        base = escape_html(base),
        tab = match sel.tab {
            Tab::Watched => "watched",
            Tab::Liked => "liked",
        },
        watch = options(paths, &sel.watch),
        likes = options(paths, &sel.likes),
        from = day(sel.from),
        to = day(sel.to),
        per_row = sel.per_row,
        n = sel.n,
        pr_min = CARDS_PER_ROW_MIN,
        pr_max = CARDS_PER_ROW_MAX,
        n_min = NUM_CARDS_MIN,
        n_max = NUM_CARDS_MAX,
        n_step = NUM_CARDS_STEP,
    )
}

fn format_ts(ts: &DateTime<Utc>, tz: Tz) -> String {
    let local = ts.with_timezone(&tz);
    format!("{} {}", local.format("%Y-%m-%d %H:%M"), local.format("%Z"))
}

fn span(s: &Summary, tz: Tz) -> String {
    match (s.first, s.last) {
        (Some(first), Some(last)) => {
            let f = first.with_timezone(&tz).date_naive();
            let l = last.with_timezone(&tz).date_naive();
            format!("{f} → {l}")
        }
        _ => "n/a".to_string(),
    }
}

fn tiles(report: &Report, tz: Tz) -> String {
    let w = &report.watched;
    let l = &report.liked;
    let items = [
        ("Clips watched", w.total.to_string()),
        ("Distinct clips", w.unique_clips.to_string()),
        ("Active days", w.active_days.to_string()),
        ("Per active day", format!("{:.1}", w.avg_per_active_day)),
        ("Longest streak", format!("{} d", w.longest_streak_days)),
        ("Current streak", format!("{} d", w.current_streak_days)),
        ("Clips liked", l.total.to_string()),
        (
            "Liked after watching",
            format!("{:.1}%", report.overlap.like_rate * 100.0),
        ),
    ];
    let mut html = String::from(r#"<div class="tiles" style="margin-bottom:20px">"#);
    for (k, v) in items {
        let _ = write!(
            html,
            r#"<div class="tile"><div class="v">{}</div><div class="k">{}</div></div>"#,
            escape_html(&v),
            escape_html(k)
        );
    }
    let _ = write!(
        html,
        r#"<div class="tile"><div class="v" style="font-size:14px">{}</div><div class="k">Watch span ({})</div></div></div>"#,
        escape_html(&span(w, tz)),
        escape_html(&report.timezone)
    );
    html
}

fn charts(report: &Report) -> String {
    let unit = match report.bucket {
        Bucket::Day => "day",
        Bucket::Week => "week",
        Bucket::Month => "month",
    };
    let watched_style = ChartStyle::default();
    let liked_style = ChartStyle {
        color: LIKED_COLOR,
        ..ChartStyle::default()
    };
    let half = ChartStyle {
        width: 360,
        ..ChartStyle::default()
    };
    format!(
        r#"<div class="panel">{}{}</div><div class="panel" style="display:flex;gap:12px"><div style="flex:1">{}</div><div style="flex:1">{}</div></div>"#,
        bar_chart(
            &format!("Clips watched per {unit}"),
            &series_bars(&report.watched_series, report.bucket),
            &watched_style
        ),
        bar_chart(
            &format!("Clips liked per {unit}"),
            &series_bars(&report.liked_series, report.bucket),
            &liked_style
        ),
        bar_chart(
            "Watching by hour of day",
            &hour_bars(&report.watched_hours),
            &half
        ),
        bar_chart(
            "Watching by weekday",
            &weekday_bars(&report.watched_weekdays),
            &half
        ),
    )
}

fn repeats_table(report: &Report, tz: Tz) -> String {
    if report.top_repeats.is_empty() {
        return String::new();
    }
    let mut html = String::from(
        r#"<div class="panel"><h3>Most rewatched</h3><table><tr><th>Clip</th><th>Views</th><th>Last seen</th></tr>"#,
    );
    for r in &report.top_repeats {
        let _ = write!(
            html,
            r#"<tr><td><a href="{url}" target="_blank" rel="noopener">{label}</a></td><td>{count}</td><td>{seen}</td></tr>"#,
            url = escape_html(&r.url),
            label = escape_html(r.video_id.as_deref().unwrap_or(&r.url)),
            count = r.count,
            seen = escape_html(&format_ts(&r.last_seen, tz)),
        );
    }
    html.push_str("</table></div>");
    html
}
