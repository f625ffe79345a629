//! JSON and CSV endpoints for a session

use super::AppState;
use super::selection::{DashboardQuery, Loaded, Tab, load, parse_session_id};
use crate::archive::EntryKind;
use crate::error::Result;
use crate::metrics::build_report;
use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::header,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

const TOP_REPEATS: usize = 25;

/// Entry listing and default selector picks
pub async fn paths_handler(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>> {
    let id = parse_session_id(&raw_id)?;
    let handle = state.sessions.get(id).await?;
    let upload = &handle.upload;
    Ok(Json(json!({
        "session": id,
        "fingerprint": upload.fingerprint(),
        "size_bytes": upload.size(),
        "created_at": handle.created_at,
        "paths": upload.list_paths(),
        "defaults": {
            "watch": upload.guess_entry(EntryKind::WatchHistory),
            "likes": upload.guess_entry(EntryKind::LikeList)
        }
    })))
}

/// Aggregate report for the selection in the query string
pub async fn metrics_handler(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    query: std::result::Result<Query<DashboardQuery>, QueryRejection>,
) -> Result<Json<Value>> {
    let Loaded {
        selection,
        engagement,
        ..
    } = load(&state, &raw_id, &DashboardQuery::from_extracted(query)?).await?;
    let report = build_report(
        &engagement,
        selection.bucket,
        state.config.runtime.tz,
        TOP_REPEATS,
    );
    Ok(Json(json!({
        "selection": {
            "watch": selection.watch,
            "likes": selection.likes,
            "from": selection.from,
            "to": selection.to,
            "bucket": selection.bucket
        },
        "report": report
    })))
}

/// Selected table as CSV
pub async fn export_csv_handler(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    query: std::result::Result<Query<DashboardQuery>, QueryRejection>,
) -> Result<Response> {
    let Loaded {
        selection,
        engagement,
        ..
    } = load(&state, &raw_id, &DashboardQuery::from_extracted(query)?).await?;
    let csv = engagement.table(selection.tab.kind()).to_csv()?;
    let filename = match selection.tab {
        Tab::Watched => "watched.csv",
        Tab::Liked => "liked.csv",
    };
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        csv,
    )
        .into_response())
}
