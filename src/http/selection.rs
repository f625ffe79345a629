//! Dashboard query parameters and their resolution against an upload

use crate::archive::{ArchiveUpload, EntryKind};
use crate::cards::{clamp_cards_per_row, clamp_num_cards};
use crate::config::DisplayConfig;
use crate::error::{Result, TokLensError};
use crate::http::AppState;
use crate::metrics::Bucket;
use crate::parse::Engagement;
use crate::session::{SessionHandle, SessionId};
use axum::extract::{Query, rejection::QueryRejection};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which log the card grid and CSV export show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Watched,
    Liked,
}

impl Tab {
    pub fn kind(self) -> EntryKind {
        match self {
            Tab::Watched => EntryKind::WatchHistory,
            Tab::Liked => EntryKind::LikeList,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tab::Watched => "Watched",
            Tab::Liked => "Liked",
        }
    }
}

/// Raw query string of `/s/{id}` and the `/api/s/{id}/*` routes
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DashboardQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<Tab>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<Bucket>,
}

/// A validated selection
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub watch: String,
    pub likes: String,
    pub tab: Tab,
    pub per_row: usize,
    pub n: usize,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub bucket: Bucket,
}

fn parse_day(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| TokLensError::InvalidParams {
                message: format!("{field} must be YYYY-MM-DD, got {s:?}"),
            }),
    }
}

fn pick_entry(upload: &ArchiveUpload, requested: Option<&str>, kind: EntryKind) -> Result<String> {
    match requested.filter(|s| !s.is_empty()) {
        Some(path) if upload.contains(path) => Ok(path.to_string()),
        Some(path) => Err(TokLensError::EntryNotFound {
            path: path.to_string(),
        }),
        None => upload
            .guess_entry(kind)
            .map(str::to_string)
            .ok_or_else(|| TokLensError::InvalidArchive {
                message: "archive contains no files".to_string(),
            }),
    }
}

impl DashboardQuery {
    /// Unwrap an extracted query, turning a malformed one into a 400
    pub fn from_extracted(
        query: std::result::Result<Query<DashboardQuery>, QueryRejection>,
    ) -> Result<Self> {
        query.map(|Query(q)| q).map_err(TokLensError::from)
    }

    /// Fill defaults, clamp controls, and check paths exist in the upload
    pub fn resolve(&self, upload: &ArchiveUpload, display: &DisplayConfig) -> Result<Selection> {
        let from = parse_day("from", self.from.as_deref())?;
        let to = parse_day("to", self.to.as_deref())?;
        if let (Some(f), Some(t)) = (from, to)
            && f > t
        {
            return Err(TokLensError::InvalidParams {
                message: format!("from ({f}) is after to ({t})"),
            });
        }

        Ok(Selection {
            watch: pick_entry(upload, self.watch.as_deref(), EntryKind::WatchHistory)?,
            likes: pick_entry(upload, self.likes.as_deref(), EntryKind::LikeList)?,
            tab: self.tab.unwrap_or_default(),
            per_row: clamp_cards_per_row(self.per_row.unwrap_or(display.cards_per_row)),
            n: clamp_num_cards(self.n.unwrap_or(display.num_cards)),
            from,
            to,
            bucket: self.bucket.unwrap_or_default(),
        })
    }
}

impl Selection {
    /// Query string that reproduces this selection with another tab
    pub fn query_string(&self, tab: Tab) -> Result<String> {
        let q = DashboardQuery {
            watch: Some(self.watch.clone()),
            likes: Some(self.likes.clone()),
            tab: Some(tab),
            per_row: Some(self.per_row),
            n: Some(self.n),
            from: self.from.map(|d| d.to_string()),
            to: self.to.map(|d| d.to_string()),
            bucket: Some(self.bucket),
        };
        serde_qs::to_string(&q).map_err(|e| TokLensError::Internal {
            message: format!("Failed to encode query: {}", e),
        })
    }
}

/// Unknown and malformed ids are both "not found"
pub fn parse_session_id(raw: &str) -> Result<SessionId> {
    SessionId::parse_str(raw).map_err(|_| TokLensError::SessionNotFound {
        id: raw.to_string(),
    })
}

/// A session with its resolved selection and the date-filtered logs
pub struct Loaded {
    pub handle: SessionHandle,
    pub selection: Selection,
    pub engagement: Engagement,
}

/// Shared front half of the dashboard and API routes
pub async fn load(state: &AppState, raw_id: &str, query: &DashboardQuery) -> Result<Loaded> {
    let id = parse_session_id(raw_id)?;
    let handle = state.sessions.get(id).await?;
    let selection = query.resolve(&handle.upload, &state.config.display)?;
    let parsed = state
        .sessions
        .engagement(id, &selection.watch, &selection.likes)
        .await?;
    let engagement = parsed.filter_dates(selection.from, selection.to, state.config.runtime.tz);
    Ok(Loaded {
        handle,
        selection,
        engagement,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::build_zip;
    use crate::config::ArchiveLimits;

    fn upload() -> ArchiveUpload {
        let bytes = build_zip(&[
            ("TikTok/Watch History.txt", b""),
            ("TikTok/Like List.txt", b""),
            ("TikTok/Other.txt", b""),
        ]);
        ArchiveUpload::from_bytes(
            bytes,
            ArchiveLimits {
                max_upload_bytes: 1 << 20,
                max_entry_bytes: 1 << 20,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_are_guessed_and_clamped() {
        let q = DashboardQuery {
            per_row: Some(7),
            n: Some(10),
            from: Some(String::new()),
            ..Default::default()
        };
        let sel = q.resolve(&upload(), &DisplayConfig::default()).unwrap();
        assert_eq!(sel.watch, "TikTok/Watch History.txt");
        assert_eq!(sel.likes, "TikTok/Like List.txt");
        assert_eq!(sel.tab, Tab::Watched);
        assert_eq!(sel.per_row, 5);
        assert_eq!(sel.n, 8);
        assert_eq!(sel.from, None);
        assert_eq!(sel.bucket, Bucket::Day);
    }

    #[test]
    fn test_explicit_paths_must_exist() {
        let q = DashboardQuery {
            watch: Some("TikTok/Other.txt".to_string()),
            likes: Some("nope.txt".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            q.resolve(&upload(), &DisplayConfig::default()),
            Err(TokLensError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_date_validation() {
        let bad = DashboardQuery {
            from: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            bad.resolve(&upload(), &DisplayConfig::default()),
            Err(TokLensError::InvalidParams { .. })
        ));

        let reversed = DashboardQuery {
            from: Some("2024-02-01".to_string()),
            to: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        assert!(reversed.resolve(&upload(), &DisplayConfig::default()).is_err());
    }

    #[test]
    fn test_query_string_round_trips_through_serde_qs() {
        let q = DashboardQuery {
            from: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        let sel = q.resolve(&upload(), &DisplayConfig::default()).unwrap();
        let qs = sel.query_string(Tab::Liked).unwrap();
        assert!(qs.contains("tab=liked"));
        let back: DashboardQuery = serde_qs::from_str(&qs).unwrap();
        assert_eq!(back.watch.as_deref(), Some("TikTok/Watch History.txt"));
        assert_eq!(back.from.as_deref(), Some("2024-01-01"));
        assert_eq!(back.tab, Some(Tab::Liked));
    }

    #[test]
    fn test_parse_session_id() {
        assert!(parse_session_id("not-a-uuid").is_err());
        let id = uuid::Uuid::new_v4();
        assert_eq!(parse_session_id(&id.to_string()).unwrap(), id);
    }
}
