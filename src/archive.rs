//! Upload intake for TikTok data export archives
//!
//! An upload is kept as raw bytes plus its entry listing. Entries are decoded
//! lazily, one at a time, when a selection is parsed.

use crate::config::ArchiveLimits;
use crate::error::{Result, TokLensError};
use serde::Serialize;
use std::io::{Cursor, Read};
use std::sync::Arc;
use strsim::jaro_winkler;

/// Which log a selector points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    WatchHistory,
    LikeList,
}

impl EntryKind {
    pub fn label(self) -> &'static str {
        match self {
            EntryKind::WatchHistory => "Watch History",
            EntryKind::LikeList => "Like List",
        }
    }

    fn known_names(self) -> &'static [&'static str] {
        match self {
            EntryKind::WatchHistory => &["watch history.txt", "browsing history.txt"],
            EntryKind::LikeList => &["like list.txt", "liked videos.txt"],
        }
    }
}

const SHARED_JSON_NAMES: &[&str] = &["user_data.json", "user_data_tiktok.json"];
const GUESS_THRESHOLD: f64 = 0.80;

/// A ZIP export held in memory for the lifetime of a session
#[derive(Clone)]
pub struct ArchiveUpload {
    bytes: Arc<Vec<u8>>,
    fingerprint: String,
    paths: Vec<String>,
    max_entry_bytes: u64,
}

impl std::fmt::Debug for ArchiveUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveUpload")
            .field("fingerprint", &self.fingerprint)
            .field("size", &self.bytes.len())
            .field("entries", &self.paths.len())
            .finish()
    }
}

impl ArchiveUpload {
    /// Validate and index an uploaded archive
    pub fn from_bytes(bytes: Vec<u8>, limits: ArchiveLimits) -> Result<Self> {
        if bytes.is_empty() {
            return Err(TokLensError::InvalidArchive {
                message: "upload is empty".to_string(),
            });
        }
        let size = bytes.len() as u64;
        if size > limits.max_upload_bytes {
            return Err(TokLensError::UploadTooLarge {
                limit_bytes: limits.max_upload_bytes,
            });
        }

        let mut zip = zip::ZipArchive::new(Cursor::new(bytes.as_slice()))?;
        let mut paths = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let entry = zip.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            paths.push(entry.name().to_string());
        }
        drop(zip);

        let fingerprint = blake3::hash(&bytes).to_hex().to_string();
        tracing::debug!(
            "Indexed archive {} ({} bytes, {} entries)",
            &fingerprint[..12],
            size,
            paths.len()
        );

        Ok(Self {
            bytes: Arc::new(bytes),
            fingerprint,
            paths,
            max_entry_bytes: limits.max_entry_bytes,
        })
    }

    /// Entry names in archive order, directories excluded
    pub fn list_paths(&self) -> &[String] {
        &self.paths
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Read one entry as text; invalid UTF-8 becomes U+FFFD
    pub fn read_text(&self, path: &str) -> Result<String> {
        let mut zip = zip::ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let entry = match zip.by_name(path) {
            Ok(e) => e,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(TokLensError::EntryNotFound {
                    path: path.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if entry.size() > self.max_entry_bytes {
            return Err(TokLensError::EntryTooLarge {
                path: path.to_string(),
                limit_bytes: self.max_entry_bytes,
            });
        }

        // Header sizes can lie; cap the actual read one byte past the limit.
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.take(self.max_entry_bytes + 1).read_to_end(&mut buf)?;
        if buf.len() as u64 > self.max_entry_bytes {
            return Err(TokLensError::EntryTooLarge {
                path: path.to_string(),
                limit_bytes: self.max_entry_bytes,
            });
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Default selector value for `kind`
    pub fn guess_entry(&self, kind: EntryKind) -> Option<&str> {
        guess_entry(&self.paths, kind)
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Pick the most plausible entry for `kind` among `paths`
///
/// Known export file names win, then the shared JSON export, then the closest
/// file stem by Jaro-Winkler similarity, then the first entry.
pub fn guess_entry(paths: &[String], kind: EntryKind) -> Option<&str> {
    if let Some(p) = paths
        .iter()
        .find(|p| kind.known_names().contains(&file_name(p).to_lowercase().as_str()))
    {
        return Some(p.as_str());
    }

    if let Some(p) = paths
        .iter()
        .find(|p| SHARED_JSON_NAMES.contains(&file_name(p).to_lowercase().as_str()))
    {
        return Some(p.as_str());
    }

    let label = kind.label().to_lowercase();
    let best = paths
        .iter()
        .map(|p| (p, jaro_winkler(&file_stem(p).to_lowercase(), &label)))
        .filter(|(_, score)| *score >= GUESS_THRESHOLD)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    if let Some((p, _)) = best {
        return Some(p.as_str());
    }

    paths.first().map(|p| p.as_str())
}


#[cfg(test)]
mod tests {
    use super::test_support::build_zip;
    use super::*;

    fn limits() -> ArchiveLimits {
        ArchiveLimits {
            max_upload_bytes: 1024 * 1024,
            max_entry_bytes: 1024,
        }
    }

    #[test]
    fn test_lists_files_in_order_without_directories() {
        let bytes = build_zip(&[
            ("TikTok/", b""),
            ("TikTok/Activity/Watch History.txt", b"Date: x UTC"),
            ("TikTok/Activity/Like List.txt", b""),
        ]);
        let upload = ArchiveUpload::from_bytes(bytes, limits()).unwrap();
        assert_eq!(
            upload.list_paths(),
            &[
                "TikTok/Activity/Watch History.txt".to_string(),
                "TikTok/Activity/Like List.txt".to_string()
            ]
        );
        assert_eq!(upload.fingerprint().len(), 64);
    }

    #[test]
    fn test_rejects_empty_and_non_zip() {
        assert!(matches!(
            ArchiveUpload::from_bytes(Vec::new(), limits()),
            Err(TokLensError::InvalidArchive { .. })
        ));
        assert!(matches!(
            ArchiveUpload::from_bytes(b"definitely not a zip".to_vec(), limits()),
            Err(TokLensError::InvalidArchive { .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_upload() {
        let bytes = build_zip(&[("a.txt", b"hello")]);
        let tiny = ArchiveLimits {
            max_upload_bytes: 10,
            max_entry_bytes: 10,
        };
        assert!(matches!(
            ArchiveUpload::from_bytes(bytes, tiny),
            Err(TokLensError::UploadTooLarge { .. })
        ));
    }

    #[test]
    fn test_read_text_replaces_invalid_utf8() {
        let bytes = build_zip(&[("log.txt", b"Date: 2024\xff UTC")]);
        let upload = ArchiveUpload::from_bytes(bytes, limits()).unwrap();
        let text = upload.read_text("log.txt").unwrap();
        assert!(text.contains('\u{FFFD}'));
        assert!(text.starts_with("Date: 2024"));
    }

    #[test]
    fn test_read_text_missing_and_too_large() {
        let big = vec![b'a'; 4096];
        let bytes = build_zip(&[("big.txt", &big)]);
        let upload = ArchiveUpload::from_bytes(bytes, limits()).unwrap();
        assert!(matches!(
            upload.read_text("nope.txt"),
            Err(TokLensError::EntryNotFound { .. })
        ));
        assert!(matches!(
            upload.read_text("big.txt"),
            Err(TokLensError::EntryTooLarge { .. })
        ));
    }

    #[test]
    fn test_guess_entry_prefers_known_names() {
        let paths: Vec<String> = [
            "TikTok/Profile/Profile Info.txt",
            "TikTok/Activity/Like List.txt",
            "TikTok/Activity/Watch History.txt",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(
            guess_entry(&paths, EntryKind::WatchHistory),
            Some("TikTok/Activity/Watch History.txt")
        );
        assert_eq!(
            guess_entry(&paths, EntryKind::LikeList),
            Some("TikTok/Activity/Like List.txt")
        );
    }

    #[test]
    fn test_guess_entry_fuzzy_then_first() {
        let paths: Vec<String> = ["export/readme.md", "export/watch_history_2024.txt"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            guess_entry(&paths, EntryKind::WatchHistory),
            Some("export/watch_history_2024.txt")
        );

        let unrelated: Vec<String> = vec!["a/zzz.bin".to_string(), "b/qqq.bin".to_string()];
        assert_eq!(guess_entry(&unrelated, EntryKind::LikeList), Some("a/zzz.bin"));
        assert_eq!(guess_entry(&[], EntryKind::LikeList), None);
    }
}
