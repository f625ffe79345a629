mod common;

use common::{build_zip, sample_export};
use tok_lens::archive::{ArchiveUpload, EntryKind};
use tok_lens::config::Config;
use tok_lens::inspect::{InspectOptions, inspect_archive, paths_table};
use tok_lens::metrics::Bucket;
use tok_lens::TokLensError;

fn write_export(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn test_inspect_from_disk_with_timezone() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_export(&dir, "export.zip", &sample_export());

    let mut config = Config::default();
    config.display.timezone = "Asia/Tokyo".to_string();
    config.finalize().unwrap();

    let opts = InspectOptions {
        bucket: Bucket::Day,
        top: 3,
        ..Default::default()
    };
    let out = inspect_archive(std::fs::read(&path).unwrap(), &config, &opts).unwrap();
    assert_eq!(out.report.timezone, "Asia/Tokyo");
    // 2024-03-01 21:14 UTC is already 03-02 in Tokyo; every row lands on 03-02
    assert_eq!(out.report.watched.active_days, 1);
    assert_eq!(out.report.watched_series.len(), 1);
    assert_eq!(out.report.watched_series[0].count, 3);

    let csv = out.engagement.liked.to_csv().unwrap();
    assert_eq!(csv.lines().count(), 2);
}

#[test]
fn test_inspect_explicit_entries() {
    let zip = build_zip(&[
        (
            "a/log one.txt",
            b"Date: 2024-01-01 00:00:00 UTC\nLink: https://x.test/video/1/\n",
        ),
        ("a/log two.txt", b"nothing to see"),
    ]);
    let opts = InspectOptions {
        watch: Some("a/log two.txt".to_string()),
        likes: Some("a/log one.txt".to_string()),
        top: 3,
        ..Default::default()
    };
    let out = inspect_archive(zip.clone(), &Config::default(), &opts).unwrap();
    assert_eq!(out.report.watched.total, 0);
    assert_eq!(out.report.liked.total, 1);
    assert_eq!(out.report.overlap.like_rate, 0.0);

    let missing = InspectOptions {
        watch: Some("a/missing.txt".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        inspect_archive(zip, &Config::default(), &missing),
        Err(TokLensError::EntryNotFound { .. })
    ));
}

#[test]
fn test_non_utf8_entry_still_parses() {
    let mut watch = b"Date: 2024-02-02 10:00:00 UTC\nLink: https://x.test/video/9/\n\xfe\xff junk\n".to_vec();
    watch.extend_from_slice(b"Date: 2024-02-03 10:00:00 UTC\nLink: https://x.test/video/10/\n");
    let zip = build_zip(&[("Watch History.txt", &watch), ("Like List.txt", b"")]);
    let out = inspect_archive(
        zip,
        &Config::default(),
        &InspectOptions {
            top: 1,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(out.report.watched.total, 2);
    assert_eq!(out.report.watched.longest_streak_days, 2);
}

#[test]
fn test_paths_listing_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_export(&dir, "export.zip", &sample_export());
    let upload =
        ArchiveUpload::from_bytes(std::fs::read(&path).unwrap(), Config::default().limits())
            .unwrap();
    assert_eq!(
        upload.guess_entry(EntryKind::WatchHistory),
        Some("TikTok/Activity/Watch History.txt")
    );
    let table = paths_table(&upload);
    assert!(table.contains("Profile Info.txt"));
}
