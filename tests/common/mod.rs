#![allow(dead_code)]

use std::io::Write;

pub const WATCH_TXT: &str = "\
Date: 2024-03-01 21:14:09 UTC
Link: https://www.tiktokv.com/share/video/7340000000000000001/

Date: 2024-03-02 08:00:00 UTC
Link: https://www.tiktokv.com/share/video/7340000000000000002/

Date: 2024-03-02 09:30:00 UTC
Link: https://www.tiktokv.com/share/video/7340000000000000001/

Date: not a date UTC
Link: https://www.tiktokv.com/share/video/7340000000000000003/
";

pub const LIKES_TXT: &str = "\
Date: 2024-03-02 08:01:00 UTC
Link: https://www.tiktokv.com/share/video/7340000000000000002/
";

/// In-memory ZIP from (name, bytes) pairs
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A small export shaped like the real TXT one
pub fn sample_export() -> Vec<u8> {
    build_zip(&[
        ("TikTok/Profile/Profile Info.txt", b"Username: someone\n"),
        (
            "TikTok/Activity/Watch History.txt",
            WATCH_TXT.as_bytes(),
        ),
        ("TikTok/Activity/Like List.txt", LIKES_TXT.as_bytes()),
    ])
}

pub const BOUNDARY: &str = "tok-lens-test-boundary";

/// multipart/form-data body with a single file field
pub fn multipart_body(field: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"export.zip\"\r\nContent-Type: application/zip\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}
