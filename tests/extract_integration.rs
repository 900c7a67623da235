//! Integration tests for secure extraction on realistic archives.

use std::io::Write;
use std::path::Path;

use harvester_core::extract::{ExtractError, ExtractOptions, SecureExtractor};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).expect("failed to create zip fixture");
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(name.trim_end_matches('/'), options)
                .unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap();
}

#[test]
fn test_extract_nested_archive_layout() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("pack.zip");
    build_zip(
        &archive,
        &[
            ("readme.txt", b"top level".as_slice()),
            ("assets/", b"".as_slice()),
            ("assets/icons/clock.svg", b"<svg/>".as_slice()),
            ("assets/themes/d\u{e9}faut.css", b"body {}".as_slice()),
        ],
    );

    let dest = tmp.path().join("out");
    let summary = SecureExtractor::new().extract(&archive, &dest).unwrap();

    assert_eq!(summary.files_written, 3);
    assert!(dest.join("readme.txt").exists());
    assert!(dest.join("assets/icons/clock.svg").exists());
    assert!(dest.join("assets/themes/d\u{e9}faut.css").exists());
}

#[test]
fn test_extract_is_repeatable() {
    // A second extraction of the same archive replaces the first cleanly.
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("pack.zip");
    build_zip(&archive, &[("data.txt", b"v1".as_slice())]);

    let dest = tmp.path().join("out");
    let extractor = SecureExtractor::new();
    extractor.extract(&archive, &dest).unwrap();
    extractor.extract(&archive, &dest).unwrap();

    assert_eq!(std::fs::read(dest.join("data.txt")).unwrap(), b"v1");
}

#[test]
fn test_extract_hostile_archive_never_touches_destination() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("hostile.zip");
    build_zip(
        &archive,
        &[
            ("fine.txt", b"fine".as_slice()),
            ("../../outside.txt", b"escape".as_slice()),
        ],
    );

    // A previous good extraction is already in place.
    let dest = tmp.path().join("out");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join("previous.txt"), b"keep me").unwrap();

    let result = SecureExtractor::new().extract(&archive, &dest);

    assert!(matches!(result, Err(ExtractError::Traversal { .. })));
    assert!(
        dest.join("previous.txt").exists(),
        "a failed extraction must leave the previous contents intact"
    );
    assert!(!tmp.path().join("outside.txt").exists());
}

#[test]
fn test_extract_small_caps_enforced_on_real_archive() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("bomb.zip");
    build_zip(
        &archive,
        &[
            ("a.bin", vec![0u8; 300].as_slice()),
            ("b.bin", vec![0u8; 300].as_slice()),
        ],
    );

    let dest = tmp.path().join("out");
    let result = SecureExtractor::with_options(ExtractOptions {
        per_file_cap: 1024,
        aggregate_cap: 500,
    })
    .extract(&archive, &dest);

    assert!(matches!(result, Err(ExtractError::TotalSizeExceeded { .. })));
    assert!(!dest.exists());
}

#[test]
fn test_extract_unsupported_format_fails_before_reading() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("pack.7z");
    std::fs::write(&archive, b"7z payload").unwrap();

    let result = SecureExtractor::new().extract(&archive, &tmp.path().join("out"));
    assert!(matches!(result, Err(ExtractError::UnsupportedFormat { .. })));
}
