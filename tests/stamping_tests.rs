//! Integration tests for the filter run: gating, detection, rewriting and
//! persistence of real message files.

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

use mimestamp::config::{ArchiveConfig, Config};
use mimestamp::error::StampError;
use mimestamp::model::part::{Message, MessagePart};
use mimestamp::parser::mime::parse_message;
use mimestamp::stamp::process::{process_mail_file, Outcome, SkipReason};

const JPEG: [u8; 6] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
const REFERENCE_7BIT: &str = "<br /><img src=\"cid:banner.jpg@corp.example\"><br />";
const REFERENCE_QP: &str = "<br /><img src=3D\"cid:banner.jpg@corp.example\"><br />";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Temp dir with the image stored as `version`, and a config pointing at it.
fn setup(version: &str) -> (TempDir, Config) {
    let temp = TempDir::new().unwrap();
    let images = temp.child("images");
    images.create_dir_all().unwrap();

    let mut config = Config::default();
    config.filter.target_domain = "@corp.example".to_string();
    config.image.directory = images.path().to_path_buf();
    config.image.base_filename = "banner.jpg".to_string();
    config.image.cid_domain = "corp.example".to_string();
    config.archive = ArchiveConfig {
        save_processed: false,
        directory: None,
    };
    use_version(&temp, &mut config, version);
    (temp, config)
}

fn use_version(temp: &TempDir, config: &mut Config, version: &str) {
    temp.child("images").child(version).write_binary(&JPEG).unwrap();
    config.image.filename = version.to_string();
}

/// Copy a fixture into the temp dir and return its path.
fn stage(temp: &TempDir, name: &str) -> PathBuf {
    let child = temp.child(name);
    child.write_binary(&std::fs::read(fixture(name)).unwrap()).unwrap();
    child.path().to_path_buf()
}

fn reparse(path: &Path) -> Message {
    parse_message(&std::fs::read(path).unwrap()).unwrap()
}

fn body_text(part: &MessagePart) -> String {
    String::from_utf8(part.body().unwrap().to_vec()).unwrap()
}

fn count_images(part: &MessagePart) -> usize {
    let own = usize::from(part.content_type() == "image/jpeg");
    own + part
        .children()
        .unwrap_or_default()
        .iter()
        .map(count_images)
        .sum::<usize>()
}

// ─── Insertion shapes ──────────────────────────────────────────────

#[test]
fn test_alternative_gets_new_related_container() {
    let (temp, config) = setup("02banner.jpg");
    let path = stage(&temp, "alternative_7bit.eml");
    let original = parse_message(&std::fs::read(&path).unwrap()).unwrap();

    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(report.outcome, Outcome::Inserted);
    assert!(report.written);

    let msg = reparse(&path);
    assert_eq!(msg.root.content_type(), "multipart/alternative");
    assert_eq!(msg.root.headers(), original.root.headers());

    let children = msg.root.children().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0], original.root.children().unwrap()[0]);

    let related = &children[1];
    assert_eq!(related.content_type(), "multipart/related");
    let inner = related.children().unwrap();
    assert_eq!(inner.len(), 2);

    let html = body_text(&inner[0]);
    assert!(html.contains(REFERENCE_7BIT));
    assert!(!html.contains("IMAGEHEREPLACEHOLDER"));

    assert_eq!(inner[1].content_type(), "image/jpeg");
    assert_eq!(
        inner[1].header("Content-ID").as_deref(),
        Some("<banner.jpg@corp.example>")
    );
    assert_eq!(
        inner[1].header("Content-Disposition").as_deref(),
        Some("attachment; filename=\"02banner.jpg\"")
    );
    assert_eq!(inner[1].body(), Some(&b"/9j/4AAQ\n"[..]));
}

#[test]
fn test_related_gets_image_as_sibling() {
    let (temp, config) = setup("02banner.jpg");
    let path = stage(&temp, "related_qp.eml");

    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(report.outcome, Outcome::Inserted);

    let msg = reparse(&path);
    let children = msg.root.children().unwrap();
    assert_eq!(msg.root.content_type(), "multipart/related");
    assert_eq!(children.len(), 3);
    assert!(body_text(&children[0]).contains(REFERENCE_QP));
    assert_eq!(children[1].content_type(), "image/jpeg");
    assert_eq!(children[2].content_type(), "image/png");
    assert!(children.iter().all(|c| !c.is_multipart()));
}

#[test]
fn test_other_parent_gets_no_image() {
    let (temp, config) = setup("02banner.jpg");
    let path = stage(&temp, "mixed_html.eml");

    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(report.outcome, Outcome::Inserted);
    assert!(report.written);

    let msg = reparse(&path);
    assert_eq!(msg.root.children().unwrap().len(), 2);
    assert_eq!(count_images(&msg.root), 0);
    temp.child("mixed_html.eml")
        .assert(predicate::str::contains(REFERENCE_7BIT))
        .assert(predicate::str::contains("IMAGEHEREPLACEHOLDER").not());
}

#[test]
fn test_crlf_message_stays_crlf() {
    let (temp, config) = setup("02banner.jpg");
    let lf = std::fs::read_to_string(fixture("alternative_7bit.eml")).unwrap();
    let path = temp.child("crlf.eml");
    path.write_str(&lf.replace('\n', "\r\n")).unwrap();

    let report = process_mail_file(path.path(), &config).unwrap();
    assert_eq!(report.outcome, Outcome::Inserted);

    let out = std::fs::read(path.path()).unwrap();
    for (i, &b) in out.iter().enumerate() {
        if b == b'\n' {
            assert!(i > 0 && out[i - 1] == b'\r', "bare LF at byte {i}");
        }
    }
}

// ─── Gating ────────────────────────────────────────────────────────

#[test]
fn test_non_multipart_is_untouched() {
    let (temp, config) = setup("02banner.jpg");
    let path = stage(&temp, "plain.eml");

    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(report.outcome, Outcome::Skipped(SkipReason::NotMultipart));
    assert!(!report.written);
    assert_eq!(
        std::fs::read(&path).unwrap(),
        std::fs::read(fixture("plain.eml")).unwrap()
    );
}

#[test]
fn test_internal_mail_is_untouched() {
    let (temp, config) = setup("02banner.jpg");
    let path = stage(&temp, "internal.eml");

    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(report.outcome, Outcome::Skipped(SkipReason::Internal));
    temp.child("internal.eml")
        .assert(predicate::str::contains("IMAGEHEREPLACEHOLDER"));
}

#[test]
fn test_blacklist_then_whitelist_then_receiver_blacklist() {
    let (temp, mut config) = setup("02banner.jpg");
    let path = stage(&temp, "alternative_7bit.eml");

    config.filter.sender_blacklist = vec!["partner.org".into()];
    config.filter.sender_whitelist = vec!["client@".into()];
    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(
        report.outcome,
        Outcome::Skipped(SkipReason::SenderBlacklisted("partner.org".into()))
    );

    config.filter.sender_blacklist.clear();
    config.filter.sender_whitelist = vec!["someone@".into()];
    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(report.outcome, Outcome::Skipped(SkipReason::NotWhitelisted));

    config.filter.sender_whitelist = vec!["client@".into()];
    config.filter.receiver_blacklist = vec!["<client@partner.org>".into()];
    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(
        report.outcome,
        Outcome::Skipped(SkipReason::ReceiverBlacklisted("<client@partner.org>".into()))
    );

    assert_eq!(
        std::fs::read(&path).unwrap(),
        std::fs::read(fixture("alternative_7bit.eml")).unwrap()
    );
}

// ─── Existing image ────────────────────────────────────────────────

#[test]
fn test_second_run_is_a_no_op() {
    let (temp, config) = setup("02banner.jpg");
    let path = stage(&temp, "alternative_7bit.eml");

    assert_eq!(process_mail_file(&path, &config).unwrap().outcome, Outcome::Inserted);
    let after_first = std::fs::read(&path).unwrap();

    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(report.outcome, Outcome::AlreadyCurrent);
    assert!(!report.written);
    assert_eq!(std::fs::read(&path).unwrap(), after_first);
}

#[test]
fn test_new_version_refreshes_image() {
    let (temp, mut config) = setup("01banner.jpg");
    let path = stage(&temp, "related_qp.eml");
    assert_eq!(process_mail_file(&path, &config).unwrap().outcome, Outcome::Inserted);

    use_version(&temp, &mut config, "02banner.jpg");
    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(report.outcome, Outcome::Refreshed);
    assert!(report.written);

    let msg = reparse(&path);
    assert_eq!(count_images(&msg.root), 1);
    temp.child("related_qp.eml")
        .assert(predicate::str::contains("filename=\"02banner.jpg\""))
        .assert(predicate::str::contains("01banner.jpg").not());

    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(report.outcome, Outcome::AlreadyCurrent);
}

#[test]
fn test_stale_image_swapped_in_place() {
    let (temp, config) = setup("02banner.jpg");
    let path = stage(&temp, "stale_image.eml");
    let original = parse_message(&std::fs::read(&path).unwrap()).unwrap();

    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(report.outcome, Outcome::Refreshed);

    let msg = reparse(&path);
    let children = msg.root.children().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0], original.root.children().unwrap()[0]);

    let related = children[1].children().unwrap();
    assert_eq!(related.len(), 2);
    assert_eq!(related[0], original.root.children().unwrap()[1].children().unwrap()[0]);
    assert_eq!(
        related[1].header("Content-Disposition").as_deref(),
        Some("attachment; filename=\"02banner.jpg\"")
    );
}

#[test]
fn test_current_image_short_circuits() {
    let (temp, config) = setup("02banner.jpg");
    let path = stage(&temp, "current_image.eml");

    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(report.outcome, Outcome::AlreadyCurrent);
    assert!(!report.written);
    // The unrelated placeholder in the other branch stays.
    assert_eq!(
        std::fs::read(&path).unwrap(),
        std::fs::read(fixture("current_image.eml")).unwrap()
    );
}

#[test]
fn test_base64_html_is_left_alone() {
    let (temp, config) = setup("02banner.jpg");
    let path = stage(&temp, "base64_html.eml");

    let report = process_mail_file(&path, &config).unwrap();
    assert_eq!(report.outcome, Outcome::NoPlaceholder);
    assert!(!report.written);
}

#[test]
fn test_unchanged_messages_need_no_image_file() {
    let (temp, config) = setup("02banner.jpg");
    std::fs::remove_file(temp.child("images").child("02banner.jpg").path()).unwrap();

    for (name, expected) in [
        ("current_image.eml", Outcome::AlreadyCurrent),
        ("base64_html.eml", Outcome::NoPlaceholder),
    ] {
        let path = stage(&temp, name);
        let report = process_mail_file(&path, &config).unwrap();
        assert_eq!(report.outcome, expected, "{name}");
        assert!(!report.written);
        assert_eq!(
            std::fs::read(&path).unwrap(),
            std::fs::read(fixture(name)).unwrap()
        );
    }
}

// ─── Persistence ───────────────────────────────────────────────────

#[test]
fn test_dry_run_never_writes() {
    let (temp, mut config) = setup("02banner.jpg");
    config.general.dry_run = true;

    for name in ["alternative_7bit.eml", "stale_image.eml"] {
        let path = stage(&temp, name);
        let report = process_mail_file(&path, &config).unwrap();
        assert!(report.outcome.modifies_message(), "{name}: {}", report.outcome);
        assert!(!report.written);
        assert_eq!(
            std::fs::read(&path).unwrap(),
            std::fs::read(fixture(name)).unwrap()
        );
    }
}

#[test]
fn test_archive_keeps_input_and_output() {
    let (temp, mut config) = setup("02banner.jpg");
    let archive = temp.child("archive");
    config.archive = ArchiveConfig {
        save_processed: true,
        directory: Some(archive.path().to_path_buf()),
    };
    let path = stage(&temp, "alternative_7bit.eml");

    process_mail_file(&path, &config).unwrap();

    let copies: Vec<PathBuf> = std::fs::read_dir(archive.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    let find = |suffix: &str| {
        copies
            .iter()
            .find(|p| p.to_string_lossy().ends_with(suffix))
            .cloned()
            .unwrap_or_else(|| panic!("no {suffix} copy in {copies:?}"))
    };
    assert_eq!(
        std::fs::read(find(".input.eml")).unwrap(),
        std::fs::read(fixture("alternative_7bit.eml")).unwrap()
    );
    assert_eq!(
        std::fs::read(find(".output.eml")).unwrap(),
        std::fs::read(&path).unwrap()
    );
}

#[test]
fn test_parse_failure_saves_error_copy() {
    let (temp, mut config) = setup("02banner.jpg");
    let archive = temp.child("archive");
    config.archive.directory = Some(archive.path().to_path_buf());

    let input = temp.child("broken.eml");
    input.write_str("\n\n   \n").unwrap();

    let err = process_mail_file(input.path(), &config).unwrap_err();
    assert!(matches!(err, StampError::ParseFailure(_)));

    let names: Vec<String> = std::fs::read_dir(archive.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with(".error.eml"));
}

#[test]
fn test_missing_image_fails_without_writing() {
    let (temp, mut config) = setup("02banner.jpg");
    config.image.filename = "03banner.jpg".to_string();
    let path = stage(&temp, "alternative_7bit.eml");

    let err = process_mail_file(&path, &config).unwrap_err();
    assert!(matches!(err, StampError::MissingResource { .. }));
    assert_eq!(
        std::fs::read(&path).unwrap(),
        std::fs::read(fixture("alternative_7bit.eml")).unwrap()
    );
}

#[test]
fn test_missing_input_file() {
    let (temp, config) = setup("02banner.jpg");
    let err = process_mail_file(&temp.child("nope.eml").path().to_path_buf(), &config).unwrap_err();
    assert!(matches!(err, StampError::FileNotFound(_)));
}

#[test]
fn test_fixtures_roundtrip_unchanged() {
    for name in [
        "alternative_7bit.eml",
        "related_qp.eml",
        "mixed_html.eml",
        "plain.eml",
        "internal.eml",
        "current_image.eml",
        "stale_image.eml",
        "base64_html.eml",
    ] {
        let raw = std::fs::read(fixture(name)).unwrap();
        let msg = parse_message(&raw).unwrap();
        assert_eq!(msg.to_bytes(), raw, "{name} changed on round trip");
    }
}
