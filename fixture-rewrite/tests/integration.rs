#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use std::fs;
use std::path::Path;

use fixture_rewrite::{FileChange, RewriteError, rewrite_dir};

const FROM: &str = "conneroisu/groq-go";
const TO: &str = "conneroisu/groq-go/pkg/schema";

fn write(dir: &Path, name: &str, content: &[u8]) {
    fs::write(dir.join(name), content).unwrap();
}

fn read(dir: &Path, name: &str) -> Vec<u8> {
    fs::read(dir.join(name)).unwrap()
}

#[test]
fn test_rewrites_every_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();
    write(
        d,
        "a.json",
        br#"{"$id": "conneroisu/groq-go", "ref": "conneroisu/groq-go#/defs"}"#,
    );
    write(d, "b.json", br#"{"module": "conneroisu/groq-go"}"#);
    write(d, "c.json", br#"{"other": true}"#);

    let report = rewrite_dir(d, FROM, TO, false).unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(
        report.changed,
        vec![
            FileChange {
                path: d.join("a.json"),
                replacements: 2
            },
            FileChange {
                path: d.join("b.json"),
                replacements: 1
            },
        ]
    );
    assert_eq!(report.replacements(), 3);
    assert_eq!(
        read(d, "a.json"),
        br#"{"$id": "conneroisu/groq-go/pkg/schema", "ref": "conneroisu/groq-go/pkg/schema#/defs"}"#
    );
    assert_eq!(read(d, "c.json"), br#"{"other": true}"#);
}

#[test]
fn test_other_files_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();
    let binary = [0xffu8, 0x00, b'c', b'o'];
    write(d, "run.py", b"line = \"conneroisu/groq-go\"\n");
    write(d, "schema.json.bak", b"conneroisu/groq-go");
    write(d, "blob.bin", &binary);
    fs::create_dir(d.join("nested")).unwrap();
    write(&d.join("nested"), "deep.json", b"conneroisu/groq-go");

    let report = rewrite_dir(d, FROM, TO, false).unwrap();
    assert_eq!(report.scanned, 0);
    assert!(report.changed.is_empty());
    assert_eq!(read(d, "run.py"), b"line = \"conneroisu/groq-go\"\n");
    assert_eq!(read(d, "schema.json.bak"), b"conneroisu/groq-go");
    assert_eq!(read(d, "blob.bin"), binary);
    assert_eq!(read(&d.join("nested"), "deep.json"), b"conneroisu/groq-go");
}

#[test]
fn test_replacement_containing_token_applied_once() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();
    write(d, "a.json", b"\"conneroisu/groq-go\"");

    rewrite_dir(d, FROM, TO, false).unwrap();
    assert_eq!(read(d, "a.json"), b"\"conneroisu/groq-go/pkg/schema\"");

    // A second run matches the token inside the replacement again.
    let report = rewrite_dir(d, FROM, TO, false).unwrap();
    assert_eq!(report.replacements(), 1);
    assert_eq!(
        read(d, "a.json"),
        b"\"conneroisu/groq-go/pkg/schema/pkg/schema\""
    );
}

#[test]
fn test_dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();
    write(d, "a.json", b"conneroisu/groq-go");

    let report = rewrite_dir(d, FROM, TO, true).unwrap();
    assert_eq!(report.changed.len(), 1);
    assert_eq!(read(d, "a.json"), b"conneroisu/groq-go");
}

#[test]
fn test_non_utf8_json_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();
    let bytes = [b'{', 0xff, b'}'];
    write(d, "bad.json", &bytes);
    write(d, "good.json", b"conneroisu/groq-go");

    let report = rewrite_dir(d, FROM, TO, false).unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.skipped, vec![d.join("bad.json")]);
    assert_eq!(report.changed.len(), 1);
    assert_eq!(read(d, "bad.json"), bytes);
}

#[test]
fn test_empty_token() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        rewrite_dir(dir.path(), "", TO, false),
        Err(RewriteError::InvalidToken)
    ));
}

#[cfg(unix)]
#[test]
fn test_symlinked_fixture_rewritten_through_link() {
    let dir = tempfile::tempdir().unwrap();
    let shared = tempfile::tempdir().unwrap();
    let d = dir.path();
    write(shared.path(), "schema.json", b"conneroisu/groq-go");
    std::os::unix::fs::symlink(shared.path().join("schema.json"), d.join("linked.json")).unwrap();
    std::os::unix::fs::symlink(d.join("missing.json"), d.join("dangling.json")).unwrap();

    let report = rewrite_dir(d, FROM, TO, false).unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.changed[0].path, d.join("linked.json"));
    assert_eq!(
        read(shared.path(), "schema.json"),
        b"conneroisu/groq-go/pkg/schema"
    );
    assert!(fs::symlink_metadata(d.join("linked.json")).unwrap().file_type().is_symlink());
}
