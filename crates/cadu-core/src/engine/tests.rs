use super::*;
use crate::manifest::Manifest;
use crate::report;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

fn manifest(files: &[(&str, &[&str])]) -> Manifest {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (hash, paths) in files {
        map.insert(
            hash.to_string(),
            paths.iter().map(|p| p.to_string()).collect(),
        );
    }
    Manifest {
        files: map,
        empty_dirs: Default::default(),
    }
}

fn write_file(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(to_native(rel));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn sha1_of(content: &[u8]) -> String {
    hex::encode(Sha1::digest(content))
}

/// Job whose file base must never be contacted. The scheme is one curl
/// cannot speak, so an unexpected download fails fast instead of retrying.
fn offline_job(root: &Path, current: Manifest, target: Manifest) -> UpdateJob {
    UpdateJob::new(
        root.to_path_buf(),
        current,
        target,
        Url::parse("disabled://updates.invalid/files/").unwrap(),
    )
}

fn run_job(job: &UpdateJob) -> Result<(), UpdateError> {
    let (reporter, _progress) = report::channel(1024);
    job.run(&reporter)
}

#[test]
fn identical_manifests_leave_the_tree_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let content = b"alpha";
    let hash = sha1_of(content);
    write_file(dir.path(), "a", content);

    let m = manifest(&[(&hash, &["a"])]);
    run_job(&offline_job(dir.path(), m.clone(), m)).unwrap();

    assert_eq!(fs::read(dir.path().join("a")).unwrap(), content);
    assert!(!dir.path().join(STAGING_DIR).exists());
}

#[test]
fn renamed_content_is_moved_not_downloaded() {
    let dir = tempfile::tempdir().unwrap();
    let content = b"beta";
    let hash = sha1_of(content);
    write_file(dir.path(), "a", content);

    let current = manifest(&[(&hash, &["a"])]);
    let target = manifest(&[(&hash, &["sub/dir/b"])]);
    run_job(&offline_job(dir.path(), current, target)).unwrap();

    assert!(!dir.path().join("a").exists());
    assert_eq!(fs::read(dir.path().join("sub/dir/b")).unwrap(), content);
}

#[test]
fn duplicate_paths_copy_then_move() {
    let dir = tempfile::tempdir().unwrap();
    let content = b"gamma";
    let hash = sha1_of(content);
    write_file(dir.path(), "orig", content);

    let current = manifest(&[(&hash, &["orig"])]);
    let target = manifest(&[(&hash, &["x", "y/z", "y/w"])]);
    run_job(&offline_job(dir.path(), current, target)).unwrap();

    for rel in ["x", "y/z", "y/w"] {
        assert_eq!(fs::read(dir.path().join(to_native(rel))).unwrap(), content);
    }
    assert!(!dir.path().join(STAGING_DIR).exists());
}

#[test]
fn obsolete_files_and_dirs_are_swept_and_empty_dirs_created() {
    let dir = tempfile::tempdir().unwrap();
    let content = b"delta";
    let hash = sha1_of(content);
    write_file(dir.path(), "a", content);
    write_file(dir.path(), "junk/readonly.bin", b"junk");
    let ro = dir.path().join("junk/readonly.bin");
    let mut perms = fs::metadata(&ro).unwrap().permissions();
    perms.set_readonly(true);
    fs::set_permissions(&ro, perms).unwrap();

    let current = manifest(&[(&hash, &["a"])]);
    let mut target = Manifest::default();
    target.empty_dirs.insert("d".to_string());
    run_job(&offline_job(dir.path(), current, target)).unwrap();

    assert!(!dir.path().join("a").exists());
    assert!(!dir.path().join("junk").exists());
    assert!(dir.path().join("d").is_dir());
    assert!(!dir.path().join(STAGING_DIR).exists());
}

#[test]
fn staged_content_from_a_prior_run_is_reused_after_verification() {
    let dir = tempfile::tempdir().unwrap();
    let content = b"epsilon";
    let hash = sha1_of(content);
    // Simulate an interrupted run: the hash already sits in staging and the
    // current manifest does not explain it.
    let staging = dir.path().join(STAGING_DIR);
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join(&hash), content).unwrap();

    let target = manifest(&[(&hash, &["restored"])]);
    run_job(&offline_job(dir.path(), Manifest::default(), target)).unwrap();

    assert_eq!(fs::read(dir.path().join("restored")).unwrap(), content);
    assert!(!staging.exists());
}

#[test]
fn verify_reused_detects_a_corrupt_live_file() {
    let dir = tempfile::tempdir().unwrap();
    let content = b"zeta";
    let hash = sha1_of(content);
    // Live file contents do not match what the current manifest claims.
    write_file(dir.path(), "a", b"rotten");

    let current = manifest(&[(&hash, &["a"])]);
    let target = manifest(&[(&hash, &["a"])]);
    let mut job = offline_job(dir.path(), current, target);
    job.options.verify_reused = true;

    // The corrupt candidate is discarded and scheduled for download; with
    // an unusable file base the run must not silently succeed.
    let err = run_job(&job).unwrap_err();
    assert!(matches!(err, UpdateError::Download { .. }));
    // The corrupt file was pulled out of the live tree but never trusted.
    assert!(!dir.path().join(STAGING_DIR).join(&hash).exists());
}

#[test]
fn second_updater_on_the_same_root_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let held = StagingArea::acquire(dir.path()).unwrap();
    let err = StagingArea::acquire(dir.path()).unwrap_err();
    assert!(matches!(err, UpdateError::StagingBusy));
    drop(held);
    // Released lock can be re-acquired and cleanly removed.
    let again = StagingArea::acquire(dir.path()).unwrap();
    again.finish().unwrap();
    assert!(!dir.path().join(STAGING_DIR).exists());
}

#[test]
fn stopped_reporter_aborts_before_mutating_and_keeps_staging() {
    let dir = tempfile::tempdir().unwrap();
    let content = b"eta";
    let hash = sha1_of(content);
    write_file(dir.path(), "a", content);

    let m = manifest(&[(&hash, &["a"])]);
    let job = offline_job(dir.path(), m.clone(), m);
    let (reporter, _progress) = report::channel(1024);
    reporter.stop();

    let err = job.run(&reporter).unwrap_err();
    assert!(matches!(err, UpdateError::Stopped));
    // Nothing was mutated: not even the staging area was created.
    assert!(!dir.path().join(STAGING_DIR).exists());
    assert!(dir.path().join("a").exists(), "live tree untouched");
}

#[test]
fn backup_copies_glob_matches_preserving_relative_paths() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "settings/app.cfg", b"cfg");
    write_file(dir.path(), "settings/skip.dat", b"dat");
    write_file(dir.path(), "data/other.cfg", b"other");

    let dest = tempfile::tempdir().unwrap();
    let (reporter, _progress) = report::channel(1024);
    let saved = backup_files(
        dir.path(),
        &["settings/*.cfg".to_string()],
        dest.path(),
        &reporter,
    )
    .unwrap();

    assert_eq!(saved, 1);
    assert_eq!(
        fs::read(dest.path().join("settings/app.cfg")).unwrap(),
        b"cfg"
    );
    assert!(!dest.path().join("settings/skip.dat").exists());
}

#[test]
fn backup_without_matches_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let dest_root = tempfile::tempdir().unwrap();
    let dest = dest_root.path().join("backups");
    let (reporter, _progress) = report::channel(1024);
    let saved = backup_files(dir.path(), &["*.cfg".to_string()], &dest, &reporter).unwrap();
    assert_eq!(saved, 0);
    assert!(!dest.exists());
}
