//! Config error-message, atomic-write-safety, and init integration tests.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};

use upkeep_core::{config, CoreError};

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_returns_not_found() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let path = root.path().join("config.yaml");
    let err = config::load(&path).unwrap_err();
    assert!(matches!(err, CoreError::ConfigNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config not found"));
    assert!(err.to_string().contains("config.yaml"));
    assert!(err.to_string().contains("upkeep init"));
}

#[rstest]
#[case("corrupt", b": : corrupt : yaml : !!!\n  - broken: [unclosed" as &[u8])]
#[case("wrong_type", b"- this is a list, not a mapping\n")]
fn load_bad_yaml_returns_parse_error_with_path(#[case] label: &str, #[case] contents: &[u8]) {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let path = root.path().join("config.yaml");
    fs::write(&path, contents).expect("write");

    let err = config::load(&path).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }), "[{label}] got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("config.yaml"), "[{label}] must contain file path, got: {msg}");
    let source_msg = match &err {
        CoreError::Parse { source, .. } => source.to_string(),
        _ => unreachable!(),
    };
    assert!(!source_msg.is_empty(), "[{label}] serde_yaml must provide error context");
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn save_cleans_up_tmp_file() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let path = root.path().join("config.yaml");
    config::save(&path, &config::starter(Path::new("/srv/app"))).expect("save");

    let tmp = path.with_file_name("config.yaml.tmp");
    assert!(!tmp.exists(), ".tmp must be removed after successful save");
}

#[test]
fn mid_write_crash_leaves_original_intact() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let path = root.path().join("config.yaml");
    config::save(&path, &config::starter(Path::new("/srv/app"))).expect("save");

    let original_bytes = fs::read(&path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = path.with_file_name("config.yaml.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    let current_bytes = fs::read(&path).expect("read after crash");
    assert_eq!(original_bytes, current_bytes, "original must be unchanged after crash");
    assert!(tmp.exists(), ".tmp orphan must exist (crash = no cleanup)");
}

// ---------------------------------------------------------------------------
// 3. Init integration
// ---------------------------------------------------------------------------

#[test]
fn init_writes_starter_config() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let path = root.path().join(".upkeep").join("config.yaml");
    let tree = assert_fs::TempDir::new().expect("tree tempdir");

    let cfg = config::init_at(&path, tree.path()).expect("init");

    root.child(".upkeep/config.yaml").assert(predicate::path::exists());
    assert_eq!(cfg.tree, tree.path());
    assert_eq!(cfg.remote, "origin");
    assert!(cfg.journal_path.starts_with(tree.path()));
    assert!(!cfg.services.is_empty(), "starter must show a service entry to edit");

    // Unix: mode 0600
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
    }
}

#[test]
fn init_is_idempotent() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let path = root.path().join("config.yaml");

    let first = config::init_at(&path, Path::new("/srv/app")).expect("first init");
    let second = config::init_at(&path, Path::new("/srv/elsewhere")).expect("second init");

    assert_eq!(first, second, "existing config wins over re-init");
    assert_eq!(second.tree, PathBuf::from("/srv/app"));
}

// ---------------------------------------------------------------------------
// 4. Operator-written configs
// ---------------------------------------------------------------------------

#[test]
fn hand_written_config_parses() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let path = root.path().join("config.yaml");
    fs::write(
        &path,
        r#"
tree: /srv/docs
remote: origin
branch: production
state_dir: /var/lib/upkeep
journal_path: /srv/docs/logs/upkeep.log
trigger_path: /srv/docs/tmp/update-trigger
update_flag_path: /srv/docs/tmp/update-available
services:
  - name: web
    unit: docs-web.service
    cache_dir: /srv/docs/__pycache__
  - name: worker
    unit: docs-worker.service
    straggler_pattern: "docs-worker --queue"
commands:
  refresh_dependencies: ["/srv/docs/venv/bin/pip", "install", "-r", "requirements.txt"]
  apply_migrations: ["/srv/docs/venv/bin/python", "manage.py", "migrate", "--noinput"]
  refresh_assets: ["/srv/docs/venv/bin/python", "manage.py", "collectstatic", "--noinput"]
timing:
  health_timeout_secs: 90
"#,
    )
    .expect("write");

    let cfg = config::load(&path).expect("load");
    assert_eq!(cfg.branch, "production");
    assert_eq!(cfg.services.len(), 2);
    assert_eq!(cfg.services[1].straggler_pattern.as_deref(), Some("docs-worker --queue"));
    assert_eq!(cfg.timing.health_timeout_secs, 90);
    // Unset timing fields keep their defaults alongside the overridden one
    assert_eq!(cfg.timing.trigger_poll_secs, 60);
    assert_eq!(cfg.lock_path(), PathBuf::from("/var/lib/upkeep/run.lock"));
}
