// CLI behaviour for check, init-config and run

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn repo_file(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(relative)
}

fn workstation_brain(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("workstation-brain").unwrap();
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    workstation_brain(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("init-config"));
}

#[test]
fn test_check_accepts_shipped_configuration() {
    let dir = TempDir::new().unwrap();
    workstation_brain(&dir)
        .arg("check")
        .arg("--config")
        .arg(repo_file("config/workstation.toml"))
        .arg("--catalog")
        .arg(repo_file("config/catalog.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("confirmation cell E3"))
        .stdout(predicate::str::contains("2 subtasks"))
        .stdout(predicate::str::contains("rules parse"));
}

#[test]
fn test_check_reports_unparseable_rule() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("catalog.toml");
    std::fs::write(
        &catalog,
        r#"
[rules.broken]
if = "object_count >"

[tasks.T.subtasks.S]
rules = ["broken"]
"#,
    )
    .unwrap();

    workstation_brain(&dir)
        .arg("check")
        .arg("--catalog")
        .arg(&catalog)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Rule 'broken'"));
}

#[test]
fn test_check_fails_on_missing_catalog() {
    let dir = TempDir::new().unwrap();
    workstation_brain(&dir)
        .arg("check")
        .arg("--catalog")
        .arg(dir.path().join("absent.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid task catalog"));
}

#[test]
fn test_init_config_writes_and_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("station.toml");

    workstation_brain(&dir)
        .arg("init-config")
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default configuration"));

    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.contains("[grid]"));
    assert!(written.contains("catalog_path"));

    workstation_brain(&dir)
        .arg("init-config")
        .arg("--output")
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    workstation_brain(&dir)
        .arg("init-config")
        .arg("--output")
        .arg(&output)
        .arg("--force")
        .assert()
        .success();
}

#[test]
fn test_run_stops_when_bus_input_closes() {
    let dir = TempDir::new().unwrap();
    workstation_brain(&dir)
        .arg("run")
        .arg("--catalog")
        .arg(repo_file("config/catalog.toml"))
        .write_stdin("")
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success();
}
