//! End-to-end tests for the conform binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

#[allow(deprecated)]
fn cli() -> Command {
    let mut command = Command::cargo_bin("conform").unwrap();
    for var in [
        "CONFORM_RUN_REFERENCE",
        "CONFORM_REFERENCE_ROOTS",
        "CONFORM_REFERENCE_ROOT",
        "CONFORM_OUTPUT_DIR",
        "CONFORM_PROCESS_TIMEOUT",
        "CONFORM_WAIVERS",
        "CONFORM_COMPILER",
    ] {
        command.env_remove(var);
    }
    command
}

#[cfg(unix)]
fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut permissions = fs::metadata(path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions).unwrap();
}

const SUITE: &str = r#"
name = "SampleTest"

[[test]]
name = "test001"

[[test.sources]]
path = "X.java"
contents = "public class X {}"
"#;

#[test]
fn test_help_command() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("reference"))
        .stdout(predicate::str::contains("probe"))
        .stdout(predicate::str::contains("waivers"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_version_flag() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_waivers_lists_builtin_excuses() {
    cli()
        .arg("waivers")
        .assert()
        .success()
        .stdout(predicate::str::contains("JavacBug8044196"))
        .stdout(predicate::str::contains("excuse(s)"));
}

#[test]
fn test_waivers_json_is_parseable() {
    let output = cli()
        .args(["waivers", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let excuses = parsed.as_array().unwrap();
    assert!(excuses
        .iter()
        .any(|e| e["name"] == "JavacBug8044196" && e["intermittent"] == true));
}

#[test]
fn test_waivers_loads_extra_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("waivers.toml");
    fs::write(
        &file,
        r#"
[[excuse]]
name = "LocalQuirk"
clears = ["StdoutMismatch"]
"#,
    )
    .unwrap();

    cli()
        .args(["waivers", "--file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("LocalQuirk"));
}

#[test]
fn test_probe_without_roots_fails() {
    cli()
        .arg("probe")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no reference installation"));
}

#[cfg(unix)]
#[test]
fn test_probe_fake_installation() {
    let jdk = TempDir::new().unwrap();
    write_script(&jdk.path().join("bin/javac"), "echo 'javac 17.0.2' >&2");

    cli()
        .args(["probe", "--root"])
        .arg(jdk.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("version 17.0.2"))
        .stdout(predicate::str::contains("tier 17"));
}

#[cfg(unix)]
#[test]
fn test_probe_json_output() {
    let jdk = TempDir::new().unwrap();
    write_script(&jdk.path().join("bin/javac"), "echo 'javac 1.8.0_202' >&2");

    let output = cli()
        .args(["probe", "--format", "json", "--root"])
        .arg(jdk.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed[0]["raw_version"], "1.8.0_202");
    assert_eq!(parsed[0]["tier"], "1.8");
}

#[cfg(unix)]
#[test]
fn test_run_suite_with_clean_compiler() {
    let dir = TempDir::new().unwrap();
    let compiler = dir.path().join("cc.sh");
    write_script(&compiler, "exit 0");
    let suite = dir.path().join("suite.toml");
    fs::write(&suite, SUITE).unwrap();
    let report = dir.path().join("report");

    cli()
        .arg("run")
        .arg(&suite)
        .arg("--compiler")
        .arg(format!("{} {{files}}", compiler.display()))
        .arg("--output")
        .arg(dir.path().join("out"))
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("PASS test001"))
        .stdout(predicate::str::contains("1 passed, 0 failed"));

    let json = fs::read_to_string(report.join("conform_report.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["suite"], "SampleTest");
    assert_eq!(parsed["passed_tests"], 1);
    assert!(report.join("conform_report.md").is_file());
}

#[cfg(unix)]
#[test]
fn test_run_suite_reports_unexpected_failure() {
    let dir = TempDir::new().unwrap();
    let compiler = dir.path().join("cc.sh");
    write_script(
        &compiler,
        "echo 'X.java:1: error: Zork cannot be resolved to a type' >&2\nexit 1",
    );
    let suite = dir.path().join("suite.toml");
    fs::write(&suite, SUITE).unwrap();

    cli()
        .arg("run")
        .arg(&suite)
        .arg("--compiler")
        .arg(format!("{} {{files}}", compiler.display()))
        .arg("--output")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAIL test001"))
        .stderr(predicate::str::contains("Unexpected failure"));
}

#[test]
fn test_run_rejects_compiler_without_files_placeholder() {
    let dir = TempDir::new().unwrap();
    let suite = dir.path().join("suite.toml");
    fs::write(&suite, SUITE).unwrap();

    cli()
        .arg("run")
        .arg(&suite)
        .args(["--compiler", "ecj -d out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("{files}"));
}

#[test]
fn test_run_compare_without_roots_fails() {
    let dir = TempDir::new().unwrap();
    let suite = dir.path().join("suite.toml");
    fs::write(&suite, SUITE).unwrap();

    cli()
        .arg("run")
        .arg(&suite)
        .args(["--compiler", "ecj {files}", "--compare"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no reference installation"));
}
