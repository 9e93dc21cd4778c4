//! CLI integration tests using assert_cmd to exercise the actual binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// The binary with an empty HOME and no backend credentials in the
/// environment, so the user's real config never leaks in.
fn maskgate(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("maskgate").unwrap();
    cmd.env("HOME", home.path()).env_remove("MASKGATE_PORT");
    for backend in ["ANTHROPIC", "OPENAI", "GEMINI", "OPENROUTER"] {
        cmd.env_remove(format!("{backend}_API_KEY"))
            .env_remove(format!("{backend}_BASE_URL"));
    }
    cmd
}

// ---------------------------------------------------------------------------
// Scan subcommand
// ---------------------------------------------------------------------------

#[test]
fn cli_scan_stdin_clean() {
    let home = TempDir::new().unwrap();
    maskgate(&home)
        .arg("scan")
        .write_stdin("hello world\nnothing to see\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("scan clean"));
}

#[test]
fn cli_scan_stdin_reports_without_values() {
    let home = TempDir::new().unwrap();
    maskgate(&home)
        .arg("scan")
        .write_stdin("first line\nmail me at a@b.com\ncard 6222021234567890\n")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("<stdin>:2: email"))
        .stderr(predicate::str::contains("<stdin>:3: bank_card"))
        .stderr(predicate::str::contains("a@b.com").not())
        .stderr(predicate::str::contains("6222021234567890").not());
}

#[test]
fn cli_scan_directory_skips_hidden() {
    let home = TempDir::new().unwrap();
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("src")).unwrap();
    std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
    std::fs::write(
        tmp.path().join("src/settings.env"),
        "DEBUG=true\nGITHUB_TOKEN=ghp_abcdefghijklmnop1234\n",
    )
    .unwrap();
    std::fs::write(tmp.path().join(".git/config"), "url = https://example.com/x\n").unwrap();

    maskgate(&home)
        .arg("scan")
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("settings.env:2: secret"))
        .stderr(predicate::str::contains(".git").not());
}

#[test]
fn cli_scan_missing_path_fails() {
    let home = TempDir::new().unwrap();
    maskgate(&home)
        .args(["scan", "/definitely/not/here"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("path not found"));
}

// ---------------------------------------------------------------------------
// Check-config subcommand
// ---------------------------------------------------------------------------

#[test]
fn cli_check_config_masks_credentials() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("gateway.yml");
    std::fs::write(
        &config,
        "port: 9300\nbackends:\n  openai:\n    api_key: sk-test-abcdef123456\n",
    )
    .unwrap();

    maskgate(&home)
        .arg("check-config")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("127.0.0.1:9300"))
        .stdout(predicate::str::contains("https://api.openai.com/v1"))
        .stdout(predicate::str::contains("credential set"))
        .stdout(predicate::str::contains("gemini      not configured"))
        .stdout(predicate::str::contains("sk-test").not());
}

#[test]
fn cli_check_config_env_override() {
    let home = TempDir::new().unwrap();
    maskgate(&home)
        .arg("check-config")
        .env("GEMINI_API_KEY", "g-123")
        .env("MASKGATE_PORT", "9400")
        .assert()
        .success()
        .stdout(predicate::str::contains("127.0.0.1:9400"))
        .stdout(predicate::str::contains(
            "https://generativelanguage.googleapis.com/v1beta",
        ));
}

#[test]
fn cli_check_config_rejects_bad_yaml() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("broken.yml");
    std::fs::write(&config, "port: [unterminated\n").unwrap();

    maskgate(&home)
        .arg("check-config")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("config parse error"));
}

#[test]
fn cli_check_config_rejects_incompatible_route() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("routes.yml");
    std::fs::write(&config, "routes:\n  /v1/messages: gemini\n").unwrap();

    maskgate(&home)
        .arg("check-config")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}

#[test]
fn cli_version() {
    let home = TempDir::new().unwrap();
    maskgate(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
