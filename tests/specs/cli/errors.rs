use crate::prelude::{sdpc, TempConfig};

#[test]
fn stop_without_a_pid_file_is_an_error() {
    let cfg = TempConfig::new();

    let output = sdpc()
        .arg("--config")
        .arg(&cfg.config_path)
        .arg("stop")
        .output()
        .expect("run sdpc stop");

    assert!(!output.status.success());
}

#[test]
fn restart_without_a_pid_file_is_an_error() {
    let cfg = TempConfig::new();

    let output = sdpc()
        .arg("--config")
        .arg(&cfg.config_path)
        .arg("restart")
        .output()
        .expect("run sdpc restart");

    assert!(!output.status.success());
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist.conf");

    let output = sdpc()
        .arg("--config")
        .arg(&missing)
        .arg("status")
        .output()
        .expect("run sdpc status");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config"), "stderr was: {stderr}");
}
