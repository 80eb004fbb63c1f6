//! Test helpers for the `sdpc` CLI black-box specs.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use assert_cmd::Command;

/// An `assert_cmd::Command` for the built `sdpc` binary.
pub fn sdpc() -> Command {
    Command::cargo_bin("sdpc").expect("sdpc binary built by the workspace")
}

/// A minimal, valid config file an agent could load, written to a fresh
/// temp directory alongside a pid file path inside the same directory so
/// no test depends on shared host state.
pub struct TempConfig {
    _dir: tempfile::TempDir,
    pub config_path: PathBuf,
    pub pid_path: PathBuf,
}

impl TempConfig {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let pid_path = dir.path().join("agent.pid");
        let config_path = dir.path().join("sdpc.conf");

        let mut file = std::fs::File::create(&config_path).expect("create config file");
        writeln!(file, "CTRL_ADDR 127.0.0.1").unwrap();
        writeln!(file, "CTRL_PORT 4433").unwrap();
        writeln!(file, "PID_FILE {}", pid_path.display()).unwrap();
        writeln!(file, "REMAIN_CONNECTED 0").unwrap();
        writeln!(file, "FOREGROUND 1").unwrap();

        Self {
            _dir: dir,
            config_path,
            pid_path,
        }
    }
}
