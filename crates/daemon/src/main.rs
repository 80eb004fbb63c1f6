// SPDX-License-Identifier: MIT

//! sdpc-agentd: the SDP control-client daemon. Typically started by the
//! `sdpc` CLI (see `sdpc-cli`); reads its config file path from the first
//! argument.

use std::path::PathBuf;

use sdpc_core::client::Client;
use sdpc_core::config::Config;
use sdpc_core::error::CoreError;
use sdpc_credstore::FsCredStoreWriter;
use sdpc_transport::{TlsConfig, TlsTransport, TracedTransport};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("usage: sdpc-agentd <config-file>");
            std::process::exit(2);
        }
    };

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error loading config: {e}");
            std::process::exit(1);
        }
    };

    let log_path = config
        .pid_file
        .with_file_name("sdpc-agentd.log");
    let _log_guard = match sdpc_daemon::logging::init(&log_path, config.verbosity, config.use_syslog) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("error setting up logging: {e}");
            std::process::exit(1);
        }
    };

    info!("starting sdpc-agentd");

    match run(config_path, config).await {
        Ok(()) => std::process::exit(0),
        Err(CoreError::GotExitSig) => std::process::exit(0),
        Err(e) => {
            error!(error = %e, "daemon exiting with error");
            std::process::exit(1);
        }
    }
}

async fn run(config_path: PathBuf, config: Config) -> Result<(), CoreError> {
    let foreground = config.foreground;
    let pid_file = config.pid_file.clone();

    let outcome = sdpc_daemon::lifecycle::start(&pid_file, foreground)?;
    let _lock = match outcome {
        sdpc_daemon::StartOutcome::Forked { child_pid } => {
            println!("sdpc-agentd started, pid {child_pid}");
            return Ok(());
        }
        sdpc_daemon::StartOutcome::Continue { _lock } => _lock,
    };

    let mut client = Client::from_config(&config);
    let mut transport = TracedTransport::new(TlsTransport::new(
        TlsConfig {
            cert_path: client.cert_file.clone(),
            key_path: client.key_file.clone(),
            ca_path: client.cert_file.parent().map(|p| p.join("ca.pem")),
        },
        client.client_id.clone(),
        client.spa_encryption_key.clone(),
        client.spa_hmac_key.clone(),
    ));
    let credstore_writer = FsCredStoreWriter;
    let clock = sdpc_core::clock::SystemClock;

    let reload = || {
        Config::load(&config_path).map_err(|e| CoreError::fs(&config_path, std::io::Error::other(e)))
    };

    match sdpc_daemon::control_loop::run(&mut client, &mut transport, &credstore_writer, &clock, reload)
        .await
    {
        Ok(sdpc_daemon::ExitReason::OneShotComplete) => {
            info!("one-shot credential refresh complete");
            Ok(())
        }
        Ok(sdpc_daemon::ExitReason::Signal) => {
            info!("exiting on signal");
            Err(CoreError::GotExitSig)
        }
        Err(e) => Err(e),
    }
}
