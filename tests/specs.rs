//! Black-box specifications for the `sdpc` management CLI.
//!
//! These invoke the built `sdpc` binary and assert on stdout/stderr/exit
//! code, the same way the crate-local unit tests assert on in-process
//! return values.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/cli/errors.rs"]
mod cli_errors;
#[path = "specs/cli/help.rs"]
mod cli_help;
#[path = "specs/cli/status.rs"]
mod cli_status;
