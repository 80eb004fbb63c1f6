use crate::prelude::sdpc;

#[test]
fn top_level_help_lists_subcommands() {
    let output = sdpc().arg("--help").output().expect("run sdpc --help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["start", "stop", "restart", "status"] {
        assert!(
            stdout.contains(subcommand),
            "expected --help output to mention `{subcommand}`:\n{stdout}"
        );
    }
}

#[test]
fn no_subcommand_is_a_usage_error() {
    let output = sdpc().output().expect("run sdpc with no arguments");
    assert!(!output.status.success());
}
