// SPDX-License-Identifier: MIT

use clap::ValueEnum;

/// Selects how `status` renders its result: a line of text for a human at
/// a terminal, or a JSON object for a script.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
