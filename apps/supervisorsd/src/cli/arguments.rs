use std::path::PathBuf;

use clap::Parser;

/// Run a supervisors node.
#[derive(Parser)]
pub struct Run {
    /// Path to the node's TOML config file.
    #[clap(long, short)]
    pub config: PathBuf,
}
