use std::path::PathBuf;

use argh::FromArgs;

#[derive(Debug, Clone, FromArgs)]
#[argh(description = "Basalt node")]
pub struct Args {
    #[argh(option, short = 'c', description = "path to the node's TOML configuration file")]
    pub config: PathBuf,

    #[argh(option, description = "directory for the sled-backed key/value store (falls back to in-memory if omitted)")]
    pub kv_store_path: Option<PathBuf>,

    #[argh(option, description = "path to append the L2 snapshot journal to (journal disabled if omitted)")]
    pub snapshot_journal_path: Option<PathBuf>,
}
