use std::{fs, path::Path};

use anyhow::Context;
use basalt_config::NodeConfig;

pub fn load(path: &Path) -> anyhow::Result<NodeConfig> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}
