//! Show command - displays the resolved configuration.

use anyhow::Result;

use crate::config::Config;

/// Execute `replica show-config`.
pub fn cmd_show_config(config: &Config) -> Result<()> {
    config.print();
    Ok(())
}
