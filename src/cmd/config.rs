//! `orch config show` — print the effective merged configuration
//! (SPEC_FULL.md CLI surface).

use crate::config::Config;
use anyhow::Result;
use console::style;
use std::path::Path;

pub fn cmd_config_show(project_dir: &Path) -> Result<()> {
    let config = Config::load(project_dir)?;

    println!();
    println!("{}", style("Effective configuration").bold());
    println!("{}", style("========================").dim());
    println!("max_steps                 = {}", config.max_steps);
    println!("max_remediation_attempts   = {}", config.max_remediation_attempts);
    println!("max_context_size           = {}", config.max_context_size);
    println!("history_summary_threshold  = {}", config.history_summary_threshold);
    println!("max_backups                = {}", config.max_backups);
    println!("max_history_messages       = {}", config.max_history_messages);
    println!("rollback_limit             = {}", config.rollback_limit);
    println!("patch_escalation_threshold = {}", config.patch_escalation_threshold);
    println!();
    println!(
        "Overrides: {}/config.toml, then ORCH_* environment variables.",
        project_dir.join(crate::config::PROJECT_MARKER).display()
    );
    println!();
    Ok(())
}
