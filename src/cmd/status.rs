//! `orch status` — print feature statuses from the persisted state
//! (SPEC_FULL.md CLI surface).

use crate::config::ProjectPaths;
use crate::state::persistence::{AutoConfirm, Store};
use anyhow::Result;
use console::style;
use std::path::Path;

pub fn cmd_status(project_dir: &Path) -> Result<()> {
    let paths = ProjectPaths::new(project_dir);

    if !paths.state_file.exists() {
        println!();
        println!("No project state found at {}", paths.state_file.display());
        println!("Run 'orch run <request>' to start.");
        println!();
        return Ok(());
    }

    let store = Store::new();
    let state = store.load(&paths.state_file, &AutoConfirm)?;

    println!();
    println!("{}", style("Project status").bold());
    println!("{}", style("==============").dim());
    println!("framework: {}", state.framework.as_deref().unwrap_or("(unrecognized)"));
    println!("registered apps: {}", state.registered_apps.len());
    println!();

    if state.features.is_empty() {
        println!("No features recorded yet.");
        println!();
        return Ok(());
    }

    println!("{:<32} {:<24} {:<3} {}", "ID", "STATUS", "ATT", "DESCRIPTION");
    println!("{:<32} {:<24} {:<3} {}", "--", "------", "---", "-----------");
    for feature in &state.features {
        let current = state.current_feature_id.as_deref() == Some(feature.id.as_str());
        let id_label = if current {
            format!("{} {}", style("*").green(), feature.id)
        } else {
            format!("  {}", feature.id)
        };
        println!(
            "{:<32} {:<24} {:<3} {}",
            id_label,
            format!("{:?}", feature.status),
            feature.remediation_attempts,
            feature.description
        );
    }
    println!();
    Ok(())
}
