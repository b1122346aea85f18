//! `orch reset` — soft-delete the project marker directory to trash
//! (spec §4.8 "Soft delete"; SPEC_FULL.md CLI surface).

use crate::config::ProjectPaths;
use crate::state::persistence::Store;
use anyhow::Result;
use dialoguer::Confirm;
use std::path::Path;

pub fn cmd_reset(project_dir: &Path, force: bool) -> Result<()> {
    let paths = ProjectPaths::new(project_dir);

    if !paths.state_file.exists() {
        println!("Nothing to reset — no project state at {}", paths.state_file.display());
        return Ok(());
    }

    if !force {
        let confirmed = Confirm::new()
            .with_prompt("This will move all project state to trash. Continue?")
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let store = Store::new();
    let trashed = store.soft_delete(&paths.state_file, &paths.trash_dir)?;
    println!("Moved {} to {}", paths.state_file.display(), trashed.display());
    Ok(())
}
