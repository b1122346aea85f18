//! `orch run <request>` — breakdown and drive a natural-language feature
//! request to completion (spec §4.1; SPEC_FULL.md CLI surface).

use super::terminal::TerminalHost;
use crate::codeintel::{HeuristicCodeIntelligence, IntelligenceCache};
use crate::config::Config;
use crate::frontend::Aggregator;
use crate::llm::{Executor, PassthroughExecutor, PassthroughPlanner, Planner};
use crate::orchestrator::{HostProgressSink, ProgressSink, WorkflowOrchestrator};
use crate::vault::InMemoryVault;
use anyhow::Result;
use console::style;
use std::path::Path;
use std::sync::Arc;

pub async fn cmd_run(project_dir: &Path, request: &str, yes: bool) -> Result<()> {
    let sanitized = sanitize_request(request);
    if sanitized.is_empty() {
        anyhow::bail!("request is empty after sanitization");
    }

    let config = Config::load(project_dir)?;
    let host: Arc<dyn crate::host::HostAdapter> = Arc::new(TerminalHost::new(yes));
    let planner: Arc<dyn Planner> = Arc::new(PassthroughPlanner);
    let executor: Arc<dyn Executor> = Arc::new(PassthroughExecutor);
    let vault = Arc::new(InMemoryVault::new());
    let codeintel = Arc::new(IntelligenceCache::new(HeuristicCodeIntelligence));
    let frontend = Arc::new(Aggregator::default_stack());
    let store = crate::state::persistence::Store::new();

    let mut orchestrator = WorkflowOrchestrator::new(
        config,
        project_dir,
        planner,
        executor,
        store,
        host.clone(),
        vault,
        codeintel,
        frontend,
    );

    let mut state = orchestrator.load_or_adopt().await?;
    let feature_count_before = state.features.len();

    let progress: Arc<dyn ProgressSink> = Arc::new(HostProgressSink(host));
    orchestrator.run(&mut state, &sanitized, Some(progress)).await?;

    println!();
    println!("{}", style("Run summary").bold());
    println!("{}", style("===========").dim());
    for feature in state.features.iter().skip(feature_count_before.min(state.features.len())) {
        println!(
            "{:<10} {:?}  {}",
            &feature.id[..feature.id.len().min(10)],
            feature.status,
            feature.description
        );
    }
    println!();
    Ok(())
}

/// Strip control characters (besides newline/tab) and trim surrounding
/// whitespace before the request reaches the Planner.
fn sanitize_request(request: &str) -> String {
    request
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_control_characters() {
        assert_eq!(sanitize_request("add\u{0007} a page\n"), "add a page");
    }

    #[test]
    fn sanitize_trims_whitespace() {
        assert_eq!(sanitize_request("  add a login page  "), "add a login page");
    }
}
