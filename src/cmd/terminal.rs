//! A `HostAdapter` backed by the real terminal (spec §9's "callable UI
//! callback" seam, made concrete for an interactive CLI run) using the same
//! `dialoguer`/`console` pair the teacher binary's `ui/` module prints
//! phase headers and gates with.

use crate::errors::FailureReport;
use crate::host::{ConfirmRequest, ConfirmResponse, FilePickerRequest, FilePickerResponse, HostAdapter, InputRequest, InputResponse};
use async_trait::async_trait;
use console::style;
use dialoguer::{Confirm, Input};

pub struct TerminalHost {
    /// `--yes`-style shortcut: auto-approve every confirmation instead of
    /// prompting, mirroring the teacher's `cli.yes` flag.
    pub auto_approve: bool,
}

impl TerminalHost {
    pub fn new(auto_approve: bool) -> Self {
        Self { auto_approve }
    }
}

#[async_trait]
impl HostAdapter for TerminalHost {
    async fn confirm(&self, request: ConfirmRequest) -> ConfirmResponse {
        if self.auto_approve {
            return ConfirmResponse::Yes;
        }
        let mut prompt = request.message.clone();
        if let Some(alt) = &request.safe_alternative {
            prompt.push_str(&format!(" (safer alternative available: {alt})"));
        }
        let approved = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false);
        if approved {
            ConfirmResponse::Yes
        } else {
            ConfirmResponse::No
        }
    }

    async fn request_input(&self, request: InputRequest) -> InputResponse {
        if request.sensitive {
            let value = dialoguer::Password::new()
                .with_prompt(request.prompt)
                .interact()
                .unwrap_or_default();
            return InputResponse { value };
        }
        let value = Input::<String>::new()
            .with_prompt(request.prompt)
            .allow_empty(true)
            .interact_text()
            .unwrap_or_default();
        InputResponse { value }
    }

    async fn pick_file(&self, request: FilePickerRequest) -> Option<FilePickerResponse> {
        let value = Input::<String>::new()
            .with_prompt(format!("{} (relative to {})", request.prompt, request.root.display()))
            .allow_empty(true)
            .interact_text()
            .unwrap_or_default();
        if value.trim().is_empty() {
            return None;
        }
        Some(FilePickerResponse {
            path: request.root.join(value.trim()),
        })
    }

    fn report_failure(&self, report: &FailureReport) {
        eprintln!(
            "{} {} — {}: {}",
            style("feature failed").red().bold(),
            style(&report.feature_id).yellow(),
            report.kind,
            report.reason
        );
    }
}
