//! History compression (spec §4.4): once the detailed work log reaches
//! `HISTORY_SUMMARY_THRESHOLD` entries, fold it into one paragraph via a
//! Planner call and drop the detail.

use crate::llm::{LlmError, Planner};
use crate::state::model::WorkLogEntry;

pub struct HistoryCompressor {
    threshold: usize,
}

impl HistoryCompressor {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn should_compress(&self, detailed_entry_count: usize) -> bool {
        detailed_entry_count >= self.threshold
    }

    /// Returns the new summary paragraph. The caller is responsible for
    /// clearing the detailed entries it just passed in — this is the sole
    /// source of Planner-driven summarization during a feature (spec §4.4).
    pub async fn compress(
        &self,
        planner: &dyn Planner,
        previous_summary: Option<&str>,
        new_entries: &[WorkLogEntry],
    ) -> Result<String, LlmError> {
        planner.summarize_history(previous_summary, new_entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ProjectContext, VerificationRequest, VerificationResponse};
    use async_trait::async_trait;

    struct StubPlanner;

    #[async_trait]
    impl Planner for StubPlanner {
        async fn breakdown(&self, _request: &str, _context: &ProjectContext) -> Result<Vec<String>, LlmError> {
            Ok(vec![])
        }
        async fn verify(&self, _request: &VerificationRequest) -> Result<VerificationResponse, LlmError> {
            Ok(VerificationResponse {
                completion_percentage: 100,
                issues: vec![],
            })
        }
        async fn remediation_instruction(&self, _request: &VerificationRequest) -> Result<String, LlmError> {
            Ok(String::new())
        }
        async fn checkpoint(&self, _work_log_summary: &str, _reason: &str) -> Result<String, LlmError> {
            Ok(String::new())
        }
        async fn summarize_history(
            &self,
            previous_summary: Option<&str>,
            new_entries: &[WorkLogEntry],
        ) -> Result<String, LlmError> {
            Ok(format!(
                "{} + {} new entries",
                previous_summary.unwrap_or("(none)"),
                new_entries.len()
            ))
        }
    }

    #[test]
    fn should_compress_respects_threshold() {
        let compressor = HistoryCompressor::new(5);
        assert!(!compressor.should_compress(4));
        assert!(compressor.should_compress(5));
        assert!(compressor.should_compress(6));
    }

    #[tokio::test]
    async fn compress_delegates_to_planner() {
        let compressor = HistoryCompressor::new(5);
        let entries = vec![WorkLogEntry::new("write_file", "a.py", "ok")];
        let summary = compressor.compress(&StubPlanner, Some("prior"), &entries).await.unwrap();
        assert_eq!(summary, "prior + 1 new entries");
    }
}
