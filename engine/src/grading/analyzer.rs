//! Methodology analysis
//!
//! The asynchronous half of the pipeline: read a methodology document,
//! ask the model to distill its requirements and a short summary, parse
//! the JSON reply. Driven by the task registry's background workers and
//! by the one-shot `analyze` CLI command.

use std::path::Path;
use std::sync::Arc;

use super::{parse, prompts, GradeError, MethodSummary};
use crate::docx;
use crate::llm::ModelProvider;

/// Extracts requirements and a summary from a methodology document
pub struct MethodAnalyzer {
    provider: Arc<dyn ModelProvider>,
}

impl MethodAnalyzer {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    pub async fn analyze(&self, path: &Path) -> Result<MethodSummary, GradeError> {
        let extract = docx::extract(path)?;
        tracing::debug!(
            path = %path.display(),
            text_chars = extract.full_text.len(),
            "methodology extracted"
        );

        let prompt = prompts::method_analysis_prompt(&extract.full_text);
        let reply = self.provider.invoke(&prompt).await?;
        let summary = parse::parse_method_summary(&reply)?;

        tracing::info!(
            requirements = summary.requirements.len(),
            summary_points = summary.summary.len(),
            "methodology analyzed"
        );
        Ok(summary)
    }
}
