//! Report grading pipeline
//!
//! The data model and orchestration for scoring a lab report against a
//! rubric. Two flows share this module: the synchronous scoring flow
//! (`ReportEvaluator`), which runs extraction, two model calls and the
//! block parser inside one request, and the asynchronous methodology flow
//! (`analyzer::MethodAnalyzer`), which the task registry drives in the
//! background.

pub mod analyzer;
pub mod parse;
pub mod prompts;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::docx::{self, DocxError};
use crate::llm::{ModelError, ModelProvider};

/// Errors that terminate a grading flow
#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    #[error("{0}")]
    Document(#[from] DocxError),

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("Некорректный формат ответа")]
    UnparsableOutput,
}

/// One rubric dimension supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    #[serde(rename = "criteria")]
    pub name: String,

    #[serde(rename = "score")]
    pub max_score: f64,
}

/// The model's verdict for one criterion, in the model's block order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    #[serde(rename = "criteria")]
    pub criterion: String,

    pub score: f64,

    /// Joined comment and bullet lines; may be empty
    pub comment: String,
}

/// Outcome of the synchronous scoring flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub results: Vec<EvaluationRecord>,

    /// Author name the model read off the title page, trimmed verbatim;
    /// the model answers `Не найдено` when it finds none
    pub author: String,
}

/// Requirements and summary distilled from a methodology document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodSummary {
    #[serde(default)]
    pub requirements: Vec<String>,

    #[serde(default)]
    pub summary: Vec<String>,
}

/// Grades one report against a rubric through two model calls
pub struct ReportEvaluator {
    provider: Arc<dyn ModelProvider>,
}

impl ReportEvaluator {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    /// Run the full scoring flow for one document.
    ///
    /// The report's content-and-styles text feeds both the evaluation and
    /// the author prompt. The two model calls are independent and run
    /// concurrently; both must succeed. Per-block parser degradation is not
    /// an error here; a malformed block becomes a zero-scored record.
    pub async fn evaluate(
        &self,
        path: &Path,
        criteria: &[Criterion],
        requirements: &[String],
        summary: &[String],
    ) -> Result<EvaluationResult, GradeError> {
        let extract = docx::extract(path)?;
        tracing::debug!(
            path = %path.display(),
            report_chars = extract.style_report.len(),
            "report extracted"
        );

        let evaluation = prompts::evaluation_prompt(
            criteria,
            &extract.style_report,
            requirements,
            summary,
        );
        let author = prompts::author_prompt(&extract.style_report);

        let (reply, author_reply) = tokio::try_join!(
            self.provider.invoke(&evaluation),
            self.provider.invoke(&author),
        )?;

        let results = parse::parse_evaluation_blocks(&reply);
        tracing::info!(records = results.len(), "report evaluated");

        Ok(EvaluationResult {
            results,
            author: author_reply.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::Write;

    /// Dispatches on prompt wording: the author prompt asks for a name,
    /// everything else gets the delimited evaluation reply.
    struct ScriptedProvider {
        evaluation_reply: String,
        author_reply: String,
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, prompt: &str) -> crate::llm::Result<String> {
            if prompt.contains("Найдите ФИО") {
                Ok(self.author_reply.clone())
            } else {
                Ok(self.evaluation_reply.clone())
            }
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ModelProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn invoke(&self, _prompt: &str) -> crate::llm::Result<String> {
            Err(ModelError::Timeout)
        }
    }

    fn write_report(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("report.docx");
        let file = std::fs::File::create(&path).expect("create docx");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        writer
            .start_file("word/document.xml", options)
            .expect("start entry");
        writer
            .write_all(
                r#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Выполнил: Иванов Иван Иванович</w:t></w:r></w:p></w:body></w:document>"#.as_bytes(),
            )
            .expect("write entry");
        writer.finish().expect("finish zip");
        path
    }

    fn rubric() -> Vec<Criterion> {
        vec![
            Criterion {
                name: "Правильность".to_string(),
                max_score: 5.0,
            },
            Criterion {
                name: "Оформление".to_string(),
                max_score: 2.0,
            },
        ]
    }

    #[tokio::test]
    async fn test_evaluate_combines_records_and_author() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_report(dir.path());

        let provider = Arc::new(ScriptedProvider {
            evaluation_reply: "###\nКритерий: Правильность\nИтоговый балл: 4.5/5\n###\nКритерий: Оформление\nКомментарий к оценке: Нет нумерации\nИтоговый балл: 1".to_string(),
            author_reply: "  Иванов Иван Иванович\n".to_string(),
        });
        let evaluator = ReportEvaluator::new(provider);

        let result = evaluator
            .evaluate(&path, &rubric(), &["требование".to_string()], &[])
            .await
            .expect("evaluate");

        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].criterion, "Правильность");
        assert_eq!(result.results[0].score, 4.5);
        assert_eq!(result.results[1].comment, "Нет нумерации");
        assert_eq!(result.author, "Иванов Иван Иванович");
    }

    #[tokio::test]
    async fn test_evaluate_propagates_model_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_report(dir.path());

        let evaluator = ReportEvaluator::new(Arc::new(FailingProvider));
        let err = evaluator
            .evaluate(&path, &rubric(), &[], &[])
            .await
            .expect_err("must fail");
        assert!(matches!(err, GradeError::Model(ModelError::Timeout)));
    }

    #[tokio::test]
    async fn test_evaluate_propagates_document_failure() {
        let evaluator = ReportEvaluator::new(Arc::new(FailingProvider));
        let err = evaluator
            .evaluate(Path::new("/нет/такого/файла.docx"), &rubric(), &[], &[])
            .await
            .expect_err("must fail");
        assert!(matches!(err, GradeError::Document(_)));
    }

    #[test]
    fn test_criterion_wire_names() {
        let parsed: Criterion =
            serde_json::from_str(r#"{"criteria": "Структура", "score": 5}"#).expect("parse");
        assert_eq!(parsed.name, "Структура");
        assert_eq!(parsed.max_score, 5.0);

        let record = EvaluationRecord {
            criterion: "Структура".to_string(),
            score: 4.0,
            comment: String::new(),
        };
        let json = serde_json::to_string(&record).expect("serialize");
        assert!(json.contains(r#""criteria":"Структура""#));
    }
}
