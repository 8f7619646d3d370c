//! Model response parsing
//!
//! The model answers the evaluation prompt as free text: blocks separated
//! by a literal `###`, with labelled lines inside each block. The producer
//! is a language model, so every rule here degrades instead of failing:
//! a block without a score becomes a zero-scored record, unknown lines are
//! ignored, and only the requirements/summary JSON (where the contract is
//! machine-readable by construction) may reject the whole reply.

use super::{EvaluationRecord, GradeError, MethodSummary};
use crate::llm::extract_fenced_block;

/// Block separator the evaluation prompt instructs the model to emit
pub const BLOCK_DELIMITER: &str = "###";
/// Label carrying the criterion name on the first line of a block
pub const CRITERION_LABEL: &str = "Критерий:";
/// Label of the free-text comment line
pub const COMMENT_LABEL: &str = "Комментарий к оценке:";
/// Label of the penalty line; recognized so it never leaks into comments
pub const PENALTY_LABEL: &str = "Штраф:";
/// Label of the numeric score line
pub const SCORE_LABEL: &str = "Итоговый балл:";

/// Parse the requirements/summary reply of the methodology analysis.
///
/// The model is told to answer with a JSON object; a fenced code block
/// around it is tolerated. Anything that does not decode into the expected
/// shape is `UnparsableOutput`.
pub fn parse_method_summary(raw: &str) -> Result<MethodSummary, GradeError> {
    let body = extract_fenced_block(raw).unwrap_or(raw).trim();
    serde_json::from_str(body).map_err(|e| {
        tracing::warn!(error = %e, "model returned malformed requirements JSON");
        GradeError::UnparsableOutput
    })
}

/// Parse the delimited evaluation reply into per-criterion records.
///
/// Text before the first `###` is prompt echo and is discarded. Within a
/// block, the first line names the criterion; the remaining lines are
/// dispatched on their label prefix. Records come out in the model's block
/// order.
pub fn parse_evaluation_blocks(raw: &str) -> Vec<EvaluationRecord> {
    let mut records = Vec::new();

    for block in raw.split(BLOCK_DELIMITER).skip(1) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let mut lines = block.lines();
        let criterion = lines
            .next()
            .unwrap_or("")
            .replace(CRITERION_LABEL, "")
            .trim()
            .to_string();

        let mut score = 0.0;
        let mut comments: Vec<String> = Vec::new();

        for line in lines {
            let line = line.trim();
            if line.starts_with(PENALTY_LABEL) {
                continue;
            }
            if line.starts_with(SCORE_LABEL) {
                score = parse_score(line);
            } else if line.starts_with(COMMENT_LABEL) {
                if let Some(rest) = line.splitn(2, ':').nth(1) {
                    comments.push(rest.trim().to_string());
                }
            } else if let Some(rest) = line.strip_prefix('-') {
                comments.push(rest.trim().to_string());
            }
        }

        records.push(EvaluationRecord {
            criterion,
            score,
            comment: comments.join("\n"),
        });
    }

    records
}

/// Score lines look like `Итоговый балл: 7.5/10`. The value sits after the
/// last colon; an optional `/максимум` qualifier is dropped. A value that
/// fails to parse degrades to 0.0.
fn parse_score(line: &str) -> f64 {
    line.rsplit(':')
        .next()
        .and_then(|tail| tail.split('/').next())
        .map(str::trim)
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(0.0)
}
