//! HTTP API
//!
//! REST surface consumed by the course frontend.
//!
//! # Endpoints
//!
//! - POST /manual - Submit a methodology document for background analysis
//! - GET /status/:task_id - Poll a background analysis task
//! - POST /loading-report - Grade an uploaded lab report synchronously
//! - POST /criteria - Validate a rubric payload
//! - POST /send-report - Deliver a graded report to its author via Telegram
//!
//! Response bodies keep the exact shapes the frontend already speaks,
//! including the Russian reason strings and the non-obvious status codes
//! (`/criteria` answers 500, not 400, for a bad payload).

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::bot::TelegramBot;
use crate::grading::{Criterion, MethodSummary, ReportEvaluator};
use crate::roster::Roster;
use crate::tasks::{sanitize_filename, TaskManager};

/// Upload cap shared by all endpoints
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Extensions accepted by the delivery endpoint
const ALLOWED_REPORT_FORMATS: [&str; 4] = ["docx", "pdf", "xlsx", "pptx"];

/// Rubric payload checked by POST /criteria
#[derive(Debug, Deserialize)]
struct CriteriaPayload {
    criteria: Vec<String>,
    score: Vec<f64>,
}

/// Server state shared across handlers
#[derive(Clone)]
pub struct ServerState {
    tasks: TaskManager,
    evaluator: Arc<ReportEvaluator>,
    roster: Roster,
    bot: TelegramBot,
    labs_dir: PathBuf,
}

impl ServerState {
    /// Assemble the shared state and make sure the report directory exists
    pub fn new(
        tasks: TaskManager,
        evaluator: Arc<ReportEvaluator>,
        roster: Roster,
        bot: TelegramBot,
        labs_dir: PathBuf,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(&labs_dir)?;
        Ok(Self {
            tasks,
            evaluator,
            roster,
            bot,
            labs_dir,
        })
    }
}

/// Build the application router with CORS and the upload size cap applied
pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/manual", post(submit_method))
        .route("/status/:task_id", get(task_status))
        .route("/loading-report", post(grade_report))
        .route("/criteria", post(validate_criteria))
        .route("/send-report", post(send_report))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and run the HTTP API until the process is stopped
pub async fn serve(state: ServerState, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

/// POST /manual - store the upload and hand it to the task registry
async fn submit_method(State(state): State<ServerState>, mut multipart: Multipart) -> Response {
    let mut file: Option<(String, axum::body::Bytes)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let original = field.file_name().unwrap_or_default().to_string();
            if let Ok(bytes) = field.bytes().await {
                file = Some((original, bytes));
            }
        }
    }

    let Some((original_name, bytes)) = file else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "Error", "reason": "Файл не передан"})),
        )
            .into_response();
    };

    match state.tasks.submit(&bytes, &original_name) {
        Ok(task_id) => (StatusCode::OK, Json(json!({"taskId": task_id}))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "Error", "reason": e.to_string()})),
        )
            .into_response(),
    }
}

/// GET /status/:task_id - snapshot of a background task
///
/// An unparsable id is indistinguishable from an unknown one.
async fn task_status(State(state): State<ServerState>, Path(task_id): Path<String>) -> Response {
    let record = Uuid::parse_str(&task_id)
        .ok()
        .and_then(|id| state.tasks.poll(&id));

    match record {
        Some(record) => (StatusCode::OK, Json(record)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "failed", "error": "Задача не найдена"})),
        )
            .into_response(),
    }
}

/// POST /loading-report - grade a report against the supplied rubric
async fn grade_report(State(state): State<ServerState>, mut multipart: Multipart) -> Response {
    let mut file: Option<(String, axum::body::Bytes)> = None;
    let mut criteria_raw = String::from("[]");
    let mut summary_raw = String::from("{}");

    while let Ok(Some(field)) = multipart.next_field().await {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let original = field.file_name().unwrap_or_default().to_string();
                if let Ok(bytes) = field.bytes().await {
                    file = Some((original, bytes));
                }
            }
            "criteria" => {
                if let Ok(text) = field.text().await {
                    criteria_raw = text;
                }
            }
            "summary" => {
                if let Ok(text) = field.text().await {
                    summary_raw = text;
                }
            }
            _ => {}
        }
    }

    let Some((original_name, bytes)) = file else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "Error", "reason": "Форма не валидна"})),
        )
            .into_response();
    };

    let criteria: Vec<Criterion> = match serde_json::from_str(&criteria_raw) {
        Ok(criteria) => criteria,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "Error", "reason": e.to_string()})),
            )
                .into_response();
        }
    };
    let summary: MethodSummary = match serde_json::from_str(&summary_raw) {
        Ok(summary) => summary,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "Error", "reason": e.to_string()})),
            )
                .into_response();
        }
    };

    let filepath = state.labs_dir.join(sanitize_filename(&original_name));
    if let Err(e) = tokio::fs::write(&filepath, &bytes).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "Error", "reason": e.to_string()})),
        )
            .into_response();
    }

    match state
        .evaluator
        .evaluate(&filepath, &criteria, &summary.requirements, &summary.summary)
        .await
    {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "results": result.results,
                "author": result.author,
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "Error", "reason": e.to_string()})),
        )
            .into_response(),
    }
}

/// POST /criteria - shape-check a rubric without storing it
async fn validate_criteria(body: String) -> Response {
    match serde_json::from_str::<CriteriaPayload>(&body) {
        Ok(payload) => {
            tracing::debug!(
                criteria = payload.criteria.len(),
                scores = payload.score.len(),
                "criteria payload validated"
            );
            (StatusCode::OK, Json(json!({"status": "OK"}))).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "Error", "reason": e.to_string()})),
        )
            .into_response(),
    }
}

/// POST /send-report - forward a graded report to the student named in it
///
/// The filename carries the addressing: `<Фамилия>_<Имя>..._report<suffix>`.
/// The part before the last `_report` becomes the student's name, and its
/// first word is matched against the roster.
async fn send_report(State(state): State<ServerState>, mut multipart: Multipart) -> Response {
    let mut file: Option<(String, axum::body::Bytes)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let original = field.file_name().unwrap_or_default().to_string();
            if let Ok(bytes) = field.bytes().await {
                file = Some((original, bytes));
            }
        }
    }

    let Some((raw_name, bytes)) = file else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "Error", "reason": "Файл не передан"})),
        )
            .into_response();
    };

    if !has_allowed_format(&raw_name) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "Error",
                "reason": format!("Поддерживаются только {}", ALLOWED_REPORT_FORMATS.join(", ")),
            })),
        )
            .into_response();
    }

    // Frontends sometimes send the name percent-encoded
    let filename = match urlencoding::decode(&raw_name) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw_name.clone(),
    };

    let Some(prefix) = report_name_prefix(&filename) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "Error", "reason": "Некорректное имя файла"})),
        )
            .into_response();
    };

    // An underscore-only prefix collapses to whitespace and carries no name
    let full_name = prefix.replace('_', " ");
    let Some(first_name) = full_name.split_whitespace().next() else {
        return internal_error();
    };

    let user_id = match state.roster.find_by_name(first_name) {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"status": "Error", "reason": "Пользователь не найден"})),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Roster lookup failed: {}", e);
            return internal_error();
        }
    };

    let filepath = state.labs_dir.join(sanitize_filename(&filename));
    if let Err(e) = tokio::fs::write(&filepath, &bytes).await {
        tracing::error!("Failed to store report for delivery: {}", e);
        return internal_error();
    }

    // Delivery happens in the background; the upload is acknowledged
    // as soon as the file is on disk.
    let bot = state.bot.clone();
    let caption = format!("Ваш отчет: {}", filename);
    tokio::spawn(async move {
        if let Err(e) = bot.send_document(user_id, &filepath, &caption).await {
            tracing::error!("Failed to deliver report to {}: {}", user_id, e);
        }
    });

    (StatusCode::OK, Json(json!({"status": "success"}))).into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"status": "Error", "reason": "Внутренняя ошибка сервера"})),
    )
        .into_response()
}

/// Case-insensitive suffix match against the delivery allow-list.
/// The match is on the name's tail, not a parsed extension, so a name
/// like `отчет_docx` passes too.
fn has_allowed_format(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    ALLOWED_REPORT_FORMATS.iter().any(|ext| lower.ends_with(ext))
}

/// The part before the last `_report` marker, when present and non-empty
fn report_name_prefix(filename: &str) -> Option<&str> {
    let mut parts = filename.rsplitn(2, "_report");
    parts.next();
    match parts.next() {
        Some(prefix) if !prefix.is_empty() => Some(prefix),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_format_is_suffix_based() {
        assert!(has_allowed_format("Иванов_report.docx"));
        assert!(has_allowed_format("Иванов_report.PDF"));
        assert!(has_allowed_format("report.xlsx"));
        assert!(has_allowed_format("report.pptx"));
        assert!(has_allowed_format("отчет_docx"));
        assert!(!has_allowed_format("report.txt"));
        assert!(!has_allowed_format("archive.zip"));
    }

    #[test]
    fn test_report_name_prefix() {
        assert_eq!(
            report_name_prefix("Иванов_Иван_report.docx"),
            Some("Иванов_Иван")
        );
        assert_eq!(
            report_name_prefix("a_report_report.docx"),
            Some("a_report")
        );
        assert_eq!(report_name_prefix("noreport.docx"), None);
        assert_eq!(report_name_prefix("_report.docx"), None);
    }

    #[test]
    fn test_criteria_payload_shape() {
        assert!(serde_json::from_str::<CriteriaPayload>(
            r#"{"criteria": ["Структура"], "score": [5.0]}"#
        )
        .is_ok());
        assert!(serde_json::from_str::<CriteriaPayload>(
            r#"{"criteria": ["Структура"], "score": [5, 3.5]}"#
        )
        .is_ok());

        // Missing key
        assert!(serde_json::from_str::<CriteriaPayload>(r#"{"criteria": []}"#).is_err());
        // Wrong element type
        assert!(serde_json::from_str::<CriteriaPayload>(
            r#"{"criteria": [1], "score": [5.0]}"#
        )
        .is_err());
        // Scalar instead of list
        assert!(serde_json::from_str::<CriteriaPayload>(
            r#"{"criteria": "Структура", "score": [5.0]}"#
        )
        .is_err());
    }
}
