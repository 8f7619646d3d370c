//! Task registry
//!
//! In-memory submit/poll registry behind the asynchronous methodology
//! analysis. `submit` persists the upload, registers a `processing` record
//! and spawns one background worker; the record is visible to pollers
//! before the worker starts, so polling a just-issued identifier never
//! misses. The worker computes its whole outcome first and then replaces
//! the record in a single write, so a poller sees either the processing
//! record or the finished one, never a half-written mix.
//!
//! Records live for the process lifetime; state is lost on restart.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::grading::analyzer::MethodAnalyzer;
use crate::grading::MethodSummary;

/// Lifecycle of a submitted analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot of one task. Serializes with all three keys present, nulls
/// included, matching the polling wire shape.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub status: TaskStatus,
    pub summary: Option<MethodSummary>,
    pub error: Option<String>,
}

impl TaskRecord {
    fn processing() -> Self {
        Self {
            status: TaskStatus::Processing,
            summary: None,
            error: None,
        }
    }

    fn completed(summary: MethodSummary) -> Self {
        Self {
            status: TaskStatus::Completed,
            summary: Some(summary),
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            status: TaskStatus::Failed,
            summary: None,
            error: Some(error),
        }
    }
}

/// Owns the registry and the background workers that fill it
#[derive(Clone)]
pub struct TaskManager {
    analyzer: Arc<MethodAnalyzer>,
    storage_dir: PathBuf,
    tasks: Arc<RwLock<HashMap<Uuid, TaskRecord>>>,
}

impl TaskManager {
    pub fn new(analyzer: Arc<MethodAnalyzer>, storage_dir: PathBuf) -> Self {
        Self {
            analyzer,
            storage_dir,
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Persist the upload, register the task and spawn its worker.
    /// Blocks the caller only for the file write and the registry insert.
    pub fn submit(&self, bytes: &[u8], original_name: &str) -> std::io::Result<Uuid> {
        let task_id = Uuid::new_v4();
        let filename = format!("{}_{}", task_id, sanitize_filename(original_name));
        let path = self.storage_dir.join(filename);
        std::fs::write(&path, bytes)?;

        {
            let mut tasks = self.tasks.write().expect("task registry lock poisoned");
            tasks.insert(task_id, TaskRecord::processing());
        }
        tracing::info!(%task_id, file = %path.display(), "analysis task submitted");

        self.spawn_worker(task_id, path);
        Ok(task_id)
    }

    /// Current snapshot of a task, or `None` for an unknown identifier
    pub fn poll(&self, task_id: &Uuid) -> Option<TaskRecord> {
        let tasks = self.tasks.read().expect("task registry lock poisoned");
        tasks.get(task_id).cloned()
    }

    fn spawn_worker(&self, task_id: Uuid, path: PathBuf) {
        let analyzer = Arc::clone(&self.analyzer);
        let tasks = Arc::clone(&self.tasks);

        tokio::spawn(async move {
            let finished = match analyzer.analyze(&path).await {
                Ok(summary) => {
                    tracing::info!(%task_id, "analysis task completed");
                    TaskRecord::completed(summary)
                }
                Err(e) => {
                    tracing::warn!(%task_id, error = %e, "analysis task failed");
                    TaskRecord::failed(e.to_string())
                }
            };

            // One whole-record swap per task
            let mut tasks = tasks.write().expect("task registry lock poisoned");
            tasks.insert(task_id, finished);
        });
    }
}

/// Reduce a client-supplied filename to a safe final component.
pub fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .collect();
    if cleaned.is_empty() {
        "document.docx".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelProvider, Result as LlmResult};
    use async_trait::async_trait;
    use std::io::Write;
    use std::time::Duration;

    struct FixedProvider(String);

    #[async_trait]
    impl ModelProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn invoke(&self, _prompt: &str) -> LlmResult<String> {
            Ok(self.0.clone())
        }
    }

    fn docx_bytes() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        writer
            .start_file("word/document.xml", options)
            .expect("start entry");
        writer
            .write_all(
                r#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Методичка</w:t></w:r></w:p></w:body></w:document>"#.as_bytes(),
            )
            .expect("write entry");
        writer.finish().expect("finish zip").into_inner()
    }

    fn manager_with_reply(dir: &Path, reply: &str) -> TaskManager {
        let analyzer = Arc::new(MethodAnalyzer::new(Arc::new(FixedProvider(
            reply.to_string(),
        ))));
        TaskManager::new(analyzer, dir.to_path_buf())
    }

    async fn poll_until_terminal(manager: &TaskManager, task_id: &Uuid) -> TaskRecord {
        for _ in 0..200 {
            if let Some(record) = manager.poll(task_id) {
                if record.status != TaskStatus::Processing {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {} never reached a terminal state", task_id);
    }

    #[tokio::test]
    async fn test_task_visible_immediately_after_submit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = manager_with_reply(
            dir.path(),
            r#"{"requirements": ["р"], "summary": ["с"]}"#,
        );

        let task_id = manager
            .submit(&docx_bytes(), "методичка.docx")
            .expect("submit");
        let record = manager.poll(&task_id).expect("just-issued id must resolve");
        assert!(matches!(
            record.status,
            TaskStatus::Processing | TaskStatus::Completed
        ));
    }

    #[tokio::test]
    async fn test_successful_analysis_completes_with_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = manager_with_reply(
            dir.path(),
            r#"{"requirements": ["титульный лист"], "summary": ["про сети"]}"#,
        );

        let task_id = manager
            .submit(&docx_bytes(), "методичка.docx")
            .expect("submit");
        let record = poll_until_terminal(&manager, &task_id).await;

        assert_eq!(record.status, TaskStatus::Completed);
        let summary = record.summary.expect("summary present");
        assert_eq!(summary.requirements, vec!["титульный лист"]);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_unparsable_reply_fails_with_wire_message() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = manager_with_reply(dir.path(), "не json");

        let task_id = manager
            .submit(&docx_bytes(), "методичка.docx")
            .expect("submit");
        let record = poll_until_terminal(&manager, &task_id).await;

        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("Некорректный формат ответа"));
        assert!(record.summary.is_none());
    }

    #[tokio::test]
    async fn test_broken_document_fails_the_task() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = manager_with_reply(dir.path(), "{}");

        let task_id = manager
            .submit(b"not a zip at all", "мусор.docx")
            .expect("submit");
        let record = poll_until_terminal(&manager, &task_id).await;

        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("Ошибка обработки документа")));
    }

    #[tokio::test]
    async fn test_poll_unknown_id_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = manager_with_reply(dir.path(), "{}");
        assert!(manager.poll(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_sanitize_filename_strips_path_components() {
        assert_eq!(sanitize_filename("отчет.docx"), "отчет.docx");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("dir/file.docx"), "file.docx");
        assert_eq!(sanitize_filename(""), "document.docx");
    }

    #[test]
    fn test_task_record_serializes_all_keys() {
        let json = serde_json::to_value(TaskRecord::processing()).expect("serialize");
        assert_eq!(json["status"], "processing");
        assert!(json["summary"].is_null());
        assert!(json["error"].is_null());
    }
}
