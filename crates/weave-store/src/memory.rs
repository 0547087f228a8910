use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use weave_types::{FileWrite, StoredFile};

use crate::{apply_query, FilePage, FileQuery, FileQueryError, FileStore, SaveError, SaveOutcome};

#[derive(Clone, Default)]
pub struct MemoryFileStore {
    // session id -> path -> latest file row
    files: Arc<RwLock<HashMap<String, HashMap<String, StoredFile>>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate_path(path: &str) -> Result<(), String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err("path is empty".to_string());
        }
        if trimmed.starts_with('/') || trimmed.contains(':') {
            return Err("path must be workspace-relative".to_string());
        }
        if trimmed == ".." || trimmed.starts_with("../") || trimmed.contains("/../") {
            return Err("path must not traverse parents".to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn get_file(&self, session_id: &str, path: &str) -> Option<StoredFile> {
        self.files
            .read()
            .await
            .get(session_id)
            .and_then(|files| files.get(path))
            .cloned()
    }

    async fn get_all_files(&self, session_id: &str) -> Vec<StoredFile> {
        let mut files = self
            .files
            .read()
            .await
            .get(session_id)
            .map(|files| files.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    async fn save_files(&self, session_id: &str, writes: Vec<FileWrite>) -> SaveOutcome {
        let mut outcome = SaveOutcome::default();
        let mut guard = self.files.write().await;
        let files = guard.entry(session_id.to_string()).or_default();
        for write in writes {
            if let Err(message) = Self::validate_path(&write.path) {
                outcome.errors.push(SaveError {
                    path: write.path,
                    message,
                });
                continue;
            }
            let language = write
                .language
                .clone()
                .or_else(|| crate::infer_language(&write.path));
            let size = write.content.len() as u64;
            files.insert(
                write.path.clone(),
                StoredFile {
                    id: Uuid::new_v4().to_string(),
                    session_id: session_id.to_string(),
                    path: write.path,
                    content: write.content,
                    language,
                    size,
                    created_at: Utc::now(),
                },
            );
            outcome.saved += 1;
        }
        outcome
    }

    async fn delete_files(&self, session_id: &str) -> usize {
        self.files
            .write()
            .await
            .remove(session_id)
            .map(|files| files.len())
            .unwrap_or(0)
    }

    async fn query_files(
        &self,
        session_id: &str,
        query: FileQuery,
    ) -> Result<FilePage, FileQueryError> {
        let files = self.get_all_files(session_id).await;
        apply_query(files, &query)
    }
}
