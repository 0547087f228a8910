pub mod memory;
pub mod query;

pub use memory::*;
pub use query::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use weave_types::{FileWrite, StoredFile};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SaveOutcome {
    pub saved: usize,
    #[serde(default)]
    pub errors: Vec<SaveError>,
}

/// Capability-level file store contract. Writes to the same path serialize
/// with latest-write-wins semantics.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn get_file(&self, session_id: &str, path: &str) -> Option<StoredFile>;
    async fn get_all_files(&self, session_id: &str) -> Vec<StoredFile>;
    async fn save_files(&self, session_id: &str, writes: Vec<FileWrite>) -> SaveOutcome;
    async fn delete_files(&self, session_id: &str) -> usize;
    async fn query_files(
        &self,
        session_id: &str,
        query: FileQuery,
    ) -> Result<FilePage, FileQueryError>;
}

pub fn infer_language(path: &str) -> Option<String> {
    let ext = path.rsplit('.').next()?;
    let language = match ext {
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "css" => "css",
        "scss" => "scss",
        "html" => "html",
        "json" => "json",
        "md" => "markdown",
        "vue" => "vue",
        "svg" => "svg",
        _ => return None,
    };
    Some(language.to_string())
}
