use std::path::{Path, PathBuf};

use tokio::fs;

use weave_types::StoredFile;

/// Exclusive per-session scratch directory the validators run against.
/// Cleanup is guaranteed on both success and failure paths: callers invoke
/// `cleanup()` and `Drop` sweeps whatever is left.
pub struct ValidationWorkspace {
    root: PathBuf,
    cleaned: bool,
}

impl ValidationWorkspace {
    pub async fn materialize(
        base: &Path,
        session_id: &str,
        files: &[StoredFile],
    ) -> anyhow::Result<Self> {
        let root = base.join(format!("weave-validate-{session_id}"));
        if fs::metadata(&root).await.is_ok() {
            fs::remove_dir_all(&root).await?;
        }
        fs::create_dir_all(&root).await?;

        for file in files {
            let Some(target) = safe_join(&root, &file.path) else {
                continue;
            };
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&target, &file.content).await?;
        }

        Ok(Self {
            root,
            cleaned: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-mirror a subset of files after a repair iteration rewrote them.
    pub async fn refresh(&self, files: &[StoredFile]) -> anyhow::Result<()> {
        for file in files {
            let Some(target) = safe_join(&self.root, &file.path) else {
                continue;
            };
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&target, &file.content).await?;
        }
        Ok(())
    }

    pub async fn cleanup(mut self) -> anyhow::Result<()> {
        self.cleaned = true;
        if fs::metadata(&self.root).await.is_ok() {
            fs::remove_dir_all(&self.root).await?;
        }
        Ok(())
    }
}

impl Drop for ValidationWorkspace {
    fn drop(&mut self) {
        if !self.cleaned {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }
}

fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let normalized = relative.replace('\\', "/");
    if normalized.is_empty()
        || normalized.starts_with('/')
        || normalized.contains(':')
        || normalized == ".."
        || normalized.starts_with("../")
        || normalized.contains("/../")
    {
        return None;
    }
    Some(root.join(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stored(path: &str, content: &str) -> StoredFile {
        StoredFile {
            id: path.to_string(),
            session_id: "ses_1".to_string(),
            path: path.to_string(),
            content: content.to_string(),
            language: None,
            size: content.len() as u64,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mirrors_files_and_cleans_up() {
        let base = tempfile::tempdir().expect("tempdir");
        let files = vec![
            stored("package.json", "{}"),
            stored("src/App.tsx", "export default function App() {}"),
        ];
        let workspace = ValidationWorkspace::materialize(base.path(), "ses_1", &files)
            .await
            .expect("materialize");
        let root = workspace.root().to_path_buf();
        assert!(root.join("package.json").exists());
        assert!(root.join("src/App.tsx").exists());

        workspace.cleanup().await.expect("cleanup");
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn hostile_paths_are_skipped() {
        let base = tempfile::tempdir().expect("tempdir");
        let files = vec![stored("../escape.txt", "x"), stored("ok.txt", "y")];
        let workspace = ValidationWorkspace::materialize(base.path(), "ses_1", &files)
            .await
            .expect("materialize");
        assert!(workspace.root().join("ok.txt").exists());
        assert!(!base.path().join("escape.txt").exists());
        workspace.cleanup().await.expect("cleanup");
    }

    #[tokio::test]
    async fn drop_sweeps_leftovers() {
        let base = tempfile::tempdir().expect("tempdir");
        let root = {
            let workspace =
                ValidationWorkspace::materialize(base.path(), "ses_1", &[stored("a.txt", "x")])
                    .await
                    .expect("materialize");
            workspace.root().to_path_buf()
        };
        assert!(!root.exists());
    }
}
