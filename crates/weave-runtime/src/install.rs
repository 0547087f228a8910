use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

/// Dependency installs are skipped while the manifest signature is unchanged
/// since the last successful install.
pub fn install_signature(package_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(package_json.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone, Default)]
pub struct InstallCache {
    signatures: Arc<Mutex<HashMap<String, String>>>,
}

impl InstallCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn needs_install(&self, session_id: &str, package_json: &str) -> bool {
        let signature = install_signature(package_json);
        let cache = self.signatures.lock().expect("install cache lock");
        cache.get(session_id) != Some(&signature)
    }

    pub fn mark_installed(&self, session_id: &str, package_json: &str) {
        let signature = install_signature(package_json);
        self.signatures
            .lock()
            .expect("install cache lock")
            .insert(session_id.to_string(), signature);
    }

    pub fn clear_session(&self, session_id: &str) {
        self.signatures
            .lock()
            .expect("install cache lock")
            .remove(session_id);
    }
}
