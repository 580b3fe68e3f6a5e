//! Profile document and settings fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Document with a `default`, a `chrome` and a `code` profile.
pub const SAMPLE_DOCUMENT: &str = r#"{
  "default": {
    "window_match": "",
    "KEY": {
      "60": { "action": "4", "params": { "message": "hello from default" } },
      "69": { "action": "1", "params": { "command": "start notepad" } }
    }
  },
  "chrome": {
    "window_match": "chrome",
    "KEY": {
      "69": { "action": "2", "params": { "shortcut": "ctrl+t" } }
    },
    "CONTROL_CHANGE": {
      "1": { "action": "1", "params": { "command": "volume up", "cc_control_id": "74" } }
    }
  },
  "code": {
    "window_match": "Visual Studio Code",
    "PITCHWHEEL": {
      "1": { "action": "3", "params": { "script": "scripts/bend.py" } }
    }
  }
}
"#;

/// Temporary directory holding a profile document.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    /// Empty workspace; the document does not exist yet.
    pub fn empty() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    /// Workspace whose document holds `content`.
    pub fn with_document(content: &str) -> Self {
        let ws = Self::empty();
        fs::write(ws.profiles_path(), content).expect("write document");
        ws
    }

    pub fn sample() -> Self {
        Self::with_document(SAMPLE_DOCUMENT)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.dir.path().join("profiles.json")
    }

    /// Write a file relative to the workspace and return its path.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, content).expect("write file");
        path
    }

    /// Current document parsed as JSON.
    pub fn document_json(&self) -> serde_json::Value {
        let text = fs::read_to_string(self.profiles_path()).expect("read document");
        serde_json::from_str(&text).expect("document is JSON")
    }
}
