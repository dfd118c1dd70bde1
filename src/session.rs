//! Session persistence for kiri.
//!
//! A session is one continuous working context bound to a directory. Its
//! metadata lives at `["session", id]` in the [`Storage`]; its messages live
//! under `["message", id, ...]` and are owned by [`crate::history`].

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::Storage;

/// Metadata for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub project_id: String,
    /// Working directory tools run in.
    pub directory: String,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Session {
    /// Creates (but does not persist) a session for `directory`.
    pub fn new(directory: &Path) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id_for(directory),
            directory: directory.display().to_string(),
            title: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// First 8 characters of the id, git style.
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }

    /// Sets the title from the first user request if none is set yet.
    ///
    /// Truncates to 50 characters.
    pub fn title_from(&mut self, request: &str) {
        if self.title.is_some() {
            return;
        }
        let text = request.trim();
        let title = if text.chars().count() > 50 {
            let truncated: String = text.chars().take(50).collect();
            format!("{}...", truncated)
        } else {
            text.to_string()
        };
        self.title = Some(title);
    }

    /// Bumps the last-activity timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().to_rfc3339();
    }

    pub fn save(&self, storage: &Storage) -> Result<(), StorageError> {
        storage.write(&["session", &self.id], self)
    }

    /// Loads a session by its full id.
    pub fn load(storage: &Storage, id: &str) -> Result<Self> {
        let session: Option<Session> = storage
            .read(&["session", id])
            .with_context(|| format!("Failed to read session {}", id))?;
        let short = &id[..8.min(id.len())];
        session.ok_or_else(|| anyhow::anyhow!("Session {} not found", short))
    }

    /// Returns all sessions, most recently updated first.
    pub fn list_all(storage: &Storage) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for id in storage.list(&["session"])? {
            if let Some(session) = storage
                .read::<Session>(&["session", &id])
                .with_context(|| format!("Failed to read session {}", id))?
            {
                sessions.push(session);
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// Deletes a session and, in cascade, all of its messages.
    pub fn delete(storage: &Storage, id: &str) -> Result<()> {
        storage
            .delete_prefix(&["message", id])
            .with_context(|| format!("Failed to delete messages of session {}", id))?;
        storage
            .delete(&["todo", id])
            .with_context(|| format!("Failed to delete todos of session {}", id))?;
        storage
            .delete(&["session", id])
            .with_context(|| format!("Failed to delete session {}", id))?;
        Ok(())
    }

    /// Resolves a partial session id to a full one.
    ///
    /// Errors if zero or several sessions match.
    pub fn resolve_prefix(storage: &Storage, partial: &str) -> Result<String> {
        let ids = storage.list(&["session"])?;
        let matches: Vec<_> = ids.iter().filter(|id| id.starts_with(partial)).collect();
        match matches.len() {
            0 => anyhow::bail!("No session found matching '{}'", partial),
            1 => Ok(matches[0].clone()),
            n => anyhow::bail!(
                "{} sessions match '{}'; provide more characters to disambiguate",
                n,
                partial
            ),
        }
    }
}

/// Names the project a directory belongs to: the enclosing git root's name,
/// or the directory's own name outside a repository.
fn project_id_for(directory: &Path) -> String {
    let mut dir = directory.to_path_buf();
    loop {
        if dir.join(".git").exists() {
            break;
        }
        if !dir.pop() {
            dir = directory.to_path_buf();
            break;
        }
    }
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "global".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_store(name: &str) -> Storage {
        let dir = std::env::temp_dir().join(format!("kiri_session_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        Storage::open(dir).unwrap()
    }

    #[test]
    fn test_save_load_list() {
        let store = temp_store("crud");
        let mut session = Session::new(Path::new("/tmp"));
        session.title_from("list files in the repository");
        session.save(&store).unwrap();

        let loaded = Session::load(&store, &session.id).unwrap();
        assert_eq!(loaded, session);
        assert_eq!(Session::list_all(&store).unwrap().len(), 1);

        fs::remove_dir_all(store.root()).unwrap();
    }

    #[test]
    fn test_title_truncates_and_sticks() {
        let mut session = Session::new(Path::new("/tmp"));
        session.title_from(&"x".repeat(80));
        assert_eq!(session.title.as_deref(), Some(format!("{}...", "x".repeat(50)).as_str()));
        session.title_from("second request");
        assert!(session.title.as_deref().unwrap().starts_with("xxx"));
    }

    #[test]
    fn test_delete_cascades_to_messages() {
        let store = temp_store("cascade");
        let session = Session::new(Path::new("/tmp"));
        session.save(&store).unwrap();
        store
            .write(&["message", &session.id, "00000000000000000001"], &serde_json::json!({}))
            .unwrap();
        store
            .write(&["todo", &session.id], &serde_json::json!({"todos": []}))
            .unwrap();

        Session::delete(&store, &session.id).unwrap();
        assert!(Session::load(&store, &session.id).is_err());
        assert!(store.list(&["message", &session.id]).unwrap().is_empty());
        assert!(!store.exists(&["todo", &session.id]).unwrap());

        fs::remove_dir_all(store.root()).unwrap();
    }

    #[test]
    fn test_resolve_prefix() {
        let store = temp_store("prefix");
        let session = Session::new(Path::new("/tmp"));
        session.save(&store).unwrap();

        assert_eq!(Session::resolve_prefix(&store, session.short_id()).unwrap(), session.id);
        assert!(Session::resolve_prefix(&store, "zzzz-not-an-id").is_err());

        fs::remove_dir_all(store.root()).unwrap();
    }
}
