//! Conversation store
//!
//! Projects are ordered conversation threads persisted as a single JSON blob.
//! Every mutation rewrites the whole collection; the store is single-writer
//! for the lifetime of a session. The active selection is session state and
//! is not persisted.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const TITLE_MAX_CHARS: usize = 30;
pub const DEFAULT_TITLE: &str = "New Conversation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: u64,
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceRef>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub updated_at: i64,
    pub messages: Vec<StoredMessage>,
}

impl Project {
    fn next_message_id(&self) -> u64 {
        self.messages.iter().map(|m| m.id).max().map_or(1, |id| id + 1)
    }
}

pub struct ConversationStore {
    path: PathBuf,
    projects: Vec<Project>,
    active: Option<String>,
}

impl ConversationStore {
    /// Deserialize the project collection from `path`, or start empty when
    /// the file is absent.
    pub fn load(path: PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let projects = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            projects,
            active: None,
        })
    }

    fn persist(&self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.projects)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Projects in display order, most recently updated first.
    pub fn sorted_projects(&self) -> Vec<&Project> {
        let mut projects: Vec<&Project> = self.projects.iter().collect();
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        projects
    }

    pub fn active_project(&self) -> Option<&Project> {
        let active = self.active.as_deref()?;
        self.projects.iter().find(|p| p.id == active)
    }

    pub fn active_project_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn set_active(&mut self, id: &str) -> bool {
        if self.projects.iter().any(|p| p.id == id) {
            self.active = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Create a project titled from `seed` and make it active.
    pub fn create_project(
        &mut self,
        seed: Option<&str>,
    ) -> Result<String, Box<dyn std::error::Error>> {
        let mut id = Utc::now().timestamp_millis().to_string();
        while self.projects.iter().any(|p| p.id == id) {
            id.push('0');
        }
        let project = Project {
            id: id.clone(),
            title: derive_title(seed),
            updated_at: Utc::now().timestamp_millis(),
            messages: Vec::new(),
        };
        self.projects.push(project);
        self.active = Some(id.clone());
        self.persist()?;
        Ok(id)
    }

    /// Remove a project. Clears the active selection when it pointed at the
    /// removed project.
    pub fn delete_project(&mut self, id: &str) -> Result<bool, Box<dyn std::error::Error>> {
        let before = self.projects.len();
        self.projects.retain(|p| p.id != id);
        let removed = self.projects.len() != before;
        if removed {
            if self.active.as_deref() == Some(id) {
                self.active = None;
            }
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn append_user_message(
        &mut self,
        project_id: &str,
        text: &str,
    ) -> Result<u64, Box<dyn std::error::Error>> {
        let project = self.project_mut(project_id)?;
        let id = project.next_message_id();
        project.messages.push(StoredMessage {
            id,
            role: Role::User,
            text: text.to_string(),
            sources: None,
        });
        project.updated_at = Utc::now().timestamp_millis();
        self.persist()?;
        Ok(id)
    }

    /// Append the empty model message that the streaming turn will fill in.
    pub fn begin_model_message(
        &mut self,
        project_id: &str,
    ) -> Result<u64, Box<dyn std::error::Error>> {
        let project = self.project_mut(project_id)?;
        let id = project.next_message_id();
        project.messages.push(StoredMessage {
            id,
            role: Role::Model,
            text: String::new(),
            sources: None,
        });
        self.persist()?;
        Ok(id)
    }

    /// Apply one streamed delta to a model message: text is appended, sources
    /// are unioned keyed on uri with last-write-wins titles.
    pub fn apply_model_delta(
        &mut self,
        project_id: &str,
        message_id: u64,
        text_delta: &str,
        sources_delta: &[SourceRef],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let project = self.project_mut(project_id)?;
        let message = project
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| format!("unknown message id {message_id} in project {project_id}"))?;

        message.text.push_str(text_delta);
        message.sources = merge_sources(message.sources.take(), sources_delta);
        self.persist()?;
        Ok(())
    }

    pub fn project(&self, project_id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == project_id)
    }

    fn project_mut(
        &mut self,
        project_id: &str,
    ) -> Result<&mut Project, Box<dyn std::error::Error>> {
        self.projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or_else(|| format!("unknown project id {project_id}").into())
    }
}

fn derive_title(seed: Option<&str>) -> String {
    match seed {
        Some(seed) if seed.chars().count() > TITLE_MAX_CHARS => {
            let mut title: String = seed.chars().take(TITLE_MAX_CHARS).collect();
            title.push_str("...");
            title
        }
        Some(seed) => seed.to_string(),
        None => DEFAULT_TITLE.to_string(),
    }
}

/// Union `delta` into `existing` keyed by uri. An empty result collapses to
/// `None` so presentation code can treat absence and emptiness identically.
fn merge_sources(existing: Option<Vec<SourceRef>>, delta: &[SourceRef]) -> Option<Vec<SourceRef>> {
    let mut merged = existing.unwrap_or_default();
    for source in delta {
        match merged.iter_mut().find(|s| s.uri == source.uri) {
            Some(present) => present.title = source.title.clone(),
            None => merged.push(source.clone()),
        }
    }
    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}
