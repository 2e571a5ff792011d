//! In-memory prompt section store.
//!
//! Narrative prompt content (storyline, stage themes, language rules) is
//! kept in named sections so it can be edited without touching the
//! builder. Restarts reset to defaults; nothing is persisted.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct PromptSection {
    pub key: String,
    pub title: String,
    pub content: String,
}

pub struct PromptStore {
    defaults: HashMap<String, PromptSection>,
    sections: RwLock<HashMap<String, PromptSection>>,
}

impl PromptStore {
    /// Build a store from a list of default sections.
    pub fn with_defaults(defaults: Vec<(&str, &str, &str)>) -> Self {
        let defaults: HashMap<String, PromptSection> = defaults
            .into_iter()
            .map(|(key, title, content)| {
                (
                    key.to_string(),
                    PromptSection {
                        key: key.to_string(),
                        title: title.to_string(),
                        content: content.to_string(),
                    },
                )
            })
            .collect();
        let sections = RwLock::new(defaults.clone());
        Self { defaults, sections }
    }

    /// Section content by key; empty string for unknown keys.
    pub fn get_section(&self, key: &str) -> String {
        self.sections
            .read()
            .expect("prompt store lock")
            .get(key)
            .map(|s| s.content.clone())
            .or_else(|| self.defaults.get(key).map(|s| s.content.clone()))
            .unwrap_or_default()
    }

    #[allow(dead_code)] // Kept for a prompt-editing admin surface
    pub fn all_sections(&self) -> Vec<PromptSection> {
        let mut sections: Vec<PromptSection> = self
            .sections
            .read()
            .expect("prompt store lock")
            .values()
            .cloned()
            .collect();
        sections.sort_by(|a, b| a.key.cmp(&b.key));
        sections
    }

    /// Replace a section's content. Unknown keys are rejected.
    #[allow(dead_code)] // Kept for a prompt-editing admin surface
    pub fn update_section(&self, key: &str, content: &str) -> bool {
        let mut sections = self.sections.write().expect("prompt store lock");
        match sections.get_mut(key) {
            Some(section) => {
                section.content = content.to_string();
                true
            }
            None => false,
        }
    }

    #[allow(dead_code)] // Kept for a prompt-editing admin surface
    pub fn reset_section(&self, key: &str) -> bool {
        let Some(default) = self.defaults.get(key) else {
            return false;
        };
        self.sections
            .write()
            .expect("prompt store lock")
            .insert(key.to_string(), default.clone());
        true
    }

    #[allow(dead_code)] // Kept for a prompt-editing admin surface
    pub fn reset_all(&self) {
        let mut sections = self.sections.write().expect("prompt store lock");
        *sections = self.defaults.clone();
    }
}
