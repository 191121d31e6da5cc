use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteLevel {
    Info,
    Warning,
}

/// Non-fatal condition surfaced alongside a resolution result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub level: NoteLevel,
    pub message: String,
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            NoteLevel::Info => "INFO",
            NoteLevel::Warning => "WARNING",
        };
        write!(f, "[{tag}] {}", self.message)
    }
}

/// Collector for notes; every note is also sent to the `log` facade.
#[derive(Debug, Clone, Default)]
pub struct Notes {
    notes: Vec<Note>,
}

impl Notes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{message}");
        self.notes.push(Note {
            level: NoteLevel::Info,
            message,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.notes.push(Note {
            level: NoteLevel::Warning,
            message,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// True if any note message contains `needle`
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.notes.iter().any(|n| n.message.contains(needle))
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Note> {
        self.notes
    }
}
