//! Adapter configuration.

use uuid::Uuid;

/// Textual form of generated record ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdFormat {
    /// `67e55044-10b1-426f-9247-bb680e5fe0c8`
    #[default]
    Hyphenated,
    /// `67e5504410b1426f9247bb680e5fe0c8`
    Simple,
}

impl IdFormat {
    /// Renders a UUID in this format.
    #[must_use]
    pub fn render(self, uuid: Uuid) -> String {
        match self {
            Self::Hyphenated => uuid.hyphenated().to_string(),
            Self::Simple => uuid.simple().to_string(),
        }
    }
}

/// How relationship names map to stored field names.
///
/// Projection and relationship patching both go through this, so a
/// relationship is always read and written under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldNaming {
    /// Appended to belongs-to relationship names.
    pub belongs_to_suffix: &'static str,
    /// Appended to has-many relationship names.
    pub has_many_suffix: &'static str,
}

impl FieldNaming {
    /// Plain relationship names, no suffixes.
    #[must_use]
    pub const fn plain() -> Self {
        Self {
            belongs_to_suffix: "",
            has_many_suffix: "",
        }
    }

    /// `post` becomes `post_id`, `comments` becomes `comments_ids`.
    #[must_use]
    pub const fn suffixed() -> Self {
        Self {
            belongs_to_suffix: "_id",
            has_many_suffix: "_ids",
        }
    }

    /// Sets the belongs-to suffix.
    #[must_use]
    pub const fn belongs_to_suffix(mut self, suffix: &'static str) -> Self {
        self.belongs_to_suffix = suffix;
        self
    }

    /// Sets the has-many suffix.
    #[must_use]
    pub const fn has_many_suffix(mut self, suffix: &'static str) -> Self {
        self.has_many_suffix = suffix;
        self
    }

    /// Stored key of a belongs-to relationship.
    #[must_use]
    pub fn belongs_to_key(&self, name: &str) -> String {
        format!("{name}{}", self.belongs_to_suffix)
    }

    /// Stored key of a has-many relationship.
    #[must_use]
    pub fn has_many_key(&self, name: &str) -> String {
        format!("{name}{}", self.has_many_suffix)
    }
}

/// Configuration for an [`Adapter`](crate::Adapter).
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the logical database, used in logs.
    pub database_name: String,

    /// Format of ids produced by the id generator.
    pub id_format: IdFormat,

    /// Relationship field naming.
    pub naming: FieldNaming,

    /// Number of events the feed keeps for polling.
    pub event_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_name: "relstore".to_string(),
            id_format: IdFormat::Hyphenated,
            naming: FieldNaming::plain(),
            event_history: 1000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the database name.
    #[must_use]
    pub fn database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    /// Sets the id format.
    #[must_use]
    pub fn id_format(mut self, format: IdFormat) -> Self {
        self.id_format = format;
        self
    }

    /// Sets the relationship field naming.
    #[must_use]
    pub fn naming(mut self, naming: FieldNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Sets the event history size.
    #[must_use]
    pub fn event_history(mut self, size: usize) -> Self {
        self.event_history = size;
        self
    }
}
