use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A software component tracked by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Component {
    pub id: i32,
    pub name: String,
    /// Category label such as "Service" or "Library"
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    /// Owning team id
    pub team: i32,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub id: i32,
    pub name: String,
}

/// Generated identicon for a component, keyed by the component id
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Image {
    pub id: i32,
    pub image: Vec<u8>,
}

/// Result of an insert-if-absent image write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageInsertOutcome {
    Inserted,
    /// Another writer stored an image for this id first; nothing was changed
    AlreadyExists,
}
