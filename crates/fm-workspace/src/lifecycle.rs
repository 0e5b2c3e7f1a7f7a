// lifecycle.rs — Workspace status, lock state, and submission source type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a workspace.
///
/// ```text
/// Active <-> Released
///   |           |
///   +-----+-----+
///         v
///      Deleted
/// ```
///
/// Deleted is terminal: the files are gone but the record is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Active,
    Released,
    Deleted,
}

impl Status {
    pub fn can_transition_to(&self, next: &Status) -> bool {
        matches!(
            (self, next),
            (Status::Active, Status::Released)
                | (Status::Released, Status::Active)
                | (Status::Active, Status::Deleted)
                | (Status::Released, Status::Deleted)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Active => write!(f, "ACTIVE"),
            Status::Released => write!(f, "RELEASED"),
            Status::Deleted => write!(f, "DELETED"),
        }
    }
}

/// Whether the workspace accepts updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockState {
    Locked,
    #[default]
    Unlocked,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Locked => write!(f, "LOCKED"),
            LockState::Unlocked => write!(f, "UNLOCKED"),
        }
    }
}

/// High-level type of the submission source as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Unknown,
    Invalid,
    #[serde(rename = "ps")]
    Postscript,
    Pdf,
    Html,
    Tex,
}

impl SourceType {
    pub fn is_unknown(&self) -> bool {
        *self == SourceType::Unknown
    }

    pub fn is_invalid(&self) -> bool {
        *self == SourceType::Invalid
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceType::Unknown => "unknown",
            SourceType::Invalid => "invalid",
            SourceType::Postscript => "ps",
            SourceType::Pdf => "pdf",
            SourceType::Html => "html",
            SourceType::Tex => "tex",
        };
        f.write_str(s)
    }
}
