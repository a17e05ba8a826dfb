//! Votes on posts and comments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::validation::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Up,
    Down,
}

impl VoteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteKind::Up => "up",
            VoteKind::Down => "down",
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(VoteKind::Up),
            "down" => Ok(VoteKind::Down),
            _ => Err(ValidationError::InvalidChoice {
                field: "vote_type",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for VoteKind {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The thing being voted on. Each target kind has its own vote table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteTarget {
    Post(i64),
    Comment(i64),
}

impl VoteTarget {
    pub fn id(self) -> i64 {
        match self {
            VoteTarget::Post(id) | VoteTarget::Comment(id) => id,
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            VoteTarget::Post(_) => "post_votes",
            VoteTarget::Comment(_) => "comment_votes",
        }
    }

    /// Foreign-key column naming the target in its vote table
    pub fn column(self) -> &'static str {
        match self {
            VoteTarget::Post(_) => "post_id",
            VoteTarget::Comment(_) => "comment_id",
        }
    }
}

/// A stored vote row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(rename = "vote_type", try_from = "String")]
    pub kind: VoteKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Vote tally for one target. Always computed from the vote rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Score {
    pub up: i64,
    pub down: i64,
}

impl Score {
    pub fn value(self) -> i64 {
        self.up - self.down
    }
}
