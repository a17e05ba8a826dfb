//! Database repositories
//!
//! One repository per aggregate. Each exposes a trait used by the services
//! and an sqlx implementation that serves both SQLite and MySQL.

use sqlx::mysql::MySqlQueryResult;
use sqlx::sqlite::SqliteQueryResult;

/// Run the same query body against whichever backend the pool holds.
///
/// The body is expanded once per driver with `$p` bound to the typed pool,
/// so it must only use SQL both dialects accept.
macro_rules! on_pool {
    ($pool:expr, $p:ident => $body:expr) => {
        match $pool.backend() {
            $crate::db::Backend::Sqlite($p) => $body,
            $crate::db::Backend::Mysql($p) => $body,
        }
    };
}
pub(crate) use on_pool;

/// Auto-increment id of the row an INSERT just created
pub(crate) trait InsertId {
    fn insert_id(&self) -> i64;
}

impl InsertId for SqliteQueryResult {
    fn insert_id(&self) -> i64 {
        self.last_insert_rowid()
    }
}

impl InsertId for MySqlQueryResult {
    fn insert_id(&self) -> i64 {
        self.last_insert_id() as i64
    }
}

/// Whether `err` was caused by a UNIQUE constraint on either backend
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    })
}

pub mod auth_session;
pub mod chat;
pub mod comment;
pub mod post;
pub mod professional;
pub mod user;
pub mod vote;

pub use auth_session::{AuthSessionRepository, SqlxAuthSessionRepository};
pub use chat::{ChatRepository, SqlxChatRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use professional::{ProfessionalRepository, SqlxProfessionalRepository};
pub use user::{SqlxUserRepository, UserRepository};
pub use vote::{SqlxVoteRepository, VoteRepository};
