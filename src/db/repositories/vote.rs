//! Vote repository
//!
//! One row per (user, target), changed in place. The unique index on
//! `(user_id, <target>_id)` makes each cast a single atomic upsert on both
//! drivers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

use super::on_pool;
use crate::db::{Backend, DynDatabasePool};
use crate::models::{Score, Vote, VoteKind, VoteTarget};

#[async_trait]
pub trait VoteRepository: Send + Sync {
    /// Record `kind` as the user's vote on `target`.
    ///
    /// Inserts a row when none exists, flips an opposite vote, and leaves a
    /// matching vote untouched.
    async fn cast(&self, user_id: i64, target: VoteTarget, kind: VoteKind) -> Result<()>;

    async fn get(&self, user_id: i64, target: VoteTarget) -> Result<Option<Vote>>;

    /// Count up and down rows for `target`
    async fn score(&self, target: VoteTarget) -> Result<Score>;
}

pub struct SqlxVoteRepository {
    pool: DynDatabasePool,
}

impl SqlxVoteRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn VoteRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl VoteRepository for SqlxVoteRepository {
    async fn cast(&self, user_id: i64, target: VoteTarget, kind: VoteKind) -> Result<()> {
        let result = match self.pool.backend() {
            Backend::Sqlite(pool) => cast_sqlite(pool, user_id, target, kind).await,
            Backend::Mysql(pool) => cast_mysql(pool, user_id, target, kind).await,
        };
        result.with_context(|| format!("Failed to record {} vote on {}", kind, target.table()))
    }

    async fn get(&self, user_id: i64, target: VoteTarget) -> Result<Option<Vote>> {
        let sql = format!(
            "SELECT id, user_id, vote_type, created_at, updated_at FROM {} WHERE user_id = ? AND {} = ?",
            target.table(),
            target.column()
        );
        let vote = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Vote>(&sql)
                .bind(user_id)
                .bind(target.id())
                .fetch_optional(p)
                .await
        })
        .context("Failed to get vote")?;
        Ok(vote)
    }

    async fn score(&self, target: VoteTarget) -> Result<Score> {
        let sql = format!(
            "SELECT vote_type, COUNT(*) FROM {} WHERE {} = ? GROUP BY vote_type",
            target.table(),
            target.column()
        );
        let rows = on_pool!(self.pool, p => {
            sqlx::query_as::<_, (String, i64)>(&sql)
                .bind(target.id())
                .fetch_all(p)
                .await
        })
        .context("Failed to count votes")?;

        let mut score = Score::default();
        for (kind, count) in rows {
            match kind.parse::<VoteKind>() {
                Ok(VoteKind::Up) => score.up += count,
                Ok(VoteKind::Down) => score.down += count,
                Err(_) => tracing::warn!("Ignoring unknown vote type '{}' in {}", kind, target.table()),
            }
        }
        Ok(score)
    }
}

// ============================================================================
// SQLite implementation
// ============================================================================

async fn cast_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    target: VoteTarget,
    kind: VoteKind,
) -> Result<()> {
    let (table, column) = (target.table(), target.column());
    let sql = format!(
        r#"
        INSERT INTO {table} (user_id, {column}, vote_type, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id, {column}) DO UPDATE
            SET vote_type = excluded.vote_type, updated_at = excluded.updated_at
            WHERE {table}.vote_type <> excluded.vote_type
        "#
    );
    let now = Utc::now();

    let mut tx = pool.begin().await?;
    sqlx::query(&sql)
        .bind(user_id)
        .bind(target.id())
        .bind(kind.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

// ============================================================================
// MySQL implementation
// ============================================================================

/// Single-statement upsert on the unique (user, target) key.
///
/// `updated_at` is assigned before `vote_type` because MySQL evaluates the
/// assignments left to right; an unchanged vote keeps its timestamp.
fn mysql_upsert_sql(target: VoteTarget) -> String {
    let (table, column) = (target.table(), target.column());
    format!(
        r#"
        INSERT INTO {table} (user_id, {column}, vote_type, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            updated_at = IF(vote_type <> VALUES(vote_type), VALUES(updated_at), updated_at),
            vote_type = VALUES(vote_type)
        "#
    )
}

async fn cast_mysql(
    pool: &MySqlPool,
    user_id: i64,
    target: VoteTarget,
    kind: VoteKind,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(&mysql_upsert_sql(target))
        .bind(user_id)
        .bind(target.id())
        .bind(kind.as_str())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        CommentRepository, PostRepository, SqlxCommentRepository, SqlxPostRepository,
        SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;
    use proptest::prelude::*;

    struct Fixture {
        votes: Arc<dyn VoteRepository>,
        post_id: i64,
        comment_id: i64,
        voters: Vec<i64>,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let users = SqlxUserRepository::boxed(pool.clone());
        let mut voters = Vec::new();
        for name in ["author", "voter1", "voter2", "voter3"] {
            let user = users
                .create(&User::new(
                    name.into(),
                    "First".into(),
                    "Last".into(),
                    format!("{}@example.com", name),
                    "hash".into(),
                ))
                .await
                .unwrap();
            voters.push(user.id);
        }

        let post = SqlxPostRepository::boxed(pool.clone())
            .create(voters[0], "P", "text", "p", Utc::now())
            .await
            .unwrap();
        let comment = SqlxCommentRepository::boxed(pool.clone())
            .create(post.id, voters[0], "c", Utc::now())
            .await
            .unwrap();

        Fixture {
            votes: SqlxVoteRepository::boxed(pool),
            post_id: post.id,
            comment_id: comment.id,
            voters,
        }
    }

    #[tokio::test]
    async fn test_upvote_then_downvote_flips_single_row() {
        let f = setup().await;
        let target = VoteTarget::Post(f.post_id);
        let voter = f.voters[1];

        f.votes.cast(voter, target, VoteKind::Up).await.unwrap();
        assert_eq!(f.votes.score(target).await.unwrap().value(), 1);

        let first = f.votes.get(voter, target).await.unwrap().unwrap();

        f.votes.cast(voter, target, VoteKind::Down).await.unwrap();
        assert_eq!(f.votes.score(target).await.unwrap(), Score { up: 0, down: 1 });

        let flipped = f.votes.get(voter, target).await.unwrap().unwrap();
        assert_eq!(flipped.id, first.id);
        assert_eq!(flipped.kind, VoteKind::Down);

        f.votes.cast(voter, target, VoteKind::Down).await.unwrap();
        assert_eq!(f.votes.score(target).await.unwrap().value(), -1);
    }

    #[tokio::test]
    async fn test_repeated_vote_is_noop() {
        let f = setup().await;
        let target = VoteTarget::Comment(f.comment_id);

        f.votes.cast(f.voters[1], target, VoteKind::Up).await.unwrap();
        let before = f.votes.get(f.voters[1], target).await.unwrap().unwrap();
        f.votes.cast(f.voters[1], target, VoteKind::Up).await.unwrap();
        let after = f.votes.get(f.voters[1], target).await.unwrap().unwrap();

        assert_eq!(before.id, after.id);
        assert_eq!(before.updated_at, after.updated_at);
        assert_eq!(f.votes.score(target).await.unwrap().value(), 1);
    }

    #[tokio::test]
    async fn test_post_and_comment_votes_are_independent() {
        let f = setup().await;
        f.votes
            .cast(f.voters[1], VoteTarget::Post(f.post_id), VoteKind::Up)
            .await
            .unwrap();
        f.votes
            .cast(f.voters[1], VoteTarget::Comment(f.comment_id), VoteKind::Down)
            .await
            .unwrap();

        assert_eq!(f.votes.score(VoteTarget::Post(f.post_id)).await.unwrap().value(), 1);
        assert_eq!(
            f.votes.score(VoteTarget::Comment(f.comment_id)).await.unwrap().value(),
            -1
        );
    }

    #[tokio::test]
    async fn test_vote_on_missing_target_fails() {
        let f = setup().await;
        let result = f.votes.cast(f.voters[1], VoteTarget::Post(9999), VoteKind::Up).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_mysql_upsert_takes_no_locking_read() {
        let sql = mysql_upsert_sql(VoteTarget::Comment(1));
        assert!(sql.contains("INSERT INTO comment_votes"));
        assert!(sql.contains("ON DUPLICATE KEY UPDATE"));
        assert!(!sql.contains("FOR UPDATE"));

        // the timestamp check must see the old vote_type
        let stamp = sql.find("updated_at = IF").unwrap();
        let kind = sql.find("vote_type = VALUES(vote_type)").unwrap();
        assert!(stamp < kind);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "Requires MySQL server"]
    async fn test_mysql_concurrent_first_votes_keep_one_row() {
        use crate::config::{DatabaseConfig, DatabaseDriver};

        let url = std::env::var("MYSQL_TEST_URL")
            .unwrap_or_else(|_| "mysql://root@localhost/justitia_test".to_string());
        let pool = crate::db::create_pool(&DatabaseConfig {
            driver: DatabaseDriver::Mysql,
            url,
        })
        .await
        .unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let name = format!("v{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let user = SqlxUserRepository::boxed(pool.clone())
            .create(&User::new(
                name.clone(),
                "First".into(),
                "Last".into(),
                format!("{}@example.com", name),
                "hash".into(),
            ))
            .await
            .unwrap();
        let post = SqlxPostRepository::boxed(pool.clone())
            .create(user.id, "P", "text", &name, Utc::now())
            .await
            .unwrap();
        let votes = SqlxVoteRepository::boxed(pool);
        let target = VoteTarget::Post(post.id);
        let user_id = user.id;

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let votes = votes.clone();
            let kind = if i % 2 == 0 { VoteKind::Up } else { VoteKind::Down };
            tasks.spawn(async move { votes.cast(user_id, target, kind).await });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        let score = votes.score(target).await.unwrap();
        assert_eq!(score.up + score.down, 1);
    }

    fn vote_kind() -> impl Strategy<Value = VoteKind> {
        prop_oneof![Just(VoteKind::Up), Just(VoteKind::Down)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// After any sequence of votes, each voter has at most one row whose
        /// kind is their last vote, and the score equals ups minus downs.
        #[test]
        fn last_vote_wins_and_score_matches(
            calls in proptest::collection::vec((0usize..3, vote_kind()), 1..25)
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let f = setup().await;
                let target = VoteTarget::Post(f.post_id);
                let mut last = [None; 3];

                for (who, kind) in &calls {
                    f.votes.cast(f.voters[who + 1], target, *kind).await.unwrap();
                    last[*who] = Some(*kind);
                }

                let mut expected = Score::default();
                for (idx, kind) in last.iter().enumerate() {
                    let stored = f.votes.get(f.voters[idx + 1], target).await.unwrap();
                    prop_assert_eq!(stored.as_ref().map(|v| v.kind), *kind);
                    match kind {
                        Some(VoteKind::Up) => expected.up += 1,
                        Some(VoteKind::Down) => expected.down += 1,
                        None => {}
                    }
                }

                prop_assert_eq!(f.votes.score(target).await.unwrap(), expected);
                Ok(())
            });
            result?;
        }
    }
}
