//! Chatbot service
//!
//! Session housekeeping and the message exchange with the model.

use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

use crate::db::repositories::ChatRepository;
use crate::models::{ChatMessage, ChatSession, MessageRole, NewMessage, User, ValidationError};
use crate::services::llm::{history_from_messages, ChatModel, ChatTurn, SYSTEM_PROMPT};
use crate::services::policy::{authorize, Action, Decision, Resource};

#[derive(Debug, thiserror::Error)]
pub enum ChatServiceError {
    #[error("{0}")]
    ValidationError(#[from] ValidationError),

    #[error("Chat session not found: {0}")]
    NotFound(i64),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The model call failed or produced an unusable reply
    #[error("Chatbot unavailable: {0}")]
    Upstream(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A session opened for reading
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
    /// All of the user's session ids, newest first
    pub session_ids: Vec<i64>,
}

pub struct ChatService {
    repo: Arc<dyn ChatRepository>,
    model: Arc<dyn ChatModel>,
}

impl ChatService {
    pub fn new(repo: Arc<dyn ChatRepository>, model: Arc<dyn ChatModel>) -> Self {
        Self { repo, model }
    }

    /// Pick the session to land on when the user opens the chatbot.
    ///
    /// Abandoned (message-less) sessions are deleted first. The newest
    /// remaining session wins; with none left a fresh one is created.
    pub async fn enter(&self, user: &User) -> Result<ChatSession, ChatServiceError> {
        let pruned = self
            .repo
            .delete_empty_sessions(user.id, None)
            .await
            .context("Failed to prune chat sessions")?;
        if pruned > 0 {
            tracing::debug!("Pruned {} empty chat sessions of user {}", pruned, user.id);
        }

        let latest = self
            .repo
            .list_sessions(user.id)
            .await
            .context("Failed to list chat sessions")?
            .into_iter()
            .next();

        match latest {
            Some(session) => Ok(session),
            None => self.create_session(user).await,
        }
    }

    /// Open one of the user's sessions, pruning their other empty sessions.
    pub async fn open(&self, user: &User, session_id: i64) -> Result<SessionView, ChatServiceError> {
        let session = self.owned_session(user, session_id, Action::Read).await?;

        self.repo
            .delete_empty_sessions(user.id, Some(session.id))
            .await
            .context("Failed to prune chat sessions")?;

        let messages = self
            .repo
            .list_messages(session.id)
            .await
            .context("Failed to list chat messages")?;
        let session_ids = self
            .repo
            .list_sessions(user.id)
            .await
            .context("Failed to list chat sessions")?
            .into_iter()
            .map(|s| s.id)
            .collect();

        Ok(SessionView {
            session,
            messages,
            session_ids,
        })
    }

    pub async fn create_session(&self, user: &User) -> Result<ChatSession, ChatServiceError> {
        let session = self
            .repo
            .create_session(user.id)
            .await
            .context("Failed to create chat session")?;
        tracing::debug!("Created chat session {} for user {}", session.id, user.id);
        Ok(session)
    }

    /// Send `message` to the model and return its reply.
    ///
    /// With a user, the exchange continues and extends `session_id`. Without
    /// one the reply is stateless and nothing is stored.
    pub async fn process(
        &self,
        user: Option<&User>,
        session_id: Option<i64>,
        message: &str,
    ) -> Result<String, ChatServiceError> {
        let question = NewMessage::new(MessageRole::User, message)?;

        let user = match user {
            Some(user) => user,
            None => return self.ask(&[], question.text()).await,
        };

        let session_id = session_id.ok_or(ValidationError::Required("Session"))?;
        let session = self.owned_session(user, session_id, Action::Write).await?;

        let stored = self
            .repo
            .list_messages(session.id)
            .await
            .context("Failed to load conversation")?;
        let history = history_from_messages(&stored);
        let prompt_stored = self
            .repo
            .has_role(session.id, MessageRole::System)
            .await
            .context("Failed to inspect conversation")?;

        // Store the question before the model call; sessions with messages
        // survive pruning by concurrent requests.
        let question_text = question.text().to_string();
        let mut pending = Vec::with_capacity(2);
        if !prompt_stored {
            pending.push(NewMessage::new(MessageRole::System, SYSTEM_PROMPT)?);
        }
        pending.push(question);
        let pending_ids = match self.repo.append_messages(session.id, &pending).await {
            Ok(ids) => ids,
            Err(e) => return Err(self.session_gone_or(session.id, e).await),
        };

        let answer = self.ask(&history, &question_text).await.and_then(|reply| {
            NewMessage::new(MessageRole::Bot, reply).map_err(|e| {
                ChatServiceError::Upstream(anyhow::anyhow!("Model reply rejected: {}", e))
            })
        });
        let answer = match answer {
            Ok(answer) => answer,
            Err(e) => {
                if let Err(cleanup) = self.repo.delete_messages(&pending_ids).await {
                    tracing::warn!("Failed to withdraw unanswered question: {:#}", cleanup);
                }
                return Err(e);
            }
        };

        if let Err(e) = self
            .repo
            .append_messages(session.id, std::slice::from_ref(&answer))
            .await
        {
            return Err(self.session_gone_or(session.id, e).await);
        }

        Ok(answer.text().to_string())
    }

    /// A write failed; report `NotFound` when the session has vanished meanwhile.
    async fn session_gone_or(&self, session_id: i64, error: anyhow::Error) -> ChatServiceError {
        match self.repo.get_session(session_id).await {
            Ok(None) => ChatServiceError::NotFound(session_id),
            _ => ChatServiceError::InternalError(error.context("Failed to store chat exchange")),
        }
    }

    async fn ask(
        &self,
        history: &[ChatTurn],
        message: &str,
    ) -> Result<String, ChatServiceError> {
        self.model
            .generate(SYSTEM_PROMPT, history, message)
            .await
            .map_err(|e| {
                tracing::error!("Chat model call failed: {:#}", e);
                ChatServiceError::Upstream(e)
            })
    }

    /// Load a session, hiding sessions of other users behind `NotFound`.
    async fn owned_session(
        &self,
        user: &User,
        session_id: i64,
        action: Action,
    ) -> Result<ChatSession, ChatServiceError> {
        let session = self
            .repo
            .get_session(session_id)
            .await
            .context("Failed to get chat session")?
            .filter(|s| s.user_id == user.id)
            .ok_or(ChatServiceError::NotFound(session_id))?;

        if let Decision::Deny(reason) = authorize(user, Resource::ChatSession(&session), action) {
            return Err(ChatServiceError::Forbidden(reason.to_string()));
        }
        Ok(session)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::{SqlxChatRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::llm::TurnRole;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Canned model that records what it was sent
    #[derive(Default)]
    pub(crate) struct FakeModel {
        pub reply: Option<String>,
        pub calls: Mutex<Vec<(String, Vec<ChatTurn>, String)>>,
    }

    impl FakeModel {
        pub(crate) fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        async fn generate(
            &self,
            system: &str,
            history: &[ChatTurn],
            message: &str,
        ) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_string(), history.to_vec(), message.to_string()));
            self.reply
                .clone()
                .ok_or_else(|| anyhow::anyhow!("upstream unavailable"))
        }
    }

    struct Fixture {
        service: ChatService,
        repo: Arc<dyn ChatRepository>,
        model: Arc<FakeModel>,
        user: User,
        other: User,
    }

    async fn setup(model: FakeModel) -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let users = SqlxUserRepository::boxed(pool.clone());
        let mut created = Vec::new();
        for name in ["alice", "bob"] {
            created.push(
                users
                    .create(&User::new(
                        name.into(),
                        "First".into(),
                        "Last".into(),
                        format!("{}@example.com", name),
                        "hash".into(),
                    ))
                    .await
                    .unwrap(),
            );
        }
        let other = created.pop().unwrap();
        let user = created.pop().unwrap();

        let repo = SqlxChatRepository::boxed(pool);
        let model = Arc::new(model);
        Fixture {
            service: ChatService::new(repo.clone(), model.clone()),
            repo,
            model,
            user,
            other,
        }
    }

    #[tokio::test]
    async fn test_enter_replaces_empty_session() {
        let f = setup(FakeModel::replying("ok")).await;
        let empty = f.repo.create_session(f.user.id).await.unwrap();

        let landed = f.service.enter(&f.user).await.unwrap();

        assert_ne!(landed.id, empty.id);
        assert!(f.repo.get_session(empty.id).await.unwrap().is_none());
        assert_eq!(f.repo.list_sessions(f.user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enter_keeps_used_session_as_latest() {
        let f = setup(FakeModel::replying("ok")).await;
        let used = f.repo.create_session(f.user.id).await.unwrap();
        f.repo
            .append_messages(used.id, &[NewMessage::new(MessageRole::User, "hi").unwrap()])
            .await
            .unwrap();
        let empty = f.repo.create_session(f.user.id).await.unwrap();

        let landed = f.service.enter(&f.user).await.unwrap();

        assert_eq!(landed.id, used.id);
        assert!(f.repo.get_session(empty.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_prunes_other_empty_sessions_only() {
        let f = setup(FakeModel::replying("ok")).await;
        let stale = f.service.create_session(&f.user).await.unwrap();
        let current = f.service.create_session(&f.user).await.unwrap();

        let view = f.service.open(&f.user, current.id).await.unwrap();

        assert_eq!(view.session.id, current.id);
        assert_eq!(view.session_ids, vec![current.id]);
        assert!(view.messages.is_empty());
        assert!(f.repo.get_session(stale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_foreign_session_is_not_found() {
        let f = setup(FakeModel::replying("ok")).await;
        let theirs = f.service.create_session(&f.other).await.unwrap();

        assert!(matches!(
            f.service.open(&f.user, theirs.id).await,
            Err(ChatServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.process(Some(&f.user), Some(theirs.id), "hello").await,
            Err(ChatServiceError::NotFound(_))
        ));
        assert!(f.model.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_persists_prompt_once() {
        let f = setup(FakeModel::replying("You may have a claim.")).await;
        let session = f.service.create_session(&f.user).await.unwrap();

        let reply = f
            .service
            .process(Some(&f.user), Some(session.id), "My boiler broke")
            .await
            .unwrap();
        assert_eq!(reply, "You may have a claim.");
        f.service
            .process(Some(&f.user), Some(session.id), "Who pays?")
            .await
            .unwrap();

        let roles: Vec<_> = f
            .repo
            .list_messages(session.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Bot,
                MessageRole::User,
                MessageRole::Bot,
            ]
        );

        let calls = f.model.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(system, _, _)| system == SYSTEM_PROMPT));
        assert!(calls[0].1.is_empty());
        let second_roles: Vec<_> = calls[1].1.iter().map(|t| t.role).collect();
        assert_eq!(
            second_roles,
            vec![TurnRole::User, TurnRole::Model]
        );
        assert_eq!(calls[1].2, "Who pays?");
    }

    #[tokio::test]
    async fn test_anonymous_exchange_stores_nothing() {
        let f = setup(FakeModel::replying("General guidance.")).await;
        let reply = f.service.process(None, None, "Is jaywalking legal?").await.unwrap();

        assert_eq!(reply, "General guidance.");
        assert!(f.repo.list_sessions(f.user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_messages_never_reach_model() {
        let f = setup(FakeModel::replying("ok")).await;
        let session = f.service.create_session(&f.user).await.unwrap();

        for text in ["   ".to_string(), "x".repeat(1025)] {
            assert!(matches!(
                f.service.process(Some(&f.user), Some(session.id), &text).await,
                Err(ChatServiceError::ValidationError(_))
            ));
        }
        assert!(matches!(
            f.service.process(Some(&f.user), None, "hello").await,
            Err(ChatServiceError::ValidationError(_))
        ));
        assert!(f.model.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_stores_nothing() {
        let f = setup(FakeModel::failing()).await;
        let session = f.service.create_session(&f.user).await.unwrap();

        assert!(matches!(
            f.service.process(Some(&f.user), Some(session.id), "hello").await,
            Err(ChatServiceError::Upstream(_))
        ));
        assert!(f.repo.list_messages(session.id).await.unwrap().is_empty());
    }

    /// Replies after running the chatbot's session housekeeping, as a
    /// second tab opening the chatbot mid-exchange would
    struct HousekeepingModel {
        repo: Arc<dyn ChatRepository>,
        user_id: i64,
    }

    #[async_trait]
    impl ChatModel for HousekeepingModel {
        async fn generate(
            &self,
            _system: &str,
            _history: &[ChatTurn],
            _message: &str,
        ) -> anyhow::Result<String> {
            self.repo.delete_empty_sessions(self.user_id, None).await?;
            Ok("Keep your receipts.".to_string())
        }
    }

    #[tokio::test]
    async fn test_pruning_during_model_call_spares_active_session() {
        let f = setup(FakeModel::failing()).await;
        let model = Arc::new(HousekeepingModel {
            repo: f.repo.clone(),
            user_id: f.user.id,
        });
        let service = ChatService::new(f.repo.clone(), model);
        let session = service.enter(&f.user).await.unwrap();

        let reply = service
            .process(Some(&f.user), Some(session.id), "Can I get a refund?")
            .await
            .unwrap();

        assert_eq!(reply, "Keep your receipts.");
        assert!(f.repo.get_session(session.id).await.unwrap().is_some());
        let roles: Vec<_> = f
            .repo
            .list_messages(session.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(
            roles,
            vec![MessageRole::System, MessageRole::User, MessageRole::Bot]
        );
    }

    #[tokio::test]
    async fn test_model_failure_keeps_earlier_exchange() {
        let f = setup(FakeModel::failing()).await;
        let session = f.service.create_session(&f.user).await.unwrap();
        f.repo
            .append_messages(
                session.id,
                &[
                    NewMessage::new(MessageRole::System, SYSTEM_PROMPT).unwrap(),
                    NewMessage::new(MessageRole::User, "hi").unwrap(),
                    NewMessage::new(MessageRole::Bot, "hello").unwrap(),
                ],
            )
            .await
            .unwrap();

        assert!(f
            .service
            .process(Some(&f.user), Some(session.id), "again")
            .await
            .is_err());
        assert_eq!(f.repo.list_messages(session.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_oversized_reply_fails_exchange() {
        let f = setup(FakeModel::replying(&"a".repeat(2000))).await;
        let session = f.service.create_session(&f.user).await.unwrap();

        assert!(matches!(
            f.service.process(Some(&f.user), Some(session.id), "hello").await,
            Err(ChatServiceError::Upstream(_))
        ));
        assert!(f.repo.list_messages(session.id).await.unwrap().is_empty());
    }
}
