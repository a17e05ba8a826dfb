//! Data models
//!
//! Entities of the identity, forum and chatbot stores, plus the input types
//! and validation rules applied before anything reaches the database.

mod auth_session;
mod chat;
mod comment;
mod post;
mod professional;
mod user;
mod validation;
mod vote;

pub use auth_session::AuthSession;
pub use chat::{
    validate_message_text, ChatMessage, ChatSession, MessageRole, NewMessage, MESSAGE_TEXT_MAX,
};
pub use comment::{validate_comment_text, Comment, CommentWithMeta, COMMENT_TEXT_MAX};
pub use post::{
    clamp_page, generate_slug, slug_candidate, ContentStatus, CreatePostInput, Page, Post,
    PostSummary, DELETED_SENTINEL, POST_TEXT_MAX, TITLE_MAX,
};
pub use professional::{
    validate_flair, Education, EducationInput, Employment, EmploymentInput, ProfessionalUser,
};
pub use user::{validate_email, User, UserRole, BAN_REASON_MAX, DESCRIPTION_MAX, NAME_MAX};
pub use validation::{check_length, require_text, ValidationError};
pub use vote::{Score, Vote, VoteKind, VoteTarget};
