//! Services layer - Business logic
//!
//! Services validate input, consult the policy and coordinate repositories.
//! Each one reports failures through its own error enum.

pub mod chat;
pub mod forum;
pub mod llm;
pub mod password;
pub mod policy;
pub mod professional;
pub mod user;

pub use chat::{ChatService, ChatServiceError, SessionView};
pub use forum::{ForumService, ForumServiceError, PostDetail, RecentActivity};
pub use llm::{ChatModel, ChatTurn, GeminiChatModel, TurnRole, SYSTEM_PROMPT};
pub use password::{hash_password, validate_password_strength, verify_password};
pub use policy::{authorize, Action, Decision, Resource};
pub use professional::{Credentials, Dashboard, ProfessionalService};
pub use user::{
    AccountType, ChangePasswordInput, LoginInput, RegisterInput, UpdateDetailsInput, UserService,
    UserServiceError,
};
