//! Authorization policy
//!
//! Every mutation asks [`authorize`] before touching the store. The function
//! is pure: it looks only at the actor and the resource it is handed.

use crate::models::{ChatSession, Comment, Post, User};

/// What the actor wants to act on
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    /// The forum as a whole (creating posts)
    Forum,
    Post(&'a Post),
    Comment(&'a Comment),
    ChatSession(&'a ChatSession),
    Account(&'a User),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Comment,
    Vote,
    Delete,
    Read,
    Write,
    Ban,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

pub fn authorize(actor: &User, resource: Resource<'_>, action: Action) -> Decision {
    if !actor.is_active {
        return Decision::Deny("Account is deactivated");
    }
    if actor.is_banned {
        return Decision::Deny("Account is banned");
    }

    match (resource, action) {
        (Resource::Forum, Action::Create) => Decision::Allow,
        (Resource::Post(_), Action::Comment | Action::Read) => Decision::Allow,
        // voting on your own content is allowed
        (Resource::Post(_) | Resource::Comment(_), Action::Vote) => Decision::Allow,
        (Resource::Post(post), Action::Delete) => owner_or_moderator(actor, post.user_id),
        (Resource::Comment(comment), Action::Delete) => owner_or_moderator(actor, comment.user_id),
        (Resource::ChatSession(session), Action::Read | Action::Write) => {
            if session.user_id == actor.id {
                Decision::Allow
            } else {
                Decision::Deny("Session belongs to another user")
            }
        }
        (Resource::Account(target), Action::Ban) => {
            if !actor.is_admin() {
                Decision::Deny("Only administrators can ban users")
            } else if target.is_admin() {
                Decision::Deny("Administrators cannot be banned")
            } else {
                Decision::Allow
            }
        }
        _ => Decision::Deny("Action not permitted"),
    }
}

fn owner_or_moderator(actor: &User, owner_id: i64) -> Decision {
    if actor.id == owner_id || actor.is_moderator() {
        Decision::Allow
    } else {
        Decision::Deny("Only the author or a moderator can do this")
    }
}
