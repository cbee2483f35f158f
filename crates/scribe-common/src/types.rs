//! Core types shared across Scribe components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account.
///
/// `username` and `telephone` are each globally unique and either one can be
/// used to log in. `password_hash` is an argon2 PHC string; the plaintext is
/// never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: u64,
    pub username: String,
    pub telephone: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
}

impl UserIdentity {
    /// Projection safe to hand to clients
    pub fn public(&self) -> PublicUser {
        PublicUser {
            url: format!("/users/{}/", self.id),
            id: self.id,
            telephone: self.telephone.clone(),
            email: self.email.clone(),
            username: self.username.clone(),
            is_active: self.is_active,
        }
    }
}

/// Fields handed to a credential store for insertion (id is store-assigned)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub telephone: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
}

impl NewUser {
    pub fn with_id(self, id: u64) -> UserIdentity {
        UserIdentity {
            id,
            username: self.username,
            telephone: self.telephone,
            email: self.email,
            password_hash: self.password_hash,
            is_active: self.is_active,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
            date_joined: self.date_joined,
        }
    }
}

/// Public user fields (never includes the password hash)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub url: String,
    pub id: u64,
    pub telephone: String,
    pub email: String,
    pub username: String,
    pub is_active: bool,
}

/// A code snippet owned by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: u64,
    /// Weak reference to the owning user
    pub owner_id: u64,
    pub owner_username: String,
    pub title: String,
    pub code: String,
    pub linenos: bool,
    pub language: String,
    pub style: String,
    pub created: DateTime<Utc>,
}

impl Snippet {
    pub fn view(&self) -> SnippetView {
        SnippetView {
            url: format!("/snippets/{}/", self.id),
            id: self.id,
            highlight: format!("/snippets/{}/highlight/", self.id),
            owner: self.owner_username.clone(),
            title: self.title.clone(),
            code: self.code.clone(),
            linenos: self.linenos,
            language: self.language.clone(),
            style: self.style.clone(),
            created: self.created,
        }
    }
}

/// Snippet fields before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSnippet {
    pub owner_id: u64,
    pub owner_username: String,
    pub title: String,
    pub code: String,
    pub linenos: bool,
    pub language: String,
    pub style: String,
    pub created: DateTime<Utc>,
}

impl NewSnippet {
    pub fn with_id(self, id: u64) -> Snippet {
        Snippet {
            id,
            owner_id: self.owner_id,
            owner_username: self.owner_username,
            title: self.title,
            code: self.code,
            linenos: self.linenos,
            language: self.language,
            style: self.style,
            created: self.created,
        }
    }
}

/// Client-facing snippet representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetView {
    pub url: String,
    pub id: u64,
    pub highlight: String,
    pub owner: String,
    pub title: String,
    pub code: String,
    pub linenos: bool,
    pub language: String,
    pub style: String,
    pub created: DateTime<Utc>,
}

/// One page of a list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Build a page with `next`/`previous` links rooted at `path`.
    ///
    /// `page` is 1-based.
    pub fn new(path: &str, page: usize, page_size: usize, count: usize, results: Vec<T>) -> Self {
        let next = (page * page_size < count).then(|| format!("{}?page={}", path, page + 1));
        let previous = match page {
            0 | 1 => None,
            2 => Some(path.to_string()),
            _ => Some(format!("{}?page={}", path, page - 1)),
        };
        Self {
            count,
            next,
            previous,
            results,
        }
    }
}

/// Issued bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    /// Expiry (Unix epoch seconds)
    pub expires_at: i64,
}
