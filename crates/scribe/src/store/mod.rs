//! Persistence collaborators.
//!
//! The service talks to storage only through these traits. Two backends
//! implement all of them: Redis for deployments and an in-process map for
//! development and tests. Each backend owns its own synchronization;
//! username/telephone uniqueness is enforced atomically inside `insert_user`.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use scribe_common::{NewSnippet, NewUser, ScribeError, Snippet, UserIdentity};
use serde::{Deserialize, Serialize};

/// Message used when a unique field already exists
pub fn duplicate_message(field: &str) -> String {
    format!("user with this {} already exists.", field)
}

/// Identity records
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user, failing with a field-level validation error when the
    /// username or telephone is taken.
    async fn insert_user(&self, user: NewUser) -> Result<UserIdentity, ScribeError>;

    /// Match `identifier` against username OR telephone
    async fn find_by_identifier(&self, identifier: &str)
        -> Result<Option<UserIdentity>, ScribeError>;

    async fn get_user(&self, id: u64) -> Result<Option<UserIdentity>, ScribeError>;

    /// Users ordered by id: (total count, requested slice)
    async fn list_users(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(usize, Vec<UserIdentity>), ScribeError>;

    /// Liveness probe for readiness checks
    async fn ping(&self) -> Result<(), ScribeError>;
}

/// Stored captcha challenge, keyed by a derived session key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChallenge {
    /// The expected answer
    pub answer: String,
    /// Creation timestamp
    pub created_at: i64,
    /// Expiry timestamp
    pub expires_at: i64,
}

/// Session-keyed captcha answers
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Store a challenge, replacing any earlier one for the same key
    async fn put_challenge(
        &self,
        session_key: &str,
        challenge: StoredChallenge,
        ttl_secs: u64,
    ) -> Result<(), ScribeError>;

    async fn get_challenge(&self, session_key: &str)
        -> Result<Option<StoredChallenge>, ScribeError>;

    async fn delete_challenge(&self, session_key: &str) -> Result<(), ScribeError>;
}

/// Owned snippet records
#[async_trait]
pub trait SnippetStore: Send + Sync {
    async fn insert_snippet(&self, snippet: NewSnippet) -> Result<Snippet, ScribeError>;

    async fn get_snippet(&self, id: u64) -> Result<Option<Snippet>, ScribeError>;

    /// Replace an existing snippet. Returns `NotFound` if it was deleted meanwhile.
    async fn update_snippet(&self, snippet: Snippet) -> Result<Snippet, ScribeError>;

    /// Returns whether a record was removed
    async fn delete_snippet(&self, id: u64) -> Result<bool, ScribeError>;

    async fn list_snippets(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(usize, Vec<Snippet>), ScribeError>;
}
