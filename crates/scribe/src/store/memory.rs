//! In-process store for development and tests.

use async_trait::async_trait;
use scribe_common::{FieldErrors, NewSnippet, NewUser, ScribeError, Snippet, UserIdentity};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    ChallengeStore, CredentialStore, SnippetStore, StoredChallenge, duplicate_message,
};

#[derive(Default)]
struct UserTable {
    next_id: u64,
    rows: BTreeMap<u64, UserIdentity>,
    by_username: HashMap<String, u64>,
    by_telephone: HashMap<String, u64>,
}

#[derive(Default)]
struct SnippetTable {
    next_id: u64,
    rows: BTreeMap<u64, Snippet>,
}

/// Map-backed store. Every table sits behind its own lock.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<UserTable>,
    challenges: RwLock<HashMap<String, StoredChallenge>>,
    snippets: RwLock<SnippetTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    #[cfg(test)]
    pub async fn user_count(&self) -> usize {
        self.users.read().await.rows.len()
    }
}

fn page<T: Clone>(rows: &BTreeMap<u64, T>, offset: usize, limit: usize) -> (usize, Vec<T>) {
    let results = rows.values().skip(offset).take(limit).cloned().collect();
    (rows.len(), results)
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<UserIdentity, ScribeError> {
        let mut table = self.users.write().await;

        let mut errors = FieldErrors::new();
        if table.by_username.contains_key(&user.username) {
            errors.add("username", duplicate_message("username"));
        }
        if table.by_telephone.contains_key(&user.telephone) {
            errors.add("telephone", duplicate_message("telephone"));
        }
        errors.into_result()?;

        table.next_id += 1;
        let id = table.next_id;
        let identity = user.with_id(id);

        table.by_username.insert(identity.username.clone(), id);
        table.by_telephone.insert(identity.telephone.clone(), id);
        table.rows.insert(id, identity.clone());

        Ok(identity)
    }

    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<UserIdentity>, ScribeError> {
        let table = self.users.read().await;
        let id = table
            .by_username
            .get(identifier)
            .or_else(|| table.by_telephone.get(identifier));

        Ok(id.and_then(|id| table.rows.get(id)).cloned())
    }

    async fn get_user(&self, id: u64) -> Result<Option<UserIdentity>, ScribeError> {
        Ok(self.users.read().await.rows.get(&id).cloned())
    }

    async fn list_users(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(usize, Vec<UserIdentity>), ScribeError> {
        Ok(page(&self.users.read().await.rows, offset, limit))
    }

    async fn ping(&self) -> Result<(), ScribeError> {
        Ok(())
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn put_challenge(
        &self,
        session_key: &str,
        challenge: StoredChallenge,
        _ttl_secs: u64,
    ) -> Result<(), ScribeError> {
        // Expiry is carried in the record and checked by the verifier.
        self.challenges
            .write()
            .await
            .insert(session_key.to_string(), challenge);
        Ok(())
    }

    async fn get_challenge(
        &self,
        session_key: &str,
    ) -> Result<Option<StoredChallenge>, ScribeError> {
        Ok(self.challenges.read().await.get(session_key).cloned())
    }

    async fn delete_challenge(&self, session_key: &str) -> Result<(), ScribeError> {
        self.challenges.write().await.remove(session_key);
        Ok(())
    }
}

#[async_trait]
impl SnippetStore for MemoryStore {
    async fn insert_snippet(&self, snippet: NewSnippet) -> Result<Snippet, ScribeError> {
        let mut table = self.snippets.write().await;
        table.next_id += 1;
        let snippet = snippet.with_id(table.next_id);
        table.rows.insert(snippet.id, snippet.clone());
        Ok(snippet)
    }

    async fn get_snippet(&self, id: u64) -> Result<Option<Snippet>, ScribeError> {
        Ok(self.snippets.read().await.rows.get(&id).cloned())
    }

    async fn update_snippet(&self, snippet: Snippet) -> Result<Snippet, ScribeError> {
        let mut table = self.snippets.write().await;
        match table.rows.get_mut(&snippet.id) {
            Some(row) => {
                *row = snippet.clone();
                Ok(snippet)
            }
            None => Err(ScribeError::NotFound),
        }
    }

    async fn delete_snippet(&self, id: u64) -> Result<bool, ScribeError> {
        Ok(self.snippets.write().await.rows.remove(&id).is_some())
    }

    async fn list_snippets(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(usize, Vec<Snippet>), ScribeError> {
        Ok(page(&self.snippets.read().await.rows, offset, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_user(username: &str, telephone: &str) -> NewUser {
        NewUser {
            username: username.into(),
            telephone: telephone.into(),
            email: format!("{}@example.com", username),
            password_hash: "hash".into(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            date_joined: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_find_by_username_or_telephone() {
        let store = MemoryStore::new();
        let alice = store
            .insert_user(new_user("alice", "13800000000"))
            .await
            .unwrap();

        let by_name = store.find_by_identifier("alice").await.unwrap();
        let by_phone = store.find_by_identifier("13800000000").await.unwrap();
        assert_eq!(by_name.as_ref().map(|u| u.id), Some(alice.id));
        assert_eq!(by_phone.as_ref().map(|u| u.id), Some(alice.id));
        assert!(store.find_by_identifier("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uniqueness_reports_each_field() {
        let store = MemoryStore::new();
        store
            .insert_user(new_user("alice", "13800000000"))
            .await
            .unwrap();

        let err = store
            .insert_user(new_user("alice", "13800000000"))
            .await
            .unwrap_err();
        match err {
            ScribeError::Validation(errors) => {
                assert!(errors.contains("username"));
                assert!(errors.contains("telephone"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = store
            .insert_user(new_user("carol", "13800000000"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScribeError::Validation(ref e) if !e.contains("username")));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_inserts_admit_one() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_user(new_user("race", "13900000000")).await
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_list_users_pages_in_id_order() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .insert_user(new_user(&format!("user{i}"), &format!("1380000000{i}")))
                .await
                .unwrap();
        }

        let (count, users) = store.list_users(2, 2).await.unwrap();
        assert_eq!(count, 5);
        assert_eq!(users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_challenge_overwrite() {
        let store = MemoryStore::new();
        let first = StoredChallenge {
            answer: "aaaa".into(),
            created_at: 0,
            expires_at: 100,
        };
        let second = StoredChallenge {
            answer: "bbbb".into(),
            ..first.clone()
        };

        store.put_challenge("s", first, 100).await.unwrap();
        store.put_challenge("s", second.clone(), 100).await.unwrap();
        assert_eq!(store.get_challenge("s").await.unwrap(), Some(second));

        store.delete_challenge("s").await.unwrap();
        assert_eq!(store.get_challenge("s").await.unwrap(), None);
    }
}
