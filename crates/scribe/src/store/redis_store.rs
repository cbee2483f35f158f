//! Redis-backed store.
//!
//! Records are JSON strings under `user:{id}` / `snippet:{id}`, with sorted
//! sets of ids for paging and plain keys as the unique username/telephone
//! indexes. User insertion runs as a single Lua script so the uniqueness check
//! and the writes cannot interleave with a concurrent registration.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use scribe_common::constants::redis_keys;
use scribe_common::{FieldErrors, NewSnippet, NewUser, ScribeError, Snippet, UserIdentity};
use serde::de::DeserializeOwned;

use super::{
    ChallengeStore, CredentialStore, SnippetStore, StoredChallenge, duplicate_message,
};

/// KEYS: username index, telephone index, id sequence, id set
/// ARGV: user record prefix, user JSON (without id)
///
/// Returns the new id, -1 if the username is taken, -2 if the telephone is
/// taken, -3 if both are.
const INSERT_USER_SCRIPT: &str = r#"
local taken = 0
if redis.call('EXISTS', KEYS[1]) == 1 then taken = taken + 1 end
if redis.call('EXISTS', KEYS[2]) == 1 then taken = taken + 2 end
if taken > 0 then return -taken end
local id = redis.call('INCR', KEYS[3])
local user = cjson.decode(ARGV[2])
user['id'] = id
redis.call('SET', ARGV[1] .. id, cjson.encode(user))
redis.call('SET', KEYS[1], id)
redis.call('SET', KEYS[2], id)
redis.call('ZADD', KEYS[4], id, id)
return id
"#;

/// Store backed by a shared Redis connection manager
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    insert_user: redis::Script,
}

fn backend(err: redis::RedisError) -> ScribeError {
    tracing::error!(error = %err, "Redis operation failed");
    ScribeError::Storage(err.to_string())
}

fn decode<T: DeserializeOwned>(key: &str, data: &str) -> Result<T, ScribeError> {
    serde_json::from_str(data)
        .map_err(|e| ScribeError::Internal(format!("corrupt record at {}: {}", key, e)))
}

impl RedisStore {
    /// Connect to Redis with connection manager (handles reconnection)
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client =
            redis::Client::open(redis_url).context("Failed to create Redis client")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            conn,
            insert_user: redis::Script::new(INSERT_USER_SCRIPT),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ScribeError> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(key).await.map_err(backend)?;
        data.map(|d| decode(key, &d)).transpose()
    }

    /// Page through an id sorted set and fetch the records it names
    async fn page_of<T: DeserializeOwned>(
        &self,
        index: &str,
        prefix: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(usize, Vec<T>), ScribeError> {
        let mut conn = self.conn.clone();
        let count: usize = conn.zcard(index).await.map_err(backend)?;
        if limit == 0 || offset >= count {
            return Ok((count, Vec::new()));
        }

        let stop = (offset + limit - 1) as isize;
        let ids: Vec<u64> = conn
            .zrange(index, offset as isize, stop)
            .await
            .map_err(backend)?;
        if ids.is_empty() {
            return Ok((count, Vec::new()));
        }

        let keys: Vec<String> = ids.iter().map(|id| format!("{}{}", prefix, id)).collect();
        let rows: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        let mut results = Vec::with_capacity(rows.len());
        for (key, row) in keys.iter().zip(rows) {
            // A record deleted between ZRANGE and MGET is skipped.
            if let Some(data) = row {
                results.push(decode(key, &data)?);
            }
        }
        Ok((count, results))
    }
}

#[async_trait]
impl CredentialStore for RedisStore {
    async fn insert_user(&self, user: NewUser) -> Result<UserIdentity, ScribeError> {
        let username_key = format!("{}{}", redis_keys::USERNAME_INDEX_PREFIX, user.username);
        let telephone_key = format!("{}{}", redis_keys::TELEPHONE_INDEX_PREFIX, user.telephone);
        let payload = serde_json::to_string(&user)
            .map_err(|e| ScribeError::Internal(e.to_string()))?;

        let mut conn = self.conn.clone();
        let result: i64 = self
            .insert_user
            .key(&username_key)
            .key(&telephone_key)
            .key(redis_keys::USER_ID_SEQ)
            .key(redis_keys::USER_IDS)
            .arg(redis_keys::USER_PREFIX)
            .arg(payload)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        if result < 0 {
            let taken = -result;
            let mut errors = FieldErrors::new();
            if taken & 1 != 0 {
                errors.add("username", duplicate_message("username"));
            }
            if taken & 2 != 0 {
                errors.add("telephone", duplicate_message("telephone"));
            }
            tracing::debug!(username = %user.username, "Rejected duplicate identity");
            return Err(ScribeError::Validation(errors));
        }

        Ok(user.with_id(result as u64))
    }

    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<UserIdentity>, ScribeError> {
        let mut conn = self.conn.clone();
        let mut id: Option<u64> = conn
            .get(format!("{}{}", redis_keys::USERNAME_INDEX_PREFIX, identifier))
            .await
            .map_err(backend)?;
        if id.is_none() {
            id = conn
                .get(format!("{}{}", redis_keys::TELEPHONE_INDEX_PREFIX, identifier))
                .await
                .map_err(backend)?;
        }

        match id {
            Some(id) => self.get_user(id).await,
            None => Ok(None),
        }
    }

    async fn get_user(&self, id: u64) -> Result<Option<UserIdentity>, ScribeError> {
        self.get_json(&format!("{}{}", redis_keys::USER_PREFIX, id))
            .await
    }

    async fn list_users(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(usize, Vec<UserIdentity>), ScribeError> {
        self.page_of(redis_keys::USER_IDS, redis_keys::USER_PREFIX, offset, limit)
            .await
    }

    async fn ping(&self) -> Result<(), ScribeError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl ChallengeStore for RedisStore {
    async fn put_challenge(
        &self,
        session_key: &str,
        challenge: StoredChallenge,
        ttl_secs: u64,
    ) -> Result<(), ScribeError> {
        let key = format!("{}{}", redis_keys::CAPTCHA_PREFIX, session_key);
        let value = serde_json::to_string(&challenge)
            .map_err(|e| ScribeError::Internal(e.to_string()))?;

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&key, &value, ttl_secs)
            .await
            .map_err(backend)
    }

    async fn get_challenge(
        &self,
        session_key: &str,
    ) -> Result<Option<StoredChallenge>, ScribeError> {
        self.get_json(&format!("{}{}", redis_keys::CAPTCHA_PREFIX, session_key))
            .await
    }

    async fn delete_challenge(&self, session_key: &str) -> Result<(), ScribeError> {
        let key = format!("{}{}", redis_keys::CAPTCHA_PREFIX, session_key);
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&key).await.map_err(backend)
    }
}

#[async_trait]
impl SnippetStore for RedisStore {
    async fn insert_snippet(&self, snippet: NewSnippet) -> Result<Snippet, ScribeError> {
        let mut conn = self.conn.clone();
        let id: u64 = conn
            .incr(redis_keys::SNIPPET_ID_SEQ, 1)
            .await
            .map_err(backend)?;

        let snippet = snippet.with_id(id);
        let key = format!("{}{}", redis_keys::SNIPPET_PREFIX, id);
        let value = serde_json::to_string(&snippet)
            .map_err(|e| ScribeError::Internal(e.to_string()))?;

        let _: () = redis::pipe()
            .atomic()
            .set(&key, &value)
            .ignore()
            .zadd(redis_keys::SNIPPET_IDS, id, id)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        Ok(snippet)
    }

    async fn get_snippet(&self, id: u64) -> Result<Option<Snippet>, ScribeError> {
        self.get_json(&format!("{}{}", redis_keys::SNIPPET_PREFIX, id))
            .await
    }

    async fn update_snippet(&self, snippet: Snippet) -> Result<Snippet, ScribeError> {
        let key = format!("{}{}", redis_keys::SNIPPET_PREFIX, snippet.id);
        let value = serde_json::to_string(&snippet)
            .map_err(|e| ScribeError::Internal(e.to_string()))?;

        // SET XX only overwrites a record that still exists.
        let mut conn = self.conn.clone();
        let updated: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&value)
            .arg("XX")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        match updated {
            Some(_) => Ok(snippet),
            None => Err(ScribeError::NotFound),
        }
    }

    async fn delete_snippet(&self, id: u64) -> Result<bool, ScribeError> {
        let key = format!("{}{}", redis_keys::SNIPPET_PREFIX, id);
        let mut conn = self.conn.clone();
        let (removed, _): (u64, u64) = redis::pipe()
            .atomic()
            .del(&key)
            .zrem(redis_keys::SNIPPET_IDS, id)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(removed > 0)
    }

    async fn list_snippets(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(usize, Vec<Snippet>), ScribeError> {
        self.page_of(redis_keys::SNIPPET_IDS, redis_keys::SNIPPET_PREFIX, offset, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    //! These run against a live, disposable Redis database named by
    //! `SCRIBE_TEST_REDIS_URL`; the database is flushed first.
    //! `cargo test -- --ignored` runs them.

    use super::*;
    use chrono::Utc;

    async fn store() -> Option<RedisStore> {
        let url = std::env::var("SCRIBE_TEST_REDIS_URL").ok()?;
        let store = RedisStore::connect(&url).await.unwrap();
        let mut conn = store.conn.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await.unwrap();
        Some(store)
    }

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

    fn new_snippet(title: &str) -> NewSnippet {
        NewSnippet {
            owner_id: 1,
            owner_username: "alice".into(),
            title: title.into(),
            code: "print(1)".into(),
            linenos: false,
            language: "python".into(),
            style: "friendly".into(),
            created: Utc::now(),
        }
    }

    // Single test so the flush cannot race a sibling test.
    #[tokio::test]
    #[ignore]
    async fn test_redis_store_against_live_server() {
        let Some(store) = store().await else {
            eprintln!("SCRIBE_TEST_REDIS_URL not set; skipping");
            return;
        };
        store.ping().await.unwrap();

        // Users: insert, index lookups, duplicate bitmask
        let alice = store
            .insert_user(new_user("alice", "13800000000"))
            .await
            .unwrap();
        assert_eq!(alice.id, 1);
        let by_phone = store.find_by_identifier("13800000000").await.unwrap();
        assert_eq!(by_phone.map(|u| u.username), Some("alice".to_string()));

        let both = store
            .insert_user(new_user("alice", "13800000000"))
            .await
            .unwrap_err();
        match both {
            ScribeError::Validation(errors) => {
                assert_eq!(errors.get("username"), Some(&[duplicate_message("username")][..]));
                assert_eq!(errors.get("telephone"), Some(&[duplicate_message("telephone")][..]));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let name_only = store
            .insert_user(new_user("alice", "13900000000"))
            .await
            .unwrap_err();
        assert!(
            matches!(name_only, ScribeError::Validation(ref e) if e.contains("username") && !e.contains("telephone"))
        );

        let phone_only = store
            .insert_user(new_user("bob", "13800000000"))
            .await
            .unwrap_err();
        assert!(
            matches!(phone_only, ScribeError::Validation(ref e) if e.contains("telephone") && !e.contains("username"))
        );

        // Rejected inserts must not consume ids
        for i in 2..=5 {
            let user = store
                .insert_user(new_user(&format!("user{i}"), &format!("1370000000{i}")))
                .await
                .unwrap();
            assert_eq!(user.id, i);
        }

        // Paging
        let (count, page) = store.list_users(2, 2).await.unwrap();
        assert_eq!(count, 5);
        assert_eq!(page.iter().map(|u| u.id).collect::<Vec<_>>(), vec![3, 4]);
        let (count, past_end) = store.list_users(10, 2).await.unwrap();
        assert_eq!(count, 5);
        assert!(past_end.is_empty());

        // Snippets: update only touches live records, delete drops the index entry
        let first = store.insert_snippet(new_snippet("one")).await.unwrap();
        let second = store.insert_snippet(new_snippet("two")).await.unwrap();

        let mut renamed = first.clone();
        renamed.title = "renamed".into();
        store.update_snippet(renamed).await.unwrap();
        assert_eq!(
            store.get_snippet(first.id).await.unwrap().map(|s| s.title),
            Some("renamed".to_string())
        );

        assert!(store.delete_snippet(second.id).await.unwrap());
        assert!(!store.delete_snippet(second.id).await.unwrap());
        assert!(matches!(
            store.update_snippet(second.clone()).await,
            Err(ScribeError::NotFound)
        ));
        assert!(store.get_snippet(second.id).await.unwrap().is_none());

        let (count, snippets) = store.list_snippets(0, 10).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(snippets[0].id, first.id);

        // Challenges expire server-side
        let challenge = StoredChallenge {
            answer: "abcd".into(),
            created_at: 0,
            expires_at: 1,
        };
        store.put_challenge("sid", challenge.clone(), 60).await.unwrap();
        assert_eq!(store.get_challenge("sid").await.unwrap(), Some(challenge));
        let mut conn = store.conn.clone();
        let ttl: i64 = conn
            .ttl(format!("{}sid", redis_keys::CAPTCHA_PREFIX))
            .await
            .unwrap();
        assert!(ttl > 0 && ttl <= 60);
        store.delete_challenge("sid").await.unwrap();
        assert!(store.get_challenge("sid").await.unwrap().is_none());
    }
}
