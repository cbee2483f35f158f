//! Shared constants for Scribe components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8000";

/// Captcha alphabet: digits, lowercase, uppercase
pub const CAPTCHA_ALPHABET: &[u8; 62] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Default captcha challenge length
pub const DEFAULT_CAPTCHA_LENGTH: usize = 4;

/// Longest challenge a client may request
pub const MAX_CAPTCHA_LENGTH: usize = 8;

/// CAPTCHA challenge expiry (5 minutes)
pub const CAPTCHA_TTL_SECS: u64 = 300;

/// Access token validity (5 minutes)
pub const TOKEN_TTL_SECS: u64 = 300;

/// How long a token chain may keep being refreshed (7 days)
pub const TOKEN_REFRESH_WINDOW_SECS: u64 = 7 * 24 * 3600;

/// Retry-After hint sent with 503 responses
pub const RETRY_AFTER_SECS: u64 = 5;

/// Default page size for list endpoints
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Maximum username length
pub const USERNAME_MAX_LEN: usize = 150;

/// Telephone numbers are exactly this many ASCII digits
pub const TELEPHONE_LEN: usize = 11;

/// Maximum length of snippet title, language, and style
pub const SNIPPET_FIELD_MAX_LEN: usize = 100;

/// Redis key prefixes
pub mod redis_keys {
    /// User record: user:{id}
    pub const USER_PREFIX: &str = "user:";

    /// Username index: user:username:{username} -> id
    pub const USERNAME_INDEX_PREFIX: &str = "user:username:";

    /// Telephone index: user:telephone:{telephone} -> id
    pub const TELEPHONE_INDEX_PREFIX: &str = "user:telephone:";

    /// User id counter
    pub const USER_ID_SEQ: &str = "scribe:seq:user";

    /// Sorted set of user ids
    pub const USER_IDS: &str = "scribe:users";

    /// CAPTCHA challenge: captcha:{session_key}
    pub const CAPTCHA_PREFIX: &str = "captcha:";

    /// Snippet record: snippet:{id}
    pub const SNIPPET_PREFIX: &str = "snippet:";

    /// Snippet id counter
    pub const SNIPPET_ID_SEQ: &str = "scribe:seq:snippet";

    /// Sorted set of snippet ids
    pub const SNIPPET_IDS: &str = "scribe:snippets";
}

/// HTTP header and cookie names
pub mod headers {
    /// Session cookie carrying the captcha session id
    pub const SESSION_COOKIE: &str = "sessionid";

    /// Accepted `Authorization` scheme prefixes
    pub const AUTH_SCHEMES: [&str; 2] = ["Bearer", "JWT"];
}
