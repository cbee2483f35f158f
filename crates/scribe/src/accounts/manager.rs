//! User factory over a credential store.
//!
//! Validates the required fields, normalizes the email, hashes the password,
//! then hands the record to the store, which enforces uniqueness.

use chrono::Utc;
use scribe_common::constants::{TELEPHONE_LEN, USERNAME_MAX_LEN};
use scribe_common::{FieldErrors, NewUser, ScribeError, UserIdentity};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::password::PasswordHashing;
use crate::store::CredentialStore;

const DUMMY_PASSWORD: &str = "scribe-no-such-account";

/// The four fields every account needs
#[derive(Debug, Clone, Default)]
pub struct AccountFields {
    pub telephone: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Optional flag overrides; `None` takes the factory default
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtraFlags {
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
}

/// Lower-case the domain part of an email address
pub fn normalize_email(email: &str) -> String {
    match email.trim().rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.trim().to_string(),
    }
}

fn is_valid_email(email: &str) -> bool {
    match email.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !local.chars().any(char::is_whitespace)
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.chars().any(|c| c.is_whitespace() || c == '@')
        }
        None => false,
    }
}

/// Field-level checks applied to a registration before it reaches the factory
pub fn validate_account_fields(fields: &AccountFields) -> Result<(), ScribeError> {
    let mut errors = FieldErrors::new();

    for (name, value) in [
        ("telephone", &fields.telephone),
        ("email", &fields.email),
        ("username", &fields.username),
        ("password", &fields.password),
    ] {
        if value.trim().is_empty() {
            errors.add(name, "This field is required.");
        }
    }

    if fields.username.chars().count() > USERNAME_MAX_LEN {
        errors.add(
            "username",
            format!("Ensure this field has no more than {} characters.", USERNAME_MAX_LEN),
        );
    }

    let telephone = &fields.telephone;
    if !telephone.is_empty()
        && (telephone.len() != TELEPHONE_LEN || !telephone.bytes().all(|b| b.is_ascii_digit()))
    {
        errors.add(
            "telephone",
            format!("Enter a valid telephone number of {} digits.", TELEPHONE_LEN),
        );
    }

    if !fields.email.trim().is_empty() && !is_valid_email(fields.email.trim()) {
        errors.add("email", "Enter a valid email address.");
    }

    errors.into_result()
}

/// Creates and looks up accounts
pub struct UserManager {
    store: Arc<dyn CredentialStore>,
    hashing: Arc<PasswordHashing>,
    /// Stand-in hash verified when a login names no account
    dummy_hash: OnceCell<String>,
}

impl UserManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            hashing: Arc::new(PasswordHashing::new()),
            dummy_hash: OnceCell::new(),
        }
    }

    /// Create a regular account (`is_staff` and `is_superuser` default to false)
    pub async fn create_user(
        &self,
        fields: AccountFields,
        flags: ExtraFlags,
    ) -> Result<UserIdentity, ScribeError> {
        let is_staff = flags.is_staff.unwrap_or(false);
        let is_superuser = flags.is_superuser.unwrap_or(false);
        self.create(fields, flags.is_active.unwrap_or(true), is_staff, is_superuser)
            .await
    }

    /// Create an administrative account. Both flags default to true and must
    /// stay true.
    pub async fn create_superuser(
        &self,
        fields: AccountFields,
        flags: ExtraFlags,
    ) -> Result<UserIdentity, ScribeError> {
        let mut errors = FieldErrors::new();
        if flags.is_staff == Some(false) {
            errors.add("is_staff", "Superuser must have is_staff=True.");
        }
        if flags.is_superuser == Some(false) {
            errors.add("is_superuser", "Superuser must have is_superuser=True.");
        }
        errors.into_result()?;

        self.create(fields, flags.is_active.unwrap_or(true), true, true)
            .await
    }

    async fn create(
        &self,
        fields: AccountFields,
        is_active: bool,
        is_staff: bool,
        is_superuser: bool,
    ) -> Result<UserIdentity, ScribeError> {
        let mut errors = FieldErrors::new();
        for (name, value) in [
            ("telephone", &fields.telephone),
            ("password", &fields.password),
            ("email", &fields.email),
            ("username", &fields.username),
        ] {
            if value.is_empty() {
                errors.add(name, format!("The given {} must be set", name));
            }
        }
        errors.into_result()?;

        let password_hash = self.hash(fields.password).await?;

        let user = NewUser {
            username: fields.username,
            telephone: fields.telephone,
            email: normalize_email(&fields.email),
            password_hash,
            is_active,
            is_staff,
            is_superuser,
            date_joined: Utc::now(),
        };

        let identity = self.store.insert_user(user).await?;

        tracing::info!(
            user_id = identity.id,
            username = %identity.username,
            is_superuser = identity.is_superuser,
            "Created user"
        );

        Ok(identity)
    }

    /// Look up by username OR telephone
    pub async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<UserIdentity>, ScribeError> {
        self.store.find_by_identifier(identifier).await
    }

    pub async fn get(&self, id: u64) -> Result<Option<UserIdentity>, ScribeError> {
        self.store.get_user(id).await
    }

    pub async fn list(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(usize, Vec<UserIdentity>), ScribeError> {
        self.store.list_users(offset, limit).await
    }

    /// Check a plaintext password against the identity's stored hash
    pub async fn verify_password(&self, identity: &UserIdentity, plaintext: &str) -> bool {
        self.verify_hash(identity.password_hash.clone(), plaintext).await
    }

    /// Run one full verification against a throwaway hash.
    ///
    /// A lookup miss pays the same argon2 cost as a wrong password.
    pub async fn verify_dummy_password(&self, plaintext: &str) {
        let hash = match self
            .dummy_hash
            .get_or_try_init(|| self.hash(DUMMY_PASSWORD.to_string()))
            .await
        {
            Ok(hash) => hash.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to prepare dummy password hash");
                return;
            }
        };
        let _ = self.verify_hash(hash, plaintext).await;
    }

    #[cfg(test)]
    pub fn has_dummy_hash(&self) -> bool {
        self.dummy_hash.initialized()
    }

    async fn verify_hash(&self, hash: String, plaintext: &str) -> bool {
        let hashing = self.hashing.clone();
        let plaintext = plaintext.to_string();

        // Argon2 is slow; keep it off the async workers.
        tokio::task::spawn_blocking(move || hashing.verify(&plaintext, &hash))
            .await
            .unwrap_or(false)
    }

    async fn hash(&self, password: String) -> Result<String, ScribeError> {
        let hashing = self.hashing.clone();
        tokio::task::spawn_blocking(move || hashing.hash(&password))
            .await
            .map_err(|e| ScribeError::Internal(format!("hashing task failed: {}", e)))?
    }
}
