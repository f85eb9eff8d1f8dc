//! Account Service - identities, credentials and confirmation
//!
//! Owns every write to the `users` table: registration, password and email
//! changes, confirmation through signed tokens, profile edits and the
//! administrator operations (role assignment, deletion).
//!
//! ## Confirmation
//!
//! `confirmed` starts false and flips to true only when a `confirm-identity`
//! token issued for that same identity verifies. Confirming twice reports
//! [`ConfirmOutcome::AlreadyConfirmed`] instead of failing. Tokens are
//! stateless: issuing a new one does not revoke earlier ones.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::auth::{
    hash_password, has_permission, require_permission, validate_password_policy, verify_password,
    Permission, PermissionSet, RoleKind, TokenPurpose, TokenSigner,
};
use crate::db::roles::{self, RoleRow};
use crate::db::users::{self, Gender, NewUser, ProfileFields, UserRow};
use crate::db::WeblogDb;
use crate::mail::{Mailer, Template};
use crate::types::WeblogError;

// ============================================================================
// Types
// ============================================================================

/// Configuration for token lifetimes
#[derive(Debug, Clone)]
pub struct AccountServiceConfig {
    /// Lifetime of confirmation and password reset tokens
    pub token_ttl: Duration,
    /// Lifetime of API access tokens
    pub session_ttl: Duration,
}

impl Default for AccountServiceConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(3600),
            session_ttl: Duration::from_secs(86400),
        }
    }
}

/// Registration input
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Result of a confirmation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmOutcome {
    Confirmed,
    AlreadyConfirmed,
}

/// Result of asking for another confirmation mail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResendOutcome {
    Sent,
    AlreadyConfirmed,
}

/// Partial profile edit; absent fields are left unchanged and an empty
/// string clears an optional text field
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<Gender>,
    pub phone_number: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
}

/// Profile edit by an administrator
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminProfileUpdate {
    #[serde(flatten)]
    pub profile: ProfileUpdate,
    pub role_id: Option<i64>,
    pub confirmed: Option<bool>,
}

// ============================================================================
// Validation helpers
// ============================================================================

/// 3-22 word characters (letters, digits, underscore)
pub fn validate_name(name: &str) -> Result<(), WeblogError> {
    let len = name.chars().count();
    if !(3..=22).contains(&len) {
        return Err(WeblogError::ValidationFailed(
            "name must be 3-22 characters".into(),
        ));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(WeblogError::ValidationFailed(
            "name may only contain letters, digits and underscores".into(),
        ));
    }
    Ok(())
}

/// Trim and lowercase, then check the address has the shape `local@domain.tld`
pub fn normalize_email(email: &str) -> Result<String, WeblogError> {
    let email = email.trim().to_lowercase();
    let invalid = || WeblogError::ValidationFailed(format!("invalid email address: {:?}", email));

    if email.len() > 64 || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    Ok(email)
}

/// SHA-256 hex of the lowercased email, used for avatar URLs
pub fn avatar_hash(email: &str) -> String {
    hex::encode(Sha256::digest(email.to_lowercase().as_bytes()))
}

/// Gravatar image URL for an identity
pub fn gravatar_url(user: &UserRow, size: u32) -> String {
    format!(
        "https://www.gravatar.com/avatar/{}?s={}&d=identicon&r=g",
        user.avatar_hash, size
    )
}

fn length_between(field: &str, value: &str, min: usize, max: usize) -> Result<(), WeblogError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(WeblogError::ValidationFailed(format!(
            "{} must be {}-{} characters",
            field, min, max
        )));
    }
    Ok(())
}

/// Merge a partial update over the current profile, validating each field
fn merge_profile(current: &UserRow, update: &ProfileUpdate) -> Result<ProfileFields, WeblogError> {
    let mut fields = ProfileFields::from(current);

    if let Some(name) = &update.name {
        let name = name.trim();
        validate_name(name)?;
        fields.name = name.to_string();
    }
    if let Some(age) = update.age {
        if !(0..=150).contains(&age) {
            return Err(WeblogError::ValidationFailed("age must be 0-150".into()));
        }
        fields.age = Some(age);
    }
    if let Some(gender) = update.gender {
        fields.gender = Some(gender);
    }
    if let Some(phone) = &update.phone_number {
        fields.phone_number = optional_text("phone_number", phone, 6, 16)?;
    }
    if let Some(location) = &update.location {
        fields.location = optional_text("location", location, 2, 16)?;
    }
    if let Some(about) = &update.about_me {
        let about = about.trim();
        fields.about_me = (!about.is_empty()).then(|| about.to_string());
    }

    Ok(fields)
}

fn optional_text(field: &str, value: &str, min: usize, max: usize) -> Result<Option<String>, WeblogError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    length_between(field, value, min, max)?;
    Ok(Some(value.to_string()))
}

// ============================================================================
// Service
// ============================================================================

/// Identity and credential operations
#[derive(Clone)]
pub struct AccountService {
    db: Arc<WeblogDb>,
    signer: TokenSigner,
    mailer: Mailer,
    config: AccountServiceConfig,
}

impl AccountService {
    pub fn new(db: Arc<WeblogDb>, signer: TokenSigner, mailer: Mailer, config: AccountServiceConfig) -> Self {
        Self {
            db,
            signer,
            mailer,
            config,
        }
    }

    // ------------------------------------------------------------------------
    // Bootstrap
    // ------------------------------------------------------------------------

    /// Seed or repair the three fixed roles
    pub fn ensure_roles(&self) -> Result<Vec<RoleRow>, WeblogError> {
        self.db.with_conn_mut(|conn| roles::ensure_roles(conn))
    }

    /// Create a confirmed Administrator unless an account with this email exists
    pub fn ensure_admin(&self, email: &str, name: &str, password: &str) -> Result<UserRow, WeblogError> {
        let email = normalize_email(email)?;
        validate_name(name)?;

        if let Some(existing) = self.db.with_conn(|conn| users::find_by_email(conn, &email))? {
            debug!(user_id = existing.id, "Bootstrap admin already present");
            return Ok(existing);
        }

        let password_hash = hash_password(password)?;
        let hash = avatar_hash(&email);

        let user = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let role = roles::get_role_by_name(&tx, RoleKind::Administrator.name())?
                .ok_or_else(|| WeblogError::Internal("Administrator role not seeded".into()))?;
            let user = users::insert_user(
                &tx,
                &NewUser {
                    email: &email,
                    name,
                    password_hash: &password_hash,
                    role_id: role.id,
                    confirmed: true,
                    avatar_hash: &hash,
                },
                Utc::now(),
            )?;
            tx.commit()?;
            Ok(user)
        })?;

        info!(user_id = user.id, "Bootstrap administrator created");
        Ok(user)
    }

    // ------------------------------------------------------------------------
    // Lookups and permissions
    // ------------------------------------------------------------------------

    pub fn get_user(&self, id: i64) -> Result<UserRow, WeblogError> {
        self.db
            .with_conn(|conn| users::get_user(conn, id))?
            .ok_or_else(|| WeblogError::NotFound(format!("user {}", id)))
    }

    pub fn list_roles(&self) -> Result<Vec<RoleRow>, WeblogError> {
        self.db.with_conn(roles::list_roles)
    }

    /// Permissions of the identity's current role
    pub fn permissions_of(&self, user_id: i64) -> Result<PermissionSet, WeblogError> {
        self.db
            .with_conn(|conn| users::user_role(conn, user_id))
            .map(|role| role.permissions)
    }

    pub fn has_permission(&self, user_id: i64, permission: Permission) -> Result<bool, WeblogError> {
        self.db.with_conn(|conn| has_permission(conn, user_id, permission))
    }

    // ------------------------------------------------------------------------
    // Credentials and tokens
    // ------------------------------------------------------------------------

    /// Register a new identity with the default role and mail a confirmation token
    pub fn register(&self, input: &RegisterInput) -> Result<UserRow, WeblogError> {
        let name = input.name.trim();
        validate_name(name)?;
        let email = normalize_email(&input.email)?;
        validate_password_policy(&input.password)?;

        let password_hash = hash_password(&input.password)?;
        let hash = avatar_hash(&email);

        let user = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if users::find_by_email(&tx, &email)?.is_some() {
                return Err(WeblogError::AlreadyExists("email already registered".into()));
            }
            if users::find_by_name(&tx, name)?.is_some() {
                return Err(WeblogError::AlreadyExists("name already taken".into()));
            }
            let role = roles::default_role(&tx)?;
            let user = users::insert_user(
                &tx,
                &NewUser {
                    email: &email,
                    name,
                    password_hash: &password_hash,
                    role_id: role.id,
                    confirmed: false,
                    avatar_hash: &hash,
                },
                Utc::now(),
            )?;
            tx.commit()?;
            Ok(user)
        })?;

        info!(user_id = user.id, "User registered");

        let token = self.generate_token(&user, TokenPurpose::ConfirmIdentity)?;
        self.mailer
            .send_template(&user, &user.email, Template::ConfirmUser, &token);

        Ok(user)
    }

    /// Check a login (email or name) and password
    pub fn authenticate(&self, login: &str, password: &str) -> Result<UserRow, WeblogError> {
        let login = login.trim();
        let user = self
            .db
            .with_conn(|conn| users::find_by_login(conn, login))?
            .ok_or_else(|| WeblogError::Unauthorized("invalid credentials".into()))?;

        if !Self::verify_user_password(&user, password)? {
            debug!(user_id = user.id, "Password mismatch");
            return Err(WeblogError::Unauthorized("invalid credentials".into()));
        }

        Ok(user)
    }

    /// Compare plaintext against the stored hash
    pub fn verify_user_password(user: &UserRow, plaintext: &str) -> Result<bool, WeblogError> {
        verify_password(plaintext, &user.password_hash)
    }

    /// Hash and store a new password (policy is the caller's concern)
    pub fn set_password(&self, user_id: i64, plaintext: &str) -> Result<(), WeblogError> {
        let password_hash = hash_password(plaintext)?;
        self.db
            .with_conn(|conn| users::set_password_hash(conn, user_id, &password_hash))
    }

    /// Signed token binding `user` to `purpose`
    pub fn generate_token(&self, user: &UserRow, purpose: TokenPurpose) -> Result<String, WeblogError> {
        let ttl = match purpose {
            TokenPurpose::ApiAccess => self.config.session_ttl,
            TokenPurpose::ConfirmIdentity | TokenPurpose::ResetPassword => self.config.token_ttl,
        };
        self.signer.generate_token(user.id, purpose, ttl)
    }

    /// Verify signature and expiry, returning the embedded identity id
    pub fn verify_token(&self, token: &str, purpose: TokenPurpose) -> Result<i64, WeblogError> {
        self.signer.verify_purpose(token, purpose)
    }

    pub fn issue_api_token(&self, user: &UserRow) -> Result<String, WeblogError> {
        self.generate_token(user, TokenPurpose::ApiAccess)
    }

    /// Resolve an API token to its identity
    pub fn identify_api_token(&self, token: &str) -> Result<UserRow, WeblogError> {
        let user_id = self.verify_token(token, TokenPurpose::ApiAccess)?;
        self.db
            .with_conn(|conn| users::get_user(conn, user_id))?
            .ok_or_else(|| WeblogError::Unauthorized("token refers to a deleted account".into()))
    }

    /// Record activity
    pub fn ping(&self, user_id: i64) -> Result<(), WeblogError> {
        self.db
            .with_conn(|conn| users::touch_last_seen(conn, user_id, Utc::now()))
    }

    // ------------------------------------------------------------------------
    // Confirmation
    // ------------------------------------------------------------------------

    /// Confirm `user` with a `confirm-identity` token issued for them
    pub fn confirm(&self, user: &UserRow, token: &str) -> Result<ConfirmOutcome, WeblogError> {
        if user.confirmed {
            return Ok(ConfirmOutcome::AlreadyConfirmed);
        }

        let user_id = self.verify_token(token, TokenPurpose::ConfirmIdentity)?;
        if user_id != user.id {
            warn!(user_id = user.id, token_user = user_id, "Confirmation token for another account");
            return Err(WeblogError::TokenInvalid("token was issued for another account".into()));
        }

        let changed = self
            .db
            .with_conn(|conn| users::set_confirmed(conn, user.id, true))?;

        if changed {
            info!(user_id = user.id, "Account confirmed");
            Ok(ConfirmOutcome::Confirmed)
        } else {
            Ok(ConfirmOutcome::AlreadyConfirmed)
        }
    }

    pub fn resend_confirmation(&self, user: &UserRow) -> Result<ResendOutcome, WeblogError> {
        if user.confirmed {
            return Ok(ResendOutcome::AlreadyConfirmed);
        }
        let token = self.generate_token(user, TokenPurpose::ConfirmIdentity)?;
        self.mailer
            .send_template(user, &user.email, Template::ConfirmUser, &token);
        Ok(ResendOutcome::Sent)
    }

    // ------------------------------------------------------------------------
    // Password and email changes
    // ------------------------------------------------------------------------

    pub fn change_password(&self, user: &UserRow, old_password: &str, new_password: &str) -> Result<(), WeblogError> {
        if !Self::verify_user_password(user, old_password)? {
            return Err(WeblogError::Unauthorized("old password is incorrect".into()));
        }
        validate_password_policy(new_password)?;
        self.set_password(user.id, new_password)?;
        info!(user_id = user.id, "Password changed");
        Ok(())
    }

    /// Mail a `reset-password` token to the account registered under `email`
    pub fn request_password_reset(&self, email: &str) -> Result<(), WeblogError> {
        let email = normalize_email(email)?;
        let user = self
            .db
            .with_conn(|conn| users::find_by_email(conn, &email))?
            .ok_or_else(|| WeblogError::NotFound("no account with that email".into()))?;

        let token = self.generate_token(&user, TokenPurpose::ResetPassword)?;
        self.mailer
            .send_template(&user, &user.email, Template::ResetPassword, &token);
        info!(user_id = user.id, "Password reset requested");
        Ok(())
    }

    /// Set a new password using a `reset-password` token issued for `name`
    pub fn reset_password(&self, name: &str, token: &str, new_password: &str) -> Result<(), WeblogError> {
        let user = self
            .db
            .with_conn(|conn| users::find_by_name(conn, name.trim()))?
            .ok_or_else(|| WeblogError::NotFound(format!("user {}", name)))?;

        let user_id = self.verify_token(token, TokenPurpose::ResetPassword)?;
        if user_id != user.id {
            return Err(WeblogError::TokenInvalid("token was issued for another account".into()));
        }

        validate_password_policy(new_password)?;
        self.set_password(user.id, new_password)?;
        info!(user_id = user.id, "Password reset");
        Ok(())
    }

    /// Move the account to a new email; it must be confirmed again
    pub fn change_email(&self, user: &UserRow, new_email: &str, password: &str) -> Result<UserRow, WeblogError> {
        if !Self::verify_user_password(user, password)? {
            return Err(WeblogError::Unauthorized("password is incorrect".into()));
        }
        let email = normalize_email(new_email)?;
        let hash = avatar_hash(&email);

        let updated = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if users::find_by_email(&tx, &email)?.is_some() {
                return Err(WeblogError::AlreadyExists("email already registered".into()));
            }
            users::set_email(&tx, user.id, &email, &hash)?;
            let updated = users::get_user(&tx, user.id)?
                .ok_or_else(|| WeblogError::NotFound(format!("user {}", user.id)))?;
            tx.commit()?;
            Ok(updated)
        })?;

        let token = self.generate_token(&updated, TokenPurpose::ConfirmIdentity)?;
        self.mailer
            .send_template(&updated, &updated.email, Template::ChangeEmail, &token);
        info!(user_id = user.id, "Email changed; confirmation required");
        Ok(updated)
    }

    // ------------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------------

    pub fn update_profile(&self, user: &UserRow, update: &ProfileUpdate) -> Result<UserRow, WeblogError> {
        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let current = users::get_user(&tx, user.id)?
                .ok_or_else(|| WeblogError::NotFound(format!("user {}", user.id)))?;
            let fields = merge_profile(&current, update)?;
            write_profile(&tx, &current, &fields)?;
            let updated = users::get_user(&tx, user.id)?
                .ok_or_else(|| WeblogError::NotFound(format!("user {}", user.id)))?;
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Edit any profile, including role and confirmation. Requires ADMINISTER.
    pub fn admin_update_profile(
        &self,
        admin: &UserRow,
        target_id: i64,
        update: &AdminProfileUpdate,
    ) -> Result<UserRow, WeblogError> {
        let updated = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            require_permission(&tx, admin.id, Permission::Administer)?;

            let current = users::get_user(&tx, target_id)?
                .ok_or_else(|| WeblogError::NotFound(format!("user {}", target_id)))?;
            let fields = merge_profile(&current, &update.profile)?;
            write_profile(&tx, &current, &fields)?;

            if let Some(role_id) = update.role_id {
                roles::get_role(&tx, role_id)?
                    .ok_or_else(|| WeblogError::NotFound(format!("role {}", role_id)))?;
                users::set_role(&tx, target_id, role_id)?;
            }
            if let Some(confirmed) = update.confirmed {
                users::set_confirmed(&tx, target_id, confirmed)?;
            }

            let updated = users::get_user(&tx, target_id)?
                .ok_or_else(|| WeblogError::NotFound(format!("user {}", target_id)))?;
            tx.commit()?;
            Ok(updated)
        })?;

        info!(admin_id = admin.id, user_id = target_id, "Profile updated by administrator");
        Ok(updated)
    }

    /// Replace a user's role. Requires ADMINISTER; effective on the next check.
    pub fn assign_role(&self, admin: &UserRow, target_id: i64, role_id: i64) -> Result<UserRow, WeblogError> {
        self.admin_update_profile(
            admin,
            target_id,
            &AdminProfileUpdate {
                role_id: Some(role_id),
                ..Default::default()
            },
        )
    }

    /// Delete an identity and everything it owns. Requires ADMINISTER.
    pub fn delete_user(&self, admin: &UserRow, target_id: i64) -> Result<(), WeblogError> {
        let deleted = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            require_permission(&tx, admin.id, Permission::Administer)?;
            let deleted = users::delete_user(&tx, target_id)?;
            tx.commit()?;
            Ok(deleted)
        })?;

        if !deleted {
            return Err(WeblogError::NotFound(format!("user {}", target_id)));
        }
        info!(admin_id = admin.id, user_id = target_id, "User deleted");
        Ok(())
    }
}

/// Write merged profile fields, reporting a taken name before hitting the constraint
fn write_profile(conn: &rusqlite::Connection, current: &UserRow, fields: &ProfileFields) -> Result<(), WeblogError> {
    if users::fold_key(&fields.name) != users::fold_key(&current.name) {
        if let Some(other) = users::find_by_name(conn, &fields.name)? {
            if other.id != current.id {
                return Err(WeblogError::AlreadyExists("name already taken".into()));
            }
        }
    }
    users::update_profile(conn, current.id, fields)
}
