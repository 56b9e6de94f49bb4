use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{DateTime, Utc};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::error::{DomainError, DomainResult};
use crate::ids::UserId;

/// Rounds for the PBKDF2-HMAC-SHA256 password KDF. Spec requires at
/// least 100k; matched to the original system's literal round count.
const PBKDF2_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Derives a PBKDF2-HMAC-SHA256 hash for `password` under a fresh random
/// salt and encodes it as `pbkdf2-sha256$<rounds>$<salt_b64>$<hash_b64>`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let hash = derive(password, &salt);
    format!("pbkdf2-sha256${PBKDF2_ROUNDS}${}${}", B64.encode(salt), B64.encode(hash))
}

/// Verifies `password` against an encoded hash produced by [`hash_password`].
/// Returns `false` (never an error) for any malformed or foreign-format hash.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.splitn(4, '$');
    let (Some(scheme), Some(rounds), Some(salt_b64), Some(hash_b64)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != "pbkdf2-sha256" {
        return false;
    }
    let Ok(rounds) = rounds.parse::<u32>() else { return false };
    let Ok(salt) = B64.decode(salt_b64) else { return false };
    let Ok(expected) = B64.decode(hash_b64) else { return false };

    let mut actual = vec![0u8; expected.len()];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, rounds, &mut actual);
    actual == expected
}

fn derive(password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut out);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Operator,
    Viewer,
    DeviceManager,
    Analyst,
    Guest,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserRole::SuperAdmin => "super_admin",
            UserRole::Admin => "admin",
            UserRole::Operator => "operator",
            UserRole::Viewer => "viewer",
            UserRole::DeviceManager => "device_manager",
            UserRole::Analyst => "analyst",
            UserRole::Guest => "guest",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
    PendingActivation,
    Locked,
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Suspended => "suspended",
            UserStatus::PendingActivation => "pending_activation",
            UserStatus::Locked => "locked",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,

    /// `pbkdf2-sha256$rounds$salt$hash` encoding produced by [`hash_password`],
    /// never the raw password. Verify with [`verify_password`].
    pub password_hash: String,

    pub role: UserRole,
    pub status: UserStatus,

    pub last_login: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,

    pub mfa_secret: Option<String>,
    pub mfa_enabled: bool,

    pub api_key: Option<String>,
    pub api_key_expires_at: Option<DateTime<Utc>>,

    pub preferences: Value,

    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Very small RFC-5321-ish check: one `@`, a dot in the domain part,
    /// no surrounding whitespace. Not a full grammar implementation —
    /// deliberately permissive per spec.md's "RFC-5321-ish valid".
    pub fn validate_email(email: &str) -> DomainResult<()> {
        let Some((local, domain)) = email.split_once('@') else {
            return Err(DomainError::Invalid { field: "email", message: "missing '@'".into() });
        };
        if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.contains(char::is_whitespace) {
            return Err(DomainError::Invalid { field: "email", message: format!("'{email}' is not a valid address") });
        }
        Ok(())
    }

    /// §8.5: once `failed_login_attempts` crosses `max_attempts`, the caller
    /// must set `status = locked` and a future `locked_until`. This helper
    /// performs that transition.
    pub fn lock(&mut self, until: DateTime<Utc>) {
        self.status = UserStatus::Locked;
        self.locked_until = Some(until);
    }

    pub fn unlock(&mut self) {
        self.status = UserStatus::Active;
        self.locked_until = None;
        self.failed_login_attempts = 0;
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.status == UserStatus::Locked && self.locked_until.map_or(true, |u| u > now)
    }

    pub fn set_password(&mut self, password: &str) {
        self.password_hash = hash_password(password);
    }

    pub fn check_password(&self, password: &str) -> bool {
        verify_password(password, &self.password_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(User::validate_email("a@b.com").is_ok());
        assert!(User::validate_email("no-at-sign").is_err());
        assert!(User::validate_email("a@b").is_err());
    }

    #[test]
    fn password_round_trips_through_hash_and_verify() {
        let encoded = hash_password("correct horse battery staple");
        assert!(verify_password("correct horse battery staple", &encoded));
        assert!(!verify_password("wrong password", &encoded));
    }

    #[test]
    fn two_hashes_of_the_same_password_use_different_salts() {
        let a = hash_password("hunter2");
        let b = hash_password("hunter2");
        assert_ne!(a, b);
        assert!(verify_password("hunter2", &a));
        assert!(verify_password("hunter2", &b));
    }

    #[test]
    fn verify_rejects_malformed_or_foreign_encodings() {
        assert!(!verify_password("x", "not-an-encoded-hash"));
        assert!(!verify_password("x", "bcrypt$10$abc$def"));
    }
}
