//! Local user profile and roles.
//!
//! The profile is loaded once at startup and handed to whoever needs it. It is
//! only written by [`login`] and [`logout`]. Role checks here are placeholder
//! gating for the local tool, not an authentication scheme.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::app_dirs::AppDirs;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Questioner,
    Admin,
}

impl Role {
    /// May add and remove questions.
    pub fn can_author(&self) -> bool {
        matches!(self, Role::Questioner | Role::Admin)
    }

    /// May import and delete whole exams.
    pub fn can_manage_catalog(&self) -> bool {
        matches!(self, Role::Admin)
    }

    fn is_privileged(&self) -> bool {
        *self != Role::Student
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub logged_in_at: DateTime<Local>,
}

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("access code rejected for role '{0}'")]
    AccessDenied(Role),
    #[error("not logged in (run `tryout login --email <EMAIL>` first)")]
    NotLoggedIn,
    #[error("role '{role}' cannot {action}")]
    Forbidden { role: Role, action: &'static str },
    #[error("malformed profile file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub access_code: Option<String>,
}

pub trait ProfileStore {
    fn load(&self) -> Result<Option<Profile>, ProfileError>;
    fn save(&self, profile: &Profile) -> Result<(), ProfileError>;
    fn clear(&self) -> Result<(), ProfileError>;
}

#[derive(Debug, Clone)]
pub struct FileProfileStore {
    path: PathBuf,
}

impl FileProfileStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            path: AppDirs::profile_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileStore for FileProfileStore {
    fn load(&self) -> Result<Option<Profile>, ProfileError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, profile: &Profile) -> Result<(), ProfileError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(profile)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), ProfileError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !email.contains(' '),
        None => false,
    }
}

/// Builds a profile for the request and persists it.
///
/// Privileged roles need `access_code` to match the configured staff code; with
/// no staff code configured only students can log in.
pub fn login<S: ProfileStore>(
    store: &S,
    request: LoginRequest,
    staff_access_code: Option<&str>,
) -> Result<Profile, ProfileError> {
    let email = request.email.trim().to_string();
    if !is_plausible_email(&email) {
        return Err(ProfileError::InvalidEmail(email));
    }

    if request.role.is_privileged() {
        let granted = matches!(
            (staff_access_code, request.access_code.as_deref()),
            (Some(expected), Some(given)) if expected == given
        );
        if !granted {
            tracing::warn!(role = %request.role, "privileged login refused");
            return Err(ProfileError::AccessDenied(request.role));
        }
    }

    let name = request
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
    let now = Local::now();
    let profile = Profile {
        id: format!("{}-{}", request.role, now.timestamp_millis()),
        name,
        email,
        role: request.role,
        logged_in_at: now,
    };

    store.save(&profile)?;
    tracing::info!(email = %profile.email, role = %profile.role, "logged in");
    Ok(profile)
}

pub fn logout<S: ProfileStore>(store: &S) -> Result<Option<Profile>, ProfileError> {
    let previous = store.load().ok().flatten();
    store.clear()?;
    if let Some(ref p) = previous {
        tracing::info!(email = %p.email, "logged out");
    }
    Ok(previous)
}

/// Resolves the acting profile for a gated action.
pub fn require<'a>(
    profile: Option<&'a Profile>,
    allowed: fn(&Role) -> bool,
    action: &'static str,
) -> Result<&'a Profile, ProfileError> {
    let profile = profile.ok_or(ProfileError::NotLoggedIn)?;
    if allowed(&profile.role) {
        Ok(profile)
    } else {
        Err(ProfileError::Forbidden {
            role: profile.role,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, FileProfileStore) {
        let dir = tempdir().unwrap();
        let store = FileProfileStore::with_path(dir.path().join("profile.json"));
        (dir, store)
    }

    fn request(email: &str, role: Role, code: Option<&str>) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            name: None,
            role,
            access_code: code.map(str::to_string),
        }
    }

    #[test]
    fn test_student_login_derives_name_and_persists() {
        let (_dir, store) = store();

        let profile = login(&store, request("budi@example.com", Role::Student, None), None).unwrap();

        assert_eq!(profile.name, "budi");
        assert_eq!(profile.role, Role::Student);
        assert_eq!(store.load().unwrap(), Some(profile));
    }

    #[test]
    fn test_explicit_name_is_kept() {
        let (_dir, store) = store();
        let mut req = request("a@b.c", Role::Student, None);
        req.name = Some("  Sari  ".to_string());

        assert_eq!(login(&store, req, None).unwrap().name, "Sari");
    }

    #[test]
    fn test_invalid_email_rejected() {
        let (_dir, store) = store();
        for email in ["", "nobody", "@example.com", "user@", "a b@c.d"] {
            assert_matches!(
                login(&store, request(email, Role::Student, None), None),
                Err(ProfileError::InvalidEmail(_))
            );
        }
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_privileged_login_needs_matching_code() {
        let (_dir, store) = store();

        assert_matches!(
            login(&store, request("q@x.io", Role::Questioner, Some("wrong")), Some("s3cret")),
            Err(ProfileError::AccessDenied(Role::Questioner))
        );
        assert_matches!(
            login(&store, request("a@x.io", Role::Admin, Some("s3cret")), None),
            Err(ProfileError::AccessDenied(Role::Admin))
        );

        let admin = login(&store, request("a@x.io", Role::Admin, Some("s3cret")), Some("s3cret")).unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[test]
    fn test_logout_clears_store() {
        let (_dir, store) = store();
        login(&store, request("s@x.io", Role::Student, None), None).unwrap();

        let previous = logout(&store).unwrap();

        assert_eq!(previous.map(|p| p.email), Some("s@x.io".to_string()));
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(logout(&store).unwrap(), None);
    }

    #[test]
    fn test_role_permissions() {
        assert!(!Role::Student.can_author());
        assert!(Role::Questioner.can_author());
        assert!(Role::Admin.can_author());
        assert!(!Role::Questioner.can_manage_catalog());
        assert!(Role::Admin.can_manage_catalog());
    }

    #[test]
    fn test_require() {
        let (_dir, store) = store();
        let student = login(&store, request("s@x.io", Role::Student, None), None).unwrap();

        assert_matches!(
            require(None, Role::can_author, "add questions"),
            Err(ProfileError::NotLoggedIn)
        );
        assert_matches!(
            require(Some(&student), Role::can_author, "add questions"),
            Err(ProfileError::Forbidden { role: Role::Student, .. })
        );
    }

    #[test]
    fn test_corrupt_profile_file_is_an_error() {
        let (_dir, store) = store();
        fs::write(&store.path, "not json").unwrap();
        assert_matches!(store.load(), Err(ProfileError::Json(_)));
    }
}
