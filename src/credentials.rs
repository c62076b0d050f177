//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::{ia_err, ia_error, BigtableError};
use ini::Ini;
use std::fmt::Debug;
use std::path::PathBuf;

const ACCESS_TOKEN: &str = "access_token";
const PROJECT_ID: &str = "project_id";

/// Trait defining the credentials used to authorize requests.
///
/// Token acquisition and refresh are left to implementations; this crate only
/// asks for the value of the `Authorization` header before each request.
pub trait Credentials: Send + Sync + Debug {
    /// Returns the value for the `Authorization` header, or `None` to send
    /// the request without one.
    fn authorization_header(&self) -> Result<Option<String>, BigtableError>;
}

/// Credentials that add no `Authorization` header. Used with emulators.
#[derive(Debug, Clone, Default)]
pub struct AnonymousCredentials;

impl Credentials for AnonymousCredentials {
    fn authorization_header(&self) -> Result<Option<String>, BigtableError> {
        Ok(None)
    }
}

/// Credentials using a fixed OAuth2 access token.
#[derive(Clone)]
pub struct AccessTokenCredentials {
    token: String,
}

impl AccessTokenCredentials {
    pub fn new(token: &str) -> Result<Self, BigtableError> {
        let token = token.trim();
        if token.is_empty() {
            return ia_err!("access token must be non-empty");
        }
        Ok(AccessTokenCredentials {
            token: token.to_string(),
        })
    }
}

// never print the token itself
impl Debug for AccessTokenCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenCredentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Credentials for AccessTokenCredentials {
    fn authorization_header(&self) -> Result<Option<String>, BigtableError> {
        Ok(Some(format!("Bearer {}", self.token)))
    }
}

/// Credentials read from a profile in an INI-style file:
///
/// ```ini
/// [DEFAULT]
/// access_token=<token>
/// project_id=<optional-project>
/// ```
#[derive(Debug, Clone)]
pub struct ConfigFileCredentials {
    token: AccessTokenCredentials,
    project_id: Option<String>,
}

impl ConfigFileCredentials {
    /// Read `profile_name` from `config_file_path`. A leading `~/` is expanded
    /// to the user's home directory.
    pub fn new_from_file(config_file_path: &str, profile_name: &str) -> Result<Self, BigtableError> {
        tracing::debug!(
            "Reading credentials from file {} and profile {}",
            config_file_path,
            profile_name
        );
        let file_path = expand_user_home(config_file_path);
        let config = Ini::load_from_file(&file_path).map_err(|e| {
            ia_error!("error reading credentials file '{}': {}", file_path, e)
        })?;
        let props = match config.section(Some(profile_name)) {
            Some(p) => p,
            None => {
                return ia_err!(
                    "error reading credentials file '{}': missing profile '{}'",
                    file_path,
                    profile_name
                )
            }
        };
        let token = match props.get(ACCESS_TOKEN) {
            Some(t) => AccessTokenCredentials::new(t)?,
            None => {
                return ia_err!(
                    "error reading credentials file '{}': missing field '{}'",
                    file_path,
                    ACCESS_TOKEN
                )
            }
        };
        Ok(ConfigFileCredentials {
            token,
            project_id: props.get(PROJECT_ID).map(|s| s.to_string()),
        })
    }

    /// The `project_id` given in the profile, if any.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }
}

impl Credentials for ConfigFileCredentials {
    fn authorization_header(&self) -> Result<Option<String>, BigtableError> {
        self.token.authorization_header()
    }
}

pub(crate) fn expand_user_home(file_path: &str) -> String {
    if let Some(rest) = file_path
        .strip_prefix("~/")
        .or_else(|| file_path.strip_prefix("~\\"))
    {
        if let Some(home_dir) = dirs::home_dir() {
            let full_path = home_dir.join(PathBuf::from(correct_path(rest)));
            return full_path.display().to_string();
        }
    }
    file_path.to_string()
}

fn correct_path(file_path: &str) -> String {
    if cfg!(target_os = "windows") {
        file_path.replace('/', "\\")
    } else {
        file_path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BigtableErrorCode;
    use std::io::Write;

    #[test]
    fn token_header() {
        let c = AccessTokenCredentials::new(" abc ").unwrap();
        assert_eq!(c.authorization_header().unwrap().unwrap(), "Bearer abc");
        assert!(!format!("{:?}", c).contains("abc"));
        assert!(AccessTokenCredentials::new("  ").is_err());
        assert!(AnonymousCredentials.authorization_header().unwrap().is_none());
    }

    #[test]
    fn reads_profile_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[DEFAULT]\naccess_token=tok1\n\n[other]\naccess_token=tok2\nproject_id=p2").unwrap();
        let path = f.path().to_str().unwrap();

        let c = ConfigFileCredentials::new_from_file(path, "DEFAULT").unwrap();
        assert_eq!(c.authorization_header().unwrap().unwrap(), "Bearer tok1");
        assert_eq!(c.project_id(), None);

        let c = ConfigFileCredentials::new_from_file(path, "other").unwrap();
        assert_eq!(c.authorization_header().unwrap().unwrap(), "Bearer tok2");
        assert_eq!(c.project_id(), Some("p2"));

        let e = ConfigFileCredentials::new_from_file(path, "missing").unwrap_err();
        assert_eq!(e.code, BigtableErrorCode::InvalidArgument);
    }

    #[test]
    fn missing_file_is_an_error() {
        let e = ConfigFileCredentials::new_from_file("/nonexistent/creds", "DEFAULT").unwrap_err();
        assert!(e.message.contains("/nonexistent/creds"));
    }

    #[test]
    fn home_expansion() {
        assert_eq!(expand_user_home("/abs/path"), "/abs/path");
        if let Some(home) = dirs::home_dir() {
            let expanded = expand_user_home("~/x/y");
            assert!(expanded.starts_with(&home.display().to_string()));
        }
    }
}
