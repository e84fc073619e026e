//! Repository configuration stored as TOML in `.git/knot.toml`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::DateTime;
use knot_types::{Author, Lockfile};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RepoError, RepoResult};

pub const CONFIG_FILE: &str = "knot.toml";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub user: UserConfig,
    pub core: CoreConfig,
    pub merge: MergeConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Branch HEAD points at in a fresh repository.
    pub default_branch: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_branch: "master".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Label conflict markers with the names of the merged sides.
    pub conflict_style_names: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            conflict_style_names: true,
        }
    }
}

impl RepoConfig {
    /// Read the config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> RepoResult<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&text).map_err(|e| RepoError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> RepoResult<()> {
        let text = toml::to_string_pretty(self).map_err(|e| RepoError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut lock = Lockfile::new(path);
        lock.hold_for_update()?;
        lock.write(text.as_bytes())?;
        lock.commit()?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    /// The identity to record on new commits, read from the process
    /// environment first and the `[user]` table second.
    pub fn current_author(&self) -> RepoResult<Author> {
        self.author_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn author_from(&self, env: impl Fn(&str) -> Option<String>) -> RepoResult<Author> {
        let name = env("GIT_AUTHOR_NAME").or_else(|| self.user.name.clone());
        let email = env("GIT_AUTHOR_EMAIL").or_else(|| self.user.email.clone());
        let (Some(name), Some(email)) = (name, email) else {
            return Err(RepoError::InvalidOperation(
                "Author identity unknown: set user.name and user.email in .git/knot.toml".into(),
            ));
        };

        match env("GIT_AUTHOR_DATE") {
            Some(date) => {
                let time = DateTime::parse_from_rfc2822(&date).map_err(|e| {
                    RepoError::InvalidOperation(format!("invalid GIT_AUTHOR_DATE '{date}': {e}"))
                })?;
                Ok(Author::new(name, email, time))
            }
            None => Ok(Author::now(name, email)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let c = RepoConfig::default();
        assert_eq!(c.core.default_branch, "master");
        assert!(c.merge.conflict_style_names);
        assert!(c.user.name.is_none());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let c = RepoConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(c, RepoConfig::default());
    }

    #[test]
    fn save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut c = RepoConfig::default();
        c.user.name = Some("A. U. Thor".into());
        c.user.email = Some("author@example.com".into());
        c.core.default_branch = "main".into();
        c.save(&path).unwrap();

        assert_eq!(RepoConfig::load(&path).unwrap(), c);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[user]\nname = \"Ada\"\n").unwrap();

        let c = RepoConfig::load(&path).unwrap();
        assert_eq!(c.user.name.as_deref(), Some("Ada"));
        assert_eq!(c.core.default_branch, "master");
    }

    #[test]
    fn malformed_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[user\nname = ").unwrap();
        assert!(matches!(RepoConfig::load(&path), Err(RepoError::Config { .. })));
    }

    // -----------------------------------------------------------------
    // Author identity
    // -----------------------------------------------------------------

    #[test]
    fn environment_overrides_config() {
        let mut c = RepoConfig::default();
        c.user.name = Some("Config Name".into());
        c.user.email = Some("config@example.com".into());

        let env: HashMap<&str, &str> = [
            ("GIT_AUTHOR_NAME", "Env Name"),
            ("GIT_AUTHOR_DATE", "Wed, 25 Dec 2019 17:54:00 -0300"),
        ]
        .into_iter()
        .collect();
        let author = c.author_from(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(author.name, "Env Name");
        assert_eq!(author.email, "config@example.com");
        assert_eq!(author.timestamp(), 1577307240);
        assert_eq!(author.readable_time(), "Wed Dec 25 17:54:00 2019 -0300");
    }

    #[test]
    fn missing_identity_is_an_error() {
        let c = RepoConfig::default();
        assert!(c.author_from(|_| None).is_err());
    }
}
