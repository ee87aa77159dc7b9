//! Desired-state configuration
//!
//! A single TOML document declares the queries and materialized views to
//! keep in sync, plus pass-wide settings:
//!
//! ```toml
//! [settings]
//! namespace = "dune"
//! team = "analytics"
//!
//! [queries.daily_count]
//! name = "Daily Count"
//! file = "queries/daily_count.sql"
//!
//! [materialized_views.daily_count_mv]
//! query = "daily_count"
//! schedule = "0 */1 * * *"
//! ```

use anyhow::{Context, Result, bail};
use reconcile::{
    DeclarationSet, Namespace, PerformanceTier, QueryDeclaration, ViewDeclaration, Visibility,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "dune";
pub const DEFAULT_STATE_FILE: &str = ".querysync/state.toml";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_JOBS: usize = 4;

// ============================================================================
// File format
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub queries: BTreeMap<String, QueryEntry>,
    #[serde(default)]
    pub materialized_views: BTreeMap<String, ViewEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub team: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub state_file: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            team: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            jobs: DEFAULT_JOBS,
            api_url: None,
            state_file: None,
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_jobs() -> usize {
    DEFAULT_JOBS
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryEntry {
    pub name: String,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    /// Pin the remote id instead of relying on the state file
    #[serde(default)]
    pub id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewEntry {
    pub query: String,
    pub schedule: String,
    #[serde(default)]
    pub tier: PerformanceTier,
}

// ============================================================================
// Loaded config
// ============================================================================

/// A parsed config file together with the directory it was read from
#[derive(Debug)]
pub struct Config {
    pub path: PathBuf,
    base_dir: PathBuf,
    pub file: ConfigFile,
}

impl Config {
    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        log::debug!(
            "Loaded {} queries and {} materialized views from {}",
            file.queries.len(),
            file.materialized_views.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            base_dir,
            file,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.file.settings
    }

    /// Naming scope for materialized views
    pub fn namespace(&self) -> Result<Namespace> {
        let settings = self.settings();
        if settings.namespace.trim().is_empty() {
            bail!("settings.namespace must not be empty");
        }
        if settings.team.trim().is_empty() {
            bail!("settings.team is required in {}", self.path.display());
        }
        Ok(Namespace::new(settings.namespace.trim(), settings.team.trim()))
    }

    /// Per-request timeout, with an optional CLI override in seconds
    pub fn timeout(&self, override_secs: Option<u64>) -> Duration {
        Duration::from_secs(override_secs.unwrap_or(self.settings().timeout_secs).max(1))
    }

    /// Worker count, with an optional CLI override
    pub fn jobs(&self, override_jobs: Option<usize>) -> usize {
        override_jobs.unwrap_or(self.settings().jobs).max(1)
    }

    /// Location of the last-applied state file
    pub fn state_path(&self) -> PathBuf {
        let raw = self
            .settings()
            .state_file
            .as_deref()
            .unwrap_or(DEFAULT_STATE_FILE);
        self.resolve(raw)
    }

    /// Expand `~` and resolve relative paths against the config directory
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(raw).as_ref());
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        }
    }

    /// Build the declaration set, reading SQL files as needed
    ///
    /// Only the shape of each entry is checked here; cross-entry rules are
    /// enforced by [`DeclarationSet::validate`].
    pub fn declarations(&self) -> Result<DeclarationSet> {
        let mut set = DeclarationSet::new();

        for (key, entry) in &self.file.queries {
            let content = self.query_content(key, entry)?;
            let mut decl = QueryDeclaration::new(key, &entry.name, content)
                .with_visibility(entry.visibility);
            if let Some(id) = entry.id {
                decl = decl.with_remembered_id(id.to_string());
            }
            set.add_query(decl)?;
        }

        for (key, entry) in &self.file.materialized_views {
            set.add_view(
                ViewDeclaration::new(key, &entry.query, &entry.schedule).with_tier(entry.tier),
            )?;
        }

        Ok(set)
    }

    fn query_content(&self, key: &str, entry: &QueryEntry) -> Result<String> {
        match (&entry.sql, &entry.file) {
            (Some(sql), None) => Ok(sql.clone()),
            (None, Some(file)) => {
                let path = self.resolve(file);
                fs::read_to_string(&path).with_context(|| {
                    format!("Could not read SQL for query '{key}': {}", path.display())
                })
            }
            (Some(_), Some(_)) => bail!("query '{key}' sets both `sql` and `file`"),
            (None, None) => bail!("query '{key}' needs one of `sql` or `file`"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::ConfigError;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("querysync.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_full_config() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("queries")).unwrap();
        fs::write(
            dir.path().join("queries/daily.sql"),
            "-- @name: Daily\nSELECT count(*) FROM t\n",
        )
        .unwrap();

        let path = write_config(
            &dir,
            r#"
[settings]
team = "analytics"
timeout_secs = 10
jobs = 2

[queries.daily_count]
name = "Daily Count"
file = "queries/daily.sql"
visibility = "public"

[queries.inline]
name = "Inline"
sql = "SELECT 1"
id = 4242

[materialized_views.daily_count_mv]
query = "daily_count"
schedule = "0 */1 * * *"
tier = "large"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.timeout(None), Duration::from_secs(10));
        assert_eq!(config.jobs(None), 2);
        assert_eq!(config.jobs(Some(8)), 8);

        let ns = config.namespace().unwrap();
        assert_eq!(ns.full_name("daily_count_mv"), "dune.analytics.daily_count_mv");

        let set = config.declarations().unwrap();
        assert!(set.validate().is_ok());

        let daily = set.query("daily_count").unwrap();
        assert!(daily.content.contains("SELECT count(*)"));
        assert_eq!(daily.visibility, Visibility::Public);
        assert_eq!(daily.remembered_id(), None);

        let inline = set.query("inline").unwrap();
        assert_eq!(inline.visibility, Visibility::Private);
        assert_eq!(inline.remembered_id(), Some("4242"));

        let view = set.view("daily_count_mv").unwrap();
        assert_eq!(view.source_query_key, "daily_count");
        assert_eq!(view.performance_tier, PerformanceTier::Large);
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[settings]\nteam = \"t\"\n");
        let config = Config::load(&path).unwrap();

        assert_eq!(config.timeout(None), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.jobs(None), DEFAULT_JOBS);
        assert_eq!(config.state_path(), dir.path().join(DEFAULT_STATE_FILE));
        assert!(config.declarations().unwrap().is_empty());
    }

    #[test]
    fn test_zero_overrides_are_clamped() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[settings]\nteam = \"t\"\njobs = 0\n");
        let config = Config::load(&path).unwrap();

        assert_eq!(config.jobs(None), 1);
        assert_eq!(config.timeout(Some(0)), Duration::from_secs(1));
    }

    #[test]
    fn test_absolute_state_file() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("elsewhere/state.toml");
        let path = write_config(
            &dir,
            &format!("[settings]\nteam = \"t\"\nstate_file = {:?}\n", state.display().to_string()),
        );
        assert_eq!(Config::load(&path).unwrap().state_path(), state);
    }

    #[test]
    fn test_missing_team() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");
        let err = Config::load(&path).unwrap().namespace().unwrap_err();
        assert!(err.to_string().contains("settings.team"));
    }

    #[test]
    fn test_sql_and_file_are_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[queries.q1]\nname = \"Q\"\nsql = \"SELECT 1\"\nfile = \"q.sql\"\n",
        );
        let err = Config::load(&path).unwrap().declarations().unwrap_err();
        assert!(err.to_string().contains("both"));

        let path = write_config(&dir, "[queries.q1]\nname = \"Q\"\n");
        let err = Config::load(&path).unwrap().declarations().unwrap_err();
        assert!(err.to_string().contains("one of"));
    }

    #[test]
    fn test_missing_sql_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[queries.q1]\nname = \"Q\"\nfile = \"nope.sql\"\n");
        let err = Config::load(&path).unwrap().declarations().unwrap_err();
        assert!(err.to_string().contains("q1"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[queries.q1]\nname = \"Q\"\nsql = \"x\"\nowner = \"me\"\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_undeclared_source_is_caught_by_validation() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[materialized_views.mv1]\nquery = \"ghost\"\nschedule = \"0 * * * *\"\n",
        );
        let set = Config::load(&path).unwrap().declarations().unwrap();
        assert!(matches!(
            set.validate(),
            Err(ConfigError::UnknownSourceQuery { .. })
        ));
    }

    #[test]
    fn test_same_key_for_query_and_view_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[queries.dup]
name = "Q"
sql = "SELECT 1"

[materialized_views.dup]
query = "dup"
schedule = "0 * * * *"
"#,
        );
        let err = Config::load(&path).unwrap().declarations().unwrap_err();
        assert!(err.to_string().contains("dup"));
    }
}
