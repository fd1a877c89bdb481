//! Configuration loader with multi-source merging.

use std::env;
use std::path::{Path, PathBuf};

use crate::{ConfigError, OraguardConfig};

/// Project config file, git-tracked.
const PROJECT_CONFIG_FILE: &str = "oraguard.toml";

/// Local overrides, gitignored.
const LOCAL_CONFIG_FILE: &str = "oraguard.local.toml";

/// Configuration loader with builder pattern.
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// Creates a loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "ORAGUARD".to_string(),
        }
    }

    /// Sets the directory searched for config files.
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Sets the environment variable prefix (default: `ORAGUARD`).
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Loads configuration from all sources with proper precedence,
    /// then applies the `ORACLE_*` connection contract variables.
    pub fn load(self) -> Result<OraguardConfig, ConfigError> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults.
        let defaults = OraguardConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. Project config (oraguard.toml).
        let project_file = self.project_dir.join(PROJECT_CONFIG_FILE);
        if project_file.exists() {
            builder = builder.add_source(
                config::File::from(project_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 3. Local config (oraguard.local.toml, gitignored).
        let local_file = self.project_dir.join(LOCAL_CONFIG_FILE);
        if local_file.exists() {
            builder = builder.add_source(
                config::File::from(local_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Environment variables (ORAGUARD_*).
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("_")
                .try_parsing(true),
        );

        let merged = builder.build()?;
        let mut loaded: OraguardConfig = merged.try_deserialize()?;

        // 5. ORACLE_* contract variables win over everything.
        apply_oracle_environment(&mut loaded, |name| env::var(name).ok())?;

        Ok(loaded)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the `ORACLE_*` connection variables. `lookup` is injected so
/// tests don't have to mutate the process environment.
fn apply_oracle_environment<F>(
    config: &mut OraguardConfig,
    lookup: F,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("ORACLE_HOST") {
        config.database.host = host;
    }
    if let Some(port) = lookup("ORACLE_PORT") {
        config.database.port =
            port.parse()
                .map_err(|_| ConfigError::InvalidEnvironment {
                    variable: "ORACLE_PORT",
                    reason: format!("not a port number: {port}"),
                })?;
    }
    if let Some(service_name) = lookup("ORACLE_SERVICE_NAME") {
        config.database.service_name = service_name;
    }
    if let Some(user) = lookup("ORACLE_USER") {
        config.database.user = user;
    }
    if let Some(password) = lookup("ORACLE_PASSWORD") {
        config.database.password = password;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_defaults() {
        let temp = tempdir().expect("temp dir");
        let config = ConfigLoader::new()
            .with_project_dir(temp.path())
            .load()
            .expect("load config");

        assert_eq!(config.database.host, "127.0.0.1");
        assert_eq!(config.database.port, 10006);
        assert_eq!(config.validator.max_complexity, 50);
        assert_eq!(config.validator.max_rows, 10_000);
        assert_eq!(config.pool.size, 2);
        assert_eq!(config.approval.token_expiry_secs, 300);
    }

    #[test]
    fn load_project_config() {
        let temp = tempdir().expect("temp dir");
        fs::write(
            temp.path().join("oraguard.toml"),
            r#"
[database]
host = "10.0.0.5"
port = 1521
service_name = "orclpdb"

[validator]
max_rows = 500

[pool]
size = 1
"#,
        )
        .expect("write config");

        let config = ConfigLoader::new()
            .with_project_dir(temp.path())
            .load()
            .expect("load config");

        assert_eq!(config.database.host, "10.0.0.5");
        assert_eq!(config.database.port, 1521);
        assert_eq!(config.validator.max_rows, 500);
        assert_eq!(config.pool.size, 1);
        // Untouched sections keep their defaults.
        assert_eq!(config.breaker.failure_threshold, 5);
    }

    #[test]
    fn local_config_overrides_project_config() {
        let temp = tempdir().expect("temp dir");
        fs::write(temp.path().join("oraguard.toml"), "[database]\nhost = \"a\"\n")
            .expect("write project config");
        fs::write(temp.path().join("oraguard.local.toml"), "[database]\nhost = \"b\"\n")
            .expect("write local config");

        let config = ConfigLoader::new()
            .with_project_dir(temp.path())
            .load()
            .expect("load config");
        assert_eq!(config.database.host, "b");
    }

    // Environment-variable precedence is covered through the injected
    // lookup below; mutating the real process environment makes tests
    // order-dependent.

    #[test]
    fn oracle_environment_wins() {
        let mut config = OraguardConfig::default();
        let vars: HashMap<&str, &str> = [
            ("ORACLE_HOST", "db.internal"),
            ("ORACLE_PORT", "1521"),
            ("ORACLE_SERVICE_NAME", "prod"),
            ("ORACLE_USER", "scott"),
            ("ORACLE_PASSWORD", "tiger"),
        ]
        .into_iter()
        .collect();

        apply_oracle_environment(&mut config, |name| {
            vars.get(name).map(ToString::to_string)
        })
        .expect("apply env");

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 1521);
        assert_eq!(config.database.service_name, "prod");
        assert_eq!(config.database.user, "scott");
        assert_eq!(config.database.password, "tiger");
        assert!(config.validate().is_ok());
        assert_eq!(
            config.database.connect_url(),
            "jdbc:oracle:thin:@db.internal:1521/prod"
        );
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut config = OraguardConfig::default();
        let result = apply_oracle_environment(&mut config, |name| {
            (name == "ORACLE_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnvironment { variable: "ORACLE_PORT", .. })
        ));
    }

    #[test]
    fn validate_requires_credentials() {
        let config = OraguardConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSetting("database.service_name"))
        ));
    }
}
