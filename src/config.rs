use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub coverage: CoverageConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the dashboard server binds to.
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8765".to_string()
}

/// Overrides the test-runner executable resolved from composer metadata.
#[derive(Debug, Default, Deserialize)]
pub struct RunnerConfig {
    /// Binary path relative to the project root.
    /// Example: "tools/phpunit"
    pub binary: Option<String>,
}

/// Source directories cross-referenced against coverage reports.
#[derive(Debug, Deserialize)]
pub struct CoverageConfig {
    /// Where the runner writes its Clover report, relative to the root.
    #[serde(default = "default_coverage_report")]
    pub report: String,
    /// Example: ["src", "lib"]
    #[serde(default)]
    pub include: Vec<String>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            report: default_coverage_report(),
            include: Vec::new(),
        }
    }
}

fn default_coverage_report() -> String {
    "coverage.xml".to_string()
}

impl Config {
    /// Load `beacon.toml` from the project root, falling back to defaults if absent or invalid.
    pub fn load(root: &Path) -> Self {
        let path = root.join("beacon.toml");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        toml::from_str(&content).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_apply_when_config_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path());
        assert_eq!(config.server.listen, "127.0.0.1:8765");
        assert_eq!(config.runner.binary, None);
    }

    #[test]
    fn partial_config_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("beacon.toml"),
            "[runner]\nbinary = \"tools/phpunit\"\n",
        )
        .unwrap();

        let config = Config::load(dir.path());
        assert_eq!(config.runner.binary.as_deref(), Some("tools/phpunit"));
        assert_eq!(config.server.listen, "127.0.0.1:8765");
    }
}
