//! Launcher configuration
//!
//! Three historical file shapes are accepted and normalized here, once, into
//! [`LauncherConfig`]:
//!
//! - multi-environment: `{ global, envs: { <env>: { credentials, pipelines, suites } } }`
//! - suites inside an environment: `suites: { <suite>: { description, pipelines } }`
//! - legacy flat: `{ headless, credentials, pipelines }`, loaded as environment `default`
//!
//! `pipelines` maps a name to an entry URL, or a group name to such a map.
//! JSON files are parsed through the YAML parser.

use crate::core::target::PipelineTarget;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Name of the environment used when none is given
pub const DEFAULT_ENV: &str = "default";

/// Timing and retry policy for launching and monitoring runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Ceiling on confirmation attempts
    #[serde(alias = "maxRetries")]
    pub max_confirm_retries: u32,

    /// Pause after a concurrency-limit rejection
    pub retry_interval_ms: u64,

    /// Wall-clock budget for the confirmation loop
    pub launch_timeout_ms: u64,

    /// Budget for observing a terminal status after launch
    pub monitor_timeout_ms: u64,

    /// Budget for the identity provider to hand back to the console
    pub login_timeout_ms: u64,

    /// Pause for the page to settle before interacting with it
    #[serde(alias = "pageLoadWaitMs")]
    pub page_settle_ms: u64,

    /// Pause after clicking the run control, for a dialog to render
    pub dialog_wait_ms: u64,

    /// Window for one confirmation attempt's launch response
    pub confirm_attempt_timeout_ms: u64,

    /// Budget for the run control to become visible
    pub run_button_timeout_ms: u64,

    /// Grace period after a terminal status for late metadata
    pub terminal_settle_ms: u64,

    /// How often the page URL is checked for a run-detail redirect
    pub url_poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_confirm_retries: 50,
            retry_interval_ms: 10_000,
            launch_timeout_ms: 60_000,
            monitor_timeout_ms: 30 * 60 * 1000,
            login_timeout_ms: 5 * 60 * 1000,
            page_settle_ms: 2_000,
            dialog_wait_ms: 2_000,
            confirm_attempt_timeout_ms: 10_000,
            run_button_timeout_ms: 15_000,
            terminal_settle_ms: 1_000,
            url_poll_interval_ms: 500,
        }
    }
}

impl Settings {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    pub fn monitor_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn dialog_wait(&self) -> Duration {
        Duration::from_millis(self.dialog_wait_ms)
    }

    pub fn confirm_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_attempt_timeout_ms)
    }

    pub fn run_button_timeout(&self) -> Duration {
        Duration::from_millis(self.run_button_timeout_ms)
    }

    pub fn terminal_settle(&self) -> Duration {
        Duration::from_millis(self.terminal_settle_ms)
    }

    pub fn url_poll_interval(&self) -> Duration {
        Duration::from_millis(self.url_poll_interval_ms.max(1))
    }
}

/// Login details for the console's identity provider
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account (tenant) name
    pub tenant: String,

    /// IAM user name
    pub username: String,

    #[serde(skip_serializing)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant", &self.tenant)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// How to start the automation driver subprocess
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriverConfig {
    pub program: String,
    pub args: Vec<String>,
    pub request_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            args: vec!["driver/playwright-driver.js".to_string()],
            request_timeout_ms: 60_000,
        }
    }
}

/// Settings shared by every environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalConfig {
    pub headless: bool,
    pub settings: Settings,
    pub driver: DriverConfig,
}

/// A named group of pipelines, from a `pipelines` group or a suite
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub name: String,
    pub description: String,
}

/// One deployment environment of the console
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub name: String,
    pub label: String,
    pub credentials: Option<Credentials>,
    pub groups: Vec<GroupInfo>,
    /// Every configured pipeline, in file order
    pub targets: Vec<PipelineTarget>,
}

/// Normalized launcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LauncherConfig {
    pub global: GlobalConfig,
    pub envs: Vec<Environment>,
}

impl LauncherConfig {
    /// Load configuration from a YAML or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration text in any supported shape
    pub fn parse(content: &str) -> Result<Self> {
        let raw: Value = serde_yaml::from_str(content).context("Config is not valid YAML/JSON")?;
        let config = normalize(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the normalized configuration
    pub fn validate(&self) -> Result<()> {
        if self.global.settings.max_confirm_retries == 0 {
            anyhow::bail!("settings.maxConfirmRetries must be at least 1");
        }

        for env in &self.envs {
            let mut seen = HashSet::new();
            for target in &env.targets {
                let qualified = target.qualified_name();
                if !seen.insert(qualified.clone()) {
                    anyhow::bail!(
                        "Environment '{}' declares pipeline '{}' more than once",
                        env.name,
                        qualified
                    );
                }
                if !target.entry_url.starts_with("http://")
                    && !target.entry_url.starts_with("https://")
                {
                    anyhow::bail!(
                        "Pipeline '{}' in environment '{}' has a non-http URL: {}",
                        qualified,
                        env.name,
                        target.entry_url
                    );
                }
            }
        }

        Ok(())
    }

    /// Look up an environment by name
    pub fn env(&self, name: &str) -> Option<&Environment> {
        self.envs.iter().find(|e| e.name == name)
    }

    pub fn env_names(&self) -> Vec<&str> {
        self.envs.iter().map(|e| e.name.as_str()).collect()
    }

    /// Apply overrides from process environment variables (`HEADLESS=true`)
    pub fn apply_env_overrides(&mut self) {
        if std::env::var("HEADLESS").map(|v| v == "true").unwrap_or(false) {
            self.global.headless = true;
        }
    }
}

/// Default config location, relative to the working directory
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config").join("config.json")
}

fn normalize(raw: Value) -> Result<LauncherConfig> {
    let root = raw
        .as_mapping()
        .context("Config root must be a mapping")?;

    if let Some(envs) = root.get("envs") {
        let global = match root.get("global") {
            Some(value) => serde_yaml::from_value(value.clone()).context("Invalid `global` section")?,
            None => GlobalConfig::default(),
        };

        let envs = envs.as_mapping().context("`envs` must be a mapping")?;
        let mut environments = Vec::new();
        for (key, value) in envs {
            let name = key.as_str().context("Environment names must be strings")?;
            let body = value
                .as_mapping()
                .with_context(|| format!("Environment '{}' must be a mapping", name))?;
            environments.push(parse_environment(name, body)?);
        }

        return Ok(LauncherConfig {
            global,
            envs: environments,
        });
    }

    if root.contains_key("credentials") || root.contains_key("pipelines") {
        warn!("Legacy flat config detected; consider migrating to the `envs` layout");
        let global = GlobalConfig {
            headless: root.get("headless").and_then(Value::as_bool).unwrap_or(false),
            ..GlobalConfig::default()
        };
        let env = parse_environment(DEFAULT_ENV, root)?;
        return Ok(LauncherConfig {
            global,
            envs: vec![env],
        });
    }

    anyhow::bail!("Unrecognized config layout: expected `envs` or legacy `pipelines`")
}

fn parse_environment(name: &str, body: &Mapping) -> Result<Environment> {
    let label = body
        .get("label")
        .and_then(Value::as_str)
        .unwrap_or(name)
        .to_string();

    let credentials = match body.get("credentials") {
        Some(Value::Null) | None => None,
        Some(value) => Some(
            serde_yaml::from_value(value.clone())
                .with_context(|| format!("Invalid credentials for environment '{}'", name))?,
        ),
    };

    let mut env = Environment {
        name: name.to_string(),
        label,
        credentials,
        groups: Vec::new(),
        targets: Vec::new(),
    };

    if let Some(pipelines) = body.get("pipelines") {
        let pipelines = pipelines
            .as_mapping()
            .with_context(|| format!("`pipelines` of '{}' must be a mapping", name))?;
        for (key, value) in pipelines {
            let key = key.as_str().context("Pipeline names must be strings")?;
            match value {
                Value::String(url) => env.targets.push(PipelineTarget::new(key, url.as_str())),
                Value::Mapping(group) => {
                    env.groups.push(GroupInfo {
                        name: key.to_string(),
                        description: String::new(),
                    });
                    push_group(&mut env.targets, key, group)?;
                }
                _ => anyhow::bail!("Pipeline '{}' must be a URL or a group of URLs", key),
            }
        }
    }

    if let Some(suites) = body.get("suites") {
        let suites = suites
            .as_mapping()
            .with_context(|| format!("`suites` of '{}' must be a mapping", name))?;
        for (key, value) in suites {
            let suite = key.as_str().context("Suite names must be strings")?;
            let description = value
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            env.groups.push(GroupInfo {
                name: suite.to_string(),
                description,
            });
            if let Some(members) = value.get("pipelines").and_then(Value::as_mapping) {
                push_group(&mut env.targets, suite, members)?;
            }
        }
    }

    Ok(env)
}

fn push_group(targets: &mut Vec<PipelineTarget>, group: &str, members: &Mapping) -> Result<()> {
    for (key, value) in members {
        let name = key.as_str().context("Pipeline names must be strings")?;
        let url = value
            .as_str()
            .with_context(|| format!("Pipeline '{}/{}' must be a URL", group, name))?;
        targets.push(PipelineTarget::new(name, url).in_group(group));
    }
    Ok(())
}
