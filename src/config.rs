use crate::runtime::{ContainerDescriptor, RestartPolicy};
use camino::Utf8PathBuf;
use directories_next::ProjectDirs;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::Deserialize;
use std::fs::read_to_string;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
pub struct DockguardConfig {
    #[serde(default)]
    pub color: ColorChoice,
    #[serde(default)]
    pub watchtower: WatchtowerConfig,
    #[serde(default, rename = "deployment")]
    pub deployments: Vec<ContainerDeploymentConfig>,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    pub fn enabled(&self) -> bool {
        match self {
            ColorChoice::Auto => atty::is(atty::Stream::Stdout),
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchtowerConfig {
    /// Seconds between update checks
    #[serde(default = "default_watchtower_interval")]
    pub interval: u64,
    /// Remove old images after updating
    #[serde(default = "default_true")]
    pub cleanup: bool,
}

impl Default for WatchtowerConfig {
    fn default() -> Self {
        WatchtowerConfig {
            interval: default_watchtower_interval(),
            cleanup: true,
        }
    }
}

fn default_watchtower_interval() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerDeploymentConfig {
    pub name: String,
    pub image: String,
    pub description: Option<String>,
    #[serde(default)]
    pub restart: RestartPolicy,
    #[serde(default)]
    pub binds: Vec<String>,
    #[serde(default)]
    pub args: CommandArgs,
    #[serde(default)]
    pub env: Vec<String>,
    /// Extra lines printed after deploying
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Container arguments, either as a list or as a single shell-style string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandArgs {
    List(Vec<String>),
    Line(String),
}

impl Default for CommandArgs {
    fn default() -> Self {
        CommandArgs::List(Vec::new())
    }
}

impl CommandArgs {
    pub fn to_vec(&self) -> Result<Vec<String>> {
        match self {
            CommandArgs::List(args) => Ok(args.clone()),
            CommandArgs::Line(line) => shell_words::split(line)
                .into_diagnostic()
                .wrap_err_with(|| format!("Invalid arguments: {}", line)),
        }
    }
}

impl ContainerDeploymentConfig {
    pub fn descriptor(&self) -> Result<ContainerDescriptor> {
        let args = self
            .args
            .to_vec()
            .wrap_err_with(|| format!("Invalid deployment {}", self.name))?;
        Ok(ContainerDescriptor {
            binds: self.binds.clone(),
            env: self.env.clone(),
            ..ContainerDescriptor::new(&self.name, &self.image)
                .restart(self.restart)
                .args(args)
        })
    }
}

impl DockguardConfig {
    pub fn path() -> Option<Utf8PathBuf> {
        let dirs = ProjectDirs::from("", "", "dockguard")?;
        Utf8PathBuf::from_path_buf(dirs.config_dir().join("dockguard.toml")).ok()
    }

    /// Load the config file, a missing file gives the default config
    pub fn load() -> Result<Self> {
        let Some(file) = Self::path() else {
            debug!("no config directory available, using defaults");
            return Ok(DockguardConfig::default());
        };
        if !file.exists() {
            debug!(%file, "config file not found, using defaults");
            return Ok(DockguardConfig::default());
        }
        let content = read_to_string(&file)
            .into_diagnostic()
            .wrap_err("Failed to read config file")?;
        Self::parse(&content).wrap_err_with(|| format!("Failed to parse config file {}", file))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).into_diagnostic()
    }
}

#[test]
fn test_empty_config() {
    let config = DockguardConfig::parse("").unwrap();
    assert_eq!(config.color, ColorChoice::Auto);
    assert_eq!(config.watchtower.interval, 3600);
    assert!(config.watchtower.cleanup);
    assert!(config.deployments.is_empty());
}

#[test]
fn test_full_config() {
    let config = DockguardConfig::parse(
        r#"
color = "never"

[watchtower]
interval = 300
cleanup = false

[[deployment]]
name = "portainer"
image = "portainer/portainer-ce"
description = "Web UI for docker"
restart = "unless-stopped"
binds = ["/var/run/docker.sock:/var/run/docker.sock", "portainer_data:/data"]
args = "--http-enabled --bind ':9000'"

[[deployment]]
name = "whoami"
image = "traefik/whoami"
args = ["--port", "8080"]
env = ["WHOAMI_NAME=dockguard"]
"#,
    )
    .unwrap();
    assert_eq!(config.color, ColorChoice::Never);
    assert_eq!(config.watchtower.interval, 300);
    assert!(!config.watchtower.cleanup);

    let portainer = config.deployments[0].descriptor().unwrap();
    assert_eq!(portainer.name, "portainer");
    assert_eq!(portainer.restart, RestartPolicy::UnlessStopped);
    assert_eq!(portainer.args, vec!["--http-enabled", "--bind", ":9000"]);
    assert_eq!(portainer.binds.len(), 2);

    let whoami = config.deployments[1].descriptor().unwrap();
    assert_eq!(whoami.restart, RestartPolicy::Always);
    assert_eq!(whoami.args, vec!["--port", "8080"]);
    assert_eq!(whoami.env, vec!["WHOAMI_NAME=dockguard"]);
}

#[test]
fn test_invalid_args() {
    let config = DockguardConfig::parse(
        r#"
[[deployment]]
name = "broken"
image = "alpine"
args = "echo 'unterminated"
"#,
    )
    .unwrap();
    assert!(config.deployments[0].descriptor().is_err());
}

#[test]
fn test_unknown_restart_policy() {
    assert!(DockguardConfig::parse(
        r#"
[[deployment]]
name = "broken"
image = "alpine"
restart = "sometimes"
"#,
    )
    .is_err());
}
