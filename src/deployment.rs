mod container;
mod nvidia;
mod watchtower;

pub use crate::deployment::container::ContainerDeployment;
pub use crate::deployment::nvidia::{NvidiaToolkit, PackageRecord};
pub use crate::deployment::watchtower::watchtower;

use crate::config::DockguardConfig;
use crate::host::Host;
use crate::runtime::{ContainerRecord, ContainerRuntime};
use crate::step::Step;
use enum_dispatch::enum_dispatch;
use miette::{Report, Result};
use std::fmt;
use tracing::debug;

/// The existing resource a deployment manages
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResourceRecord {
    Container(ContainerRecord),
    Package(PackageRecord),
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceRecord::Container(container) => container.fmt(f),
            ResourceRecord::Package(package) => package.fmt(f),
        }
    }
}

#[async_trait::async_trait]
#[enum_dispatch(Deployment)]
pub trait DeploymentTrait {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn requires_root(&self) -> bool {
        false
    }

    /// Look up the managed resource, without changing anything
    async fn probe(
        &self,
        runtime: &dyn ContainerRuntime,
        host: &dyn Host,
    ) -> Result<Option<ResourceRecord>>;

    /// Steps that create the resource when it's absent
    fn plan(&self) -> Vec<Step>;

    /// Operational notes printed after every run
    fn summary(&self, record: Option<&ResourceRecord>) -> Vec<String>;
}

#[enum_dispatch]
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Deployment {
    Container(ContainerDeployment),
    NvidiaToolkit(NvidiaToolkit),
}

impl Deployment {
    /// All known deployments, entries from the config file replace built-ins with the same name
    pub fn all(config: &DockguardConfig) -> Result<Vec<Deployment>> {
        let mut deployments: Vec<Deployment> = vec![
            watchtower(&config.watchtower).into(),
            NvidiaToolkit.into(),
        ];
        for custom in &config.deployments {
            let custom: Deployment = ContainerDeployment::from_config(custom)?.into();
            match deployments
                .iter_mut()
                .find(|existing| existing.name() == custom.name())
            {
                Some(existing) => {
                    debug!(name = custom.name(), "config overrides built-in deployment");
                    *existing = custom;
                }
                None => deployments.push(custom),
            }
        }
        Ok(deployments)
    }

    pub fn find(config: &DockguardConfig, name: &str) -> Result<Deployment> {
        Deployment::all(config)?
            .into_iter()
            .find(|deployment| deployment.name() == name)
            .ok_or_else(|| Report::msg(format!("Unknown deployment: {}", name)))
    }
}

#[test]
fn test_builtin_deployments() {
    let config = DockguardConfig::default();
    let names: Vec<String> = Deployment::all(&config)
        .unwrap()
        .iter()
        .map(|deployment| deployment.name().to_string())
        .collect();
    assert_eq!(names, vec!["watchtower", "nvidia-toolkit"]);
    assert!(Deployment::find(&config, "portainer").is_err());
    assert!(Deployment::find(&config, "nvidia-toolkit")
        .unwrap()
        .requires_root());
}

#[test]
fn test_config_deployments() {
    let config = DockguardConfig::parse(
        r#"
[[deployment]]
name = "watchtower"
image = "containrrr/watchtower:1.7.1"
args = "--interval 60"

[[deployment]]
name = "whoami"
image = "traefik/whoami"
"#,
    )
    .unwrap();
    let deployments = Deployment::all(&config).unwrap();
    assert_eq!(deployments.len(), 3);
    let Deployment::Container(watchtower) = Deployment::find(&config, "watchtower").unwrap() else {
        panic!("watchtower should be a container deployment");
    };
    assert_eq!(watchtower.descriptor.image, "containrrr/watchtower:1.7.1");
    assert_eq!(watchtower.descriptor.args, vec!["--interval", "60"]);
    assert_eq!(deployments[2].name(), "whoami");
    assert!(!deployments[2].requires_root());
}
