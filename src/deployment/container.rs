use crate::config::ContainerDeploymentConfig;
use crate::deployment::{DeploymentTrait, ResourceRecord};
use crate::host::Host;
use crate::runtime::{ContainerDescriptor, ContainerRuntime};
use crate::step::Step;
use miette::Result;

/// A single long-lived container, created once and left alone afterwards
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ContainerDeployment {
    pub descriptor: ContainerDescriptor,
    pub description: String,
    pub notes: Vec<String>,
}

impl ContainerDeployment {
    pub fn from_config(config: &ContainerDeploymentConfig) -> Result<Self> {
        Ok(ContainerDeployment {
            descriptor: config.descriptor()?,
            description: config
                .description
                .clone()
                .unwrap_or_else(|| format!("{} container", config.image)),
            notes: config.notes.clone(),
        })
    }
}

#[async_trait::async_trait]
impl DeploymentTrait for ContainerDeployment {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn probe(
        &self,
        runtime: &dyn ContainerRuntime,
        _host: &dyn Host,
    ) -> Result<Option<ResourceRecord>> {
        Ok(runtime
            .find(&self.descriptor.name)
            .await?
            .map(ResourceRecord::Container))
    }

    fn plan(&self) -> Vec<Step> {
        vec![
            Step::PullImage {
                image: self.descriptor.image.clone(),
            },
            Step::CreateContainer(self.descriptor.clone()),
            Step::StartContainer {
                name: self.descriptor.name.clone(),
            },
        ]
    }

    fn summary(&self, record: Option<&ResourceRecord>) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.notes.len() + 2);
        match record {
            Some(record) => {
                lines.push(record.to_string());
                if let ResourceRecord::Container(container) = record {
                    if !container.args.is_empty() {
                        lines.push(format!("Command: {}", shell_words::join(&container.args)));
                    }
                    for bind in &container.binds {
                        lines.push(format!("Mount: {}", bind));
                    }
                    if !container.is_running() {
                        lines.push(format!("Start it with: docker start {}", container.name));
                    }
                }
            }
            None => lines.push(format!("{} does not exist", self.descriptor.name)),
        }
        lines.push(format!("Logs: docker logs -f {}", self.descriptor.name));
        lines.extend(self.notes.iter().cloned());
        lines
    }
}

#[test]
fn test_container_plan() {
    let deployment = ContainerDeployment {
        descriptor: ContainerDescriptor::new("whoami", "traefik/whoami"),
        description: "test".into(),
        notes: vec![],
    };
    let plan = deployment.plan();
    assert_eq!(plan.len(), 3);
    assert_eq!(plan[0].to_string(), "pull image traefik/whoami");
    assert!(matches!(&plan[1], Step::CreateContainer(descriptor) if descriptor.name == "whoami"));
    assert_eq!(plan[2].to_string(), "start container whoami");
}

#[test]
fn test_stopped_container_summary() {
    use crate::runtime::{ContainerRecord, RestartPolicy};

    let deployment = ContainerDeployment {
        descriptor: ContainerDescriptor::new("whoami", "traefik/whoami"),
        description: "test".into(),
        notes: vec!["Listens on port 80".into()],
    };
    let record = ResourceRecord::Container(ContainerRecord {
        name: "whoami".into(),
        image: "traefik/whoami:latest".into(),
        state: "exited".into(),
        restart: RestartPolicy::No,
        args: vec![],
        binds: vec![],
    });
    assert_eq!(
        deployment.summary(Some(&record)),
        vec![
            "whoami (traefik/whoami:latest) is exited, restart policy no",
            "Start it with: docker start whoami",
            "Logs: docker logs -f whoami",
            "Listens on port 80",
        ]
    );
}
