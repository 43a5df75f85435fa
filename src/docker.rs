use crate::image::pull_image;
use crate::runtime::{
    image_reference, ContainerDescriptor, ContainerRecord, ContainerRuntime, RestartPolicy,
    DEPLOYMENT_LABEL,
};
use bollard::container::{Config, CreateContainerOptions, ListContainersOptions};
use bollard::models::{
    ContainerInspectResponse, HostConfig, RestartPolicy as DockerRestartPolicy,
    RestartPolicyNameEnum,
};
use maplit::hashmap;
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::debug;

/// Container runtime backed by the local docker daemon
pub struct DockerRuntime {
    handle: bollard::Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self> {
        Ok(DockerRuntime {
            handle: bollard::Docker::connect_with_local_defaults()
                .into_diagnostic()
                .wrap_err("Failed to connect to docker")?,
        })
    }
}

impl From<RestartPolicy> for RestartPolicyNameEnum {
    fn from(policy: RestartPolicy) -> Self {
        match policy {
            RestartPolicy::No => RestartPolicyNameEnum::NO,
            RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
            RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
            RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        }
    }
}

impl From<RestartPolicyNameEnum> for RestartPolicy {
    fn from(name: RestartPolicyNameEnum) -> Self {
        match name {
            RestartPolicyNameEnum::EMPTY | RestartPolicyNameEnum::NO => RestartPolicy::No,
            RestartPolicyNameEnum::ALWAYS => RestartPolicy::Always,
            RestartPolicyNameEnum::UNLESS_STOPPED => RestartPolicy::UnlessStopped,
            RestartPolicyNameEnum::ON_FAILURE => RestartPolicy::OnFailure,
        }
    }
}

fn record_from_inspect(name: &str, info: ContainerInspectResponse) -> ContainerRecord {
    let host_config = info.host_config.unwrap_or_default();
    let config = info.config.unwrap_or_default();
    ContainerRecord {
        name: name.to_string(),
        image: config.image.unwrap_or_default(),
        state: info
            .state
            .and_then(|state| state.status)
            .map(|status| status.to_string())
            .unwrap_or_default(),
        restart: host_config
            .restart_policy
            .and_then(|policy| policy.name)
            .map(RestartPolicy::from)
            .unwrap_or(RestartPolicy::No),
        args: config.cmd.unwrap_or_default(),
        binds: host_config.binds.unwrap_or_default(),
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.handle
            .ping()
            .await
            .into_diagnostic()
            .wrap_err("Docker daemon is not reachable")?;
        Ok(())
    }

    async fn find(&self, name: &str) -> Result<Option<ContainerRecord>> {
        // the name filter is an unanchored regex and docker prefixes names with a slash
        let pattern = format!("^/{}$", name);
        let containers = self
            .handle
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters: hashmap! {
                    "name" => vec![pattern.as_str()],
                },
                ..Default::default()
            }))
            .await
            .into_diagnostic()
            .wrap_err("Failed to list docker containers")?;
        let expected = format!("/{}", name);
        let Some(id) = containers.into_iter().find_map(|container| {
            container
                .names
                .unwrap_or_default()
                .contains(&expected)
                .then_some(container.id)
                .flatten()
        }) else {
            debug!(name, "no container found");
            return Ok(None);
        };

        let info = self
            .handle
            .inspect_container(&id, None)
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to inspect container {}", name))?;
        Ok(Some(record_from_inspect(name, info)))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        pull_image(&self.handle, &image_reference(image)).await
    }

    async fn create(&self, descriptor: &ContainerDescriptor) -> Result<String> {
        let options = Some(CreateContainerOptions {
            name: descriptor.name.as_str(),
            ..CreateContainerOptions::default()
        });
        let image = image_reference(&descriptor.image);
        let config = Config {
            image: Some(image.as_str()),
            cmd: (!descriptor.args.is_empty())
                .then(|| descriptor.args.iter().map(String::as_str).collect()),
            env: Some(descriptor.env.iter().map(String::as_str).collect()),
            labels: Some(hashmap! {
                DEPLOYMENT_LABEL => descriptor.name.as_str(),
            }),
            host_config: Some(HostConfig {
                binds: Some(descriptor.binds.clone()),
                restart_policy: Some(DockerRestartPolicy {
                    name: Some(descriptor.restart.into()),
                    maximum_retry_count: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let id = self
            .handle
            .create_container(options, config)
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to create container {}", descriptor.name))?
            .id;
        debug!(name = %descriptor.name, id = %id, "container created");
        Ok(id)
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.handle
            .start_container::<String>(name, None)
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to start container {}", name))
    }
}
