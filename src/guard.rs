use crate::deployment::{Deployment, DeploymentTrait, ResourceRecord};
use crate::error::{reason, GuardError};
use crate::host::Host;
use crate::output::Output;
use crate::runtime::ContainerRuntime;
use parse_display::Display;
use tracing::{debug, warn};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResourceState {
    Absent,
    Present(ResourceRecord),
}

impl From<Option<ResourceRecord>> for ResourceState {
    fn from(record: Option<ResourceRecord>) -> Self {
        match record {
            Some(record) => ResourceState::Present(record),
            None => ResourceState::Absent,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Display)]
pub enum Outcome {
    #[display("provisioned")]
    Provisioned,
    #[display("already present")]
    AlreadyPresent,
    #[display("failed: {0}")]
    Failed(String),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// Creates a deployment's resource only if it doesn't exist yet.
///
/// Provisioning runs the deployment's plan in order and stops at the first failing step,
/// steps that already completed are left in place.
pub struct Guard<'a> {
    runtime: &'a dyn ContainerRuntime,
    host: &'a dyn Host,
    output: Output,
}

impl<'a> Guard<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, host: &'a dyn Host, output: Output) -> Self {
        Guard {
            runtime,
            host,
            output,
        }
    }

    pub async fn ensure(&self, deployment: &Deployment) -> Result<Outcome, GuardError> {
        self.check_runtime(deployment).await?;
        if deployment.requires_root() && !self.host.is_elevated() {
            return Err(GuardError::PreconditionUnmet {
                deployment: deployment.name().to_string(),
                reason: "root privileges are required".to_string(),
                help: Some(format!(
                    "run again with: sudo dockguard deploy {}",
                    deployment.name()
                )),
            });
        }

        let (outcome, record) = match self.probe(deployment).await? {
            ResourceState::Present(record) => {
                debug!(deployment = deployment.name(), "resource already present");
                self.output
                    .success(format!("{} is already present", deployment.name()));
                (Outcome::AlreadyPresent, Some(record))
            }
            ResourceState::Absent => {
                self.provision(deployment).await?;
                self.output
                    .success(format!("{} has been provisioned", deployment.name()));
                let record = match self.probe(deployment).await? {
                    ResourceState::Present(record) => Some(record),
                    ResourceState::Absent => {
                        warn!(
                            deployment = deployment.name(),
                            "resource not found after provisioning"
                        );
                        None
                    }
                };
                (Outcome::Provisioned, record)
            }
        };

        self.output
            .summary(deployment.name(), deployment.summary(record.as_ref()));
        Ok(outcome)
    }

    /// Current state of the resource, never changes anything
    pub async fn status(&self, deployment: &Deployment) -> Result<ResourceState, GuardError> {
        self.check_runtime(deployment).await?;
        self.probe(deployment).await
    }

    async fn check_runtime(&self, deployment: &Deployment) -> Result<(), GuardError> {
        self.runtime
            .ping()
            .await
            .map_err(|e| GuardError::PreconditionUnmet {
                deployment: deployment.name().to_string(),
                reason: reason(&e),
                help: Some(
                    "make sure docker is installed and running: systemctl status docker"
                        .to_string(),
                ),
            })
    }

    async fn probe(&self, deployment: &Deployment) -> Result<ResourceState, GuardError> {
        deployment
            .probe(self.runtime, self.host)
            .await
            .map(ResourceState::from)
            .map_err(|e| GuardError::Probe {
                deployment: deployment.name().to_string(),
                reason: reason(&e),
            })
    }

    async fn provision(&self, deployment: &Deployment) -> Result<(), GuardError> {
        let plan = deployment.plan();
        let total = plan.len();
        for (index, step) in plan.iter().enumerate() {
            let index = index + 1;
            self.output.info(format!("[{}/{}] {}", index, total, step));
            step.execute(self.runtime, self.host)
                .await
                .map_err(|e| GuardError::StepFailed {
                    deployment: deployment.name().to_string(),
                    step: step.to_string(),
                    index,
                    total,
                    reason: reason(&e),
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchtowerConfig;
    use crate::deployment::{watchtower, NvidiaToolkit};
    use crate::fake::{FakeHost, FakeRuntime};
    use crate::runtime::RestartPolicy;

    fn watchtower_deployment() -> Deployment {
        watchtower(&WatchtowerConfig::default()).into()
    }

    #[tokio::test]
    async fn test_provision_absent_watchtower() {
        let runtime = FakeRuntime::default();
        let host = FakeHost::default();
        let guard = Guard::new(&runtime, &host, Output::new(false));

        let outcome = guard.ensure(&watchtower_deployment()).await.unwrap();
        assert_eq!(outcome, Outcome::Provisioned);

        let containers = runtime.containers();
        assert_eq!(containers.len(), 1);
        let container = &containers[0];
        assert_eq!(container.name, "watchtower");
        assert_eq!(container.restart, RestartPolicy::Always);
        assert!(container.is_running());
        assert!(container
            .args
            .windows(2)
            .any(|pair| pair == ["--interval", "3600"]));
        assert_eq!(
            runtime.mutating_calls(),
            vec![
                "pull containrrr/watchtower",
                "create watchtower",
                "start watchtower"
            ]
        );
    }

    #[tokio::test]
    async fn test_present_is_untouched() {
        let runtime = FakeRuntime::default();
        runtime.insert_running("watchtower", "containrrr/watchtower");
        let host = FakeHost::default();
        let guard = Guard::new(&runtime, &host, Output::new(false));

        let outcome = guard.ensure(&watchtower_deployment()).await.unwrap();
        assert_eq!(outcome, Outcome::AlreadyPresent);
        assert!(runtime.mutating_calls().is_empty());
        assert_eq!(runtime.containers().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_ensure_creates_once() {
        let runtime = FakeRuntime::default();
        let host = FakeHost::default();
        let guard = Guard::new(&runtime, &host, Output::new(false));
        let deployment = watchtower_deployment();

        assert_eq!(guard.ensure(&deployment).await.unwrap(), Outcome::Provisioned);
        assert_eq!(
            guard.ensure(&deployment).await.unwrap(),
            Outcome::AlreadyPresent
        );
        assert_eq!(runtime.containers().len(), 1);
        assert_eq!(runtime.mutating_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_runtime() {
        let runtime = FakeRuntime::unreachable();
        let host = FakeHost::default();
        let guard = Guard::new(&runtime, &host, Output::new(false));

        let err = guard.ensure(&watchtower_deployment()).await.unwrap_err();
        assert!(matches!(err, GuardError::PreconditionUnmet { .. }));
        assert_eq!(runtime.calls(), vec!["ping"]);
    }

    #[tokio::test]
    async fn test_failing_step_stops_plan() {
        let runtime = FakeRuntime::failing_on("create");
        let host = FakeHost::default();
        let guard = Guard::new(&runtime, &host, Output::new(false));

        let err = guard.ensure(&watchtower_deployment()).await.unwrap_err();
        match err {
            GuardError::StepFailed { index, total, .. } => {
                assert_eq!(index, 2);
                assert_eq!(total, 3);
            }
            err => panic!("unexpected error {:?}", err),
        }
        assert_eq!(
            runtime.mutating_calls(),
            vec!["pull containrrr/watchtower", "create watchtower"]
        );
        assert!(runtime.containers().is_empty());
    }

    #[tokio::test]
    async fn test_status_does_not_mutate() {
        let runtime = FakeRuntime::default();
        let host = FakeHost::default();
        let guard = Guard::new(&runtime, &host, Output::new(false));

        let state = guard.status(&watchtower_deployment()).await.unwrap();
        assert_eq!(state, ResourceState::Absent);
        assert!(runtime.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_toolkit_requires_root() {
        let runtime = FakeRuntime::default();
        let host = FakeHost::unprivileged();
        let guard = Guard::new(&runtime, &host, Output::new(false));

        let err = guard.ensure(&NvidiaToolkit.into()).await.unwrap_err();
        assert!(matches!(err, GuardError::PreconditionUnmet { .. }));
        assert!(host.commands().is_empty());
        assert!(host.files().is_empty());
    }

    #[tokio::test]
    async fn test_toolkit_install() {
        let runtime = FakeRuntime::default();
        let host = FakeHost::default();
        let guard = Guard::new(&runtime, &host, Output::new(false));
        let deployment: Deployment = NvidiaToolkit.into();

        assert_eq!(guard.ensure(&deployment).await.unwrap(), Outcome::Provisioned);
        assert_eq!(
            host.commands(),
            vec![
                "apt-get update",
                "apt-get install -y ca-certificates",
                "apt-get update",
                "apt-get install -y nvidia-container-toolkit",
                "nvidia-ctk runtime configure --runtime=docker",
                "systemctl restart docker",
            ]
        );
        let files = host.files();
        let list = files
            .get("/etc/apt/sources.list.d/nvidia-container-toolkit.list")
            .unwrap();
        assert!(list.starts_with(
            "deb [signed-by=/usr/share/keyrings/nvidia-container-toolkit-keyring.asc] https://"
        ));

        assert_eq!(
            guard.ensure(&deployment).await.unwrap(),
            Outcome::AlreadyPresent
        );
        assert_eq!(host.commands().len(), 6);
    }

    #[tokio::test]
    async fn test_toolkit_failing_install() {
        let runtime = FakeRuntime::default();
        let host = FakeHost::failing_on("apt-get install -y nvidia-container-toolkit");
        let guard = Guard::new(&runtime, &host, Output::new(false));

        let err = guard.ensure(&NvidiaToolkit.into()).await.unwrap_err();
        assert!(matches!(err, GuardError::StepFailed { index: 6, total: 8, .. }));
        assert!(!host
            .commands()
            .iter()
            .any(|command| command.starts_with("nvidia-ctk")));
    }

    #[tokio::test]
    async fn test_toolkit_failing_download() {
        let runtime = FakeRuntime::default();
        let host = FakeHost::failing_on(
            "https://nvidia.github.io/libnvidia-container/stable/deb/nvidia-container-toolkit.list",
        );
        let guard = Guard::new(&runtime, &host, Output::new(false));

        let err = guard.ensure(&NvidiaToolkit.into()).await.unwrap_err();
        match err {
            GuardError::StepFailed {
                index,
                total,
                reason,
                ..
            } => {
                assert_eq!(index, 4);
                assert_eq!(total, 8);
                assert!(reason.contains("error sending request"));
            }
            err => panic!("unexpected error {:?}", err),
        }
        // the key from step 3 stays, nothing after the failed step ran
        let files = host.files();
        assert_eq!(files.len(), 1);
        assert!(files.contains_key("/usr/share/keyrings/nvidia-container-toolkit-keyring.asc"));
        assert_eq!(
            host.commands(),
            vec!["apt-get update", "apt-get install -y ca-certificates"]
        );
    }
}
