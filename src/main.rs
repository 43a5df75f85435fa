use crate::args::{DockguardArgs, USAGE};
use crate::config::DockguardConfig;
use crate::deployment::{Deployment, DeploymentTrait};
use crate::docker::DockerRuntime;
use crate::error::{reason, GuardError};
use crate::guard::{Guard, Outcome, ResourceState};
use crate::host::{Host, SystemHost};
use crate::output::Output;
use crate::runtime::ContainerRuntime;
use crate::session::Session;
use chrono::Local;
use miette::{Report, Result, WrapErr};

mod args;
mod config;
mod deployment;
mod docker;
mod error;
#[cfg(test)]
mod fake;
mod guard;
mod host;
mod image;
mod output;
mod runtime;
mod session;
mod step;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_panic_hook();
    tracing_subscriber::fmt::init();

    let config = DockguardConfig::load().wrap_err("Failed to load config")?;
    let args = DockguardArgs::parse(std::env::args())?;
    let output = Output::new(config.color.enabled());

    match args {
        DockguardArgs::Help => {
            println!("{}", USAGE);
        }
        DockguardArgs::List => {
            for deployment in Deployment::all(&config)? {
                println!("{:16} {}", deployment.name(), deployment.description());
            }
        }
        DockguardArgs::Plan { name } => {
            let deployment = Deployment::find(&config, &name)?;
            let plan = deployment.plan();
            for (index, step) in plan.iter().enumerate() {
                println!("{}/{} {}", index + 1, plan.len(), step);
            }
        }
        DockguardArgs::Status { name } => {
            let deployment = Deployment::find(&config, &name)?;
            let runtime = connect(&deployment)?;
            let host = SystemHost::default();
            let guard = Guard::new(&runtime, &host, output);
            let record = match guard.status(&deployment).await? {
                ResourceState::Present(record) => {
                    output.success(&record);
                    Some(record)
                }
                ResourceState::Absent => {
                    output.warn(format!("{} is not deployed", deployment.name()));
                    None
                }
            };
            output.summary(deployment.name(), deployment.summary(record.as_ref()));
        }
        DockguardArgs::Deploy { names } => {
            // resolve everything up front so a typo doesn't leave a half finished run
            let deployments = names
                .iter()
                .map(|name| Deployment::find(&config, name))
                .collect::<Result<Vec<_>>>()?;
            if let Some(first) = deployments.first() {
                let runtime = connect(first)?;
                let host = SystemHost::default();
                deploy(&deployments, &runtime, &host, output).await?;
            }
        }
    };

    Ok(())
}

fn connect(deployment: &Deployment) -> Result<DockerRuntime, GuardError> {
    DockerRuntime::connect().map_err(|e| GuardError::PreconditionUnmet {
        deployment: deployment.name().to_string(),
        reason: reason(&e),
        help: Some("make sure docker is installed".to_string()),
    })
}

/// Run the guard for every deployment in order, a failed deployment doesn't stop the next one
async fn deploy(
    deployments: &[Deployment],
    runtime: &dyn ContainerRuntime,
    host: &dyn Host,
    output: Output,
) -> Result<()> {
    let guard = Guard::new(runtime, host, output);

    if let [deployment] = deployments {
        guard.ensure(deployment).await?;
        return Ok(());
    }

    let mut session = Session::default();
    for deployment in deployments {
        let started = Local::now();
        output.info(format!(
            "Starting: {} - {}",
            started.format("%Y-%m-%d %H:%M:%S"),
            deployment.name()
        ));
        let outcome = match guard.ensure(deployment).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let outcome = Outcome::Failed(e.to_string());
                output.error(format!("{:?}", Report::new(e)));
                outcome
            }
        };
        session.record(started, deployment.name(), outcome);
    }

    output.summary(
        "Execution summary",
        session.report(Local::now(), session.elapsed()),
    );
    match session.failures() {
        0 => Ok(()),
        failed => Err(Report::msg(format!(
            "{} of {} deployments failed",
            failed,
            session.count()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchtowerConfig;
    use crate::deployment::{watchtower, ContainerDeployment, NvidiaToolkit};
    use crate::fake::{FakeHost, FakeRuntime};
    use crate::runtime::ContainerDescriptor;

    fn whoami() -> Deployment {
        ContainerDeployment {
            descriptor: ContainerDescriptor::new("whoami", "traefik/whoami"),
            description: "test".into(),
            notes: vec![],
        }
        .into()
    }

    #[tokio::test]
    async fn test_deploy_continues_after_failure() {
        let runtime = FakeRuntime::default();
        let host = FakeHost::unprivileged();
        let deployments: Vec<Deployment> = vec![
            NvidiaToolkit.into(),
            watchtower(&WatchtowerConfig::default()).into(),
        ];

        let err = deploy(&deployments, &runtime, &host, Output::new(false))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 deployments failed");
        assert!(host.commands().is_empty());
        let containers = runtime.containers();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "watchtower");
        assert!(containers[0].is_running());
    }

    #[tokio::test]
    async fn test_deploy_all_succeed() {
        let runtime = FakeRuntime::default();
        runtime.insert_running("watchtower", "containrrr/watchtower");
        let host = FakeHost::default();
        let deployments: Vec<Deployment> =
            vec![watchtower(&WatchtowerConfig::default()).into(), whoami()];

        deploy(&deployments, &runtime, &host, Output::new(false))
            .await
            .unwrap();
        assert_eq!(
            runtime.mutating_calls(),
            vec!["pull traefik/whoami", "create whoami", "start whoami"]
        );
        assert_eq!(runtime.containers().len(), 2);
    }

    #[tokio::test]
    async fn test_deploy_single_failure_is_returned() {
        let runtime = FakeRuntime::failing_on("start");
        let host = FakeHost::default();

        let err = deploy(&[whoami()], &runtime, &host, Output::new(false))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GuardError>(),
            Some(GuardError::StepFailed { index: 3, total: 3, .. })
        ));
    }
}
