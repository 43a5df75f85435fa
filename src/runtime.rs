use miette::Result;
use parse_display::{Display, FromStr};
use serde::Deserialize;
use std::fmt;

/// Label attached to every container created by dockguard
pub const DEPLOYMENT_LABEL: &str = "dockguard-deployment";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Display, FromStr, Deserialize)]
#[display(style = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    #[default]
    Always,
    UnlessStopped,
    OnFailure,
}

/// Identity and fixed configuration of a container managed by dockguard.
///
/// The configuration is only applied when the container is created, an existing container
/// with the same name is left untouched even if its configuration differs.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ContainerDescriptor {
    pub name: String,
    pub image: String,
    /// Passed to the container as its command, in order
    pub args: Vec<String>,
    pub restart: RestartPolicy,
    /// `host:container[:ro]` bind mounts
    pub binds: Vec<String>,
    pub env: Vec<String>,
}

impl ContainerDescriptor {
    pub fn new<S1: Into<String>, S2: Into<String>>(name: S1, image: S2) -> Self {
        ContainerDescriptor {
            name: name.into(),
            image: image.into(),
            args: Vec::new(),
            restart: RestartPolicy::default(),
            binds: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn restart(self, restart: RestartPolicy) -> Self {
        Self { restart, ..self }
    }

    pub fn bind<S: Into<String>>(mut self, bind: S) -> Self {
        self.binds.push(bind.into());
        self
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(S::into));
        self
    }
}

/// What the runtime reports about an existing container
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ContainerRecord {
    pub name: String,
    pub image: String,
    pub state: String,
    pub restart: RestartPolicy,
    pub args: Vec<String>,
    pub binds: Vec<String>,
}

impl ContainerRecord {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

impl fmt::Display for ContainerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) is {}, restart policy {}",
            self.name, self.image, self.state, self.restart
        )
    }
}

#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Fails when the daemon can't be reached
    async fn ping(&self) -> Result<()>;

    /// Find the container with exactly this name, running or not
    async fn find(&self, name: &str) -> Result<Option<ContainerRecord>>;

    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Returns the id of the created container
    async fn create(&self, descriptor: &ContainerDescriptor) -> Result<String>;

    async fn start(&self, name: &str) -> Result<()>;
}

/// Image reference with an explicit tag, pulling an untagged image would fetch every tag
pub fn image_reference(image: &str) -> String {
    let last_component = image.rsplit('/').next().unwrap_or(image);
    if last_component.contains(':') || last_component.contains('@') {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}

#[test]
fn test_image_reference() {
    assert_eq!(
        image_reference("containrrr/watchtower"),
        "containrrr/watchtower:latest"
    );
    assert_eq!(image_reference("postgres:14"), "postgres:14");
    assert_eq!(
        image_reference("localhost:5000/tools/app"),
        "localhost:5000/tools/app:latest"
    );
    assert_eq!(
        image_reference("localhost:5000/tools/app:1.2"),
        "localhost:5000/tools/app:1.2"
    );
    assert_eq!(
        image_reference("alpine@sha256:0123abcd"),
        "alpine@sha256:0123abcd"
    );
}

#[test]
fn test_restart_policy_names() {
    use std::str::FromStr;

    assert_eq!(RestartPolicy::UnlessStopped.to_string(), "unless-stopped");
    assert_eq!(RestartPolicy::Always.to_string(), "always");
    assert_eq!(
        RestartPolicy::from_str("on-failure").unwrap(),
        RestartPolicy::OnFailure
    );
    assert!(RestartPolicy::from_str("sometimes").is_err());
}

#[test]
fn test_descriptor_builder() {
    let descriptor = ContainerDescriptor::new("watchtower", "containrrr/watchtower")
        .bind("/var/run/docker.sock:/var/run/docker.sock")
        .arg("--cleanup")
        .args(["--interval", "3600"])
        .restart(RestartPolicy::Always);
    assert_eq!(descriptor.args, vec!["--cleanup", "--interval", "3600"]);
    assert_eq!(
        descriptor.binds,
        vec!["/var/run/docker.sock:/var/run/docker.sock"]
    );
    assert_eq!(descriptor.restart, RestartPolicy::Always);
    assert!(descriptor.env.is_empty());
}
