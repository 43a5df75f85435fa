use crate::host::Host;
use crate::runtime::{ContainerDescriptor, ContainerRuntime};
use camino::Utf8PathBuf;
use miette::{Result, WrapErr};
use std::fmt;

/// A single provisioning action, plans are executed in order and stop at the first failure
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Step {
    PullImage {
        image: String,
    },
    CreateContainer(ContainerDescriptor),
    StartContainer {
        name: String,
    },
    Run {
        program: String,
        args: Vec<String>,
    },
    Download {
        url: String,
        dest: Utf8PathBuf,
        rewrite: Option<Rewrite>,
    },
}

/// Transformation applied to downloaded content before it's written
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Rewrite {
    /// Pin every `deb https://` source line to a keyring
    SignedBy(Utf8PathBuf),
}

impl Rewrite {
    pub fn apply(&self, content: &str) -> String {
        match self {
            Rewrite::SignedBy(keyring) => {
                let replacement = format!("deb [signed-by={}] https://", keyring);
                content
                    .lines()
                    .map(|line| match line.strip_prefix("deb https://") {
                        Some(rest) => format!("{}{}", replacement, rest),
                        None => line.to_string(),
                    })
                    .map(|line| line + "\n")
                    .collect()
            }
        }
    }
}

impl Step {
    pub fn run<S: Into<String>>(program: &str, args: impl IntoIterator<Item = S>) -> Self {
        Step::Run {
            program: program.to_string(),
            args: args.into_iter().map(S::into).collect(),
        }
    }

    pub async fn execute(&self, runtime: &dyn ContainerRuntime, host: &dyn Host) -> Result<()> {
        match self {
            Step::PullImage { image } => runtime.pull_image(image).await,
            Step::CreateContainer(descriptor) => runtime.create(descriptor).await.map(|_| ()),
            Step::StartContainer { name } => runtime.start(name).await,
            Step::Run { program, args } => host.run(program, args).await?.to_result(),
            Step::Download { url, dest, rewrite } => {
                let content = host.fetch(url).await?;
                let content = match rewrite {
                    Some(rewrite) => rewrite.apply(&content),
                    None => content,
                };
                host.write_file(dest, &content)
                    .await
                    .wrap_err_with(|| format!("Failed to save {}", url))
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::PullImage { image } => write!(f, "pull image {}", image),
            Step::CreateContainer(descriptor) => {
                write!(
                    f,
                    "create container {} from {} (restart {})",
                    descriptor.name, descriptor.image, descriptor.restart
                )?;
                for bind in &descriptor.binds {
                    write!(f, " -v {}", bind)?;
                }
                if !descriptor.args.is_empty() {
                    write!(f, " {}", shell_words::join(&descriptor.args))?;
                }
                Ok(())
            }
            Step::StartContainer { name } => write!(f, "start container {}", name),
            Step::Run { program, args } => {
                write!(f, "{}", program)?;
                if !args.is_empty() {
                    write!(f, " {}", shell_words::join(args))?;
                }
                Ok(())
            }
            Step::Download { url, dest, .. } => write!(f, "download {} to {}", url, dest),
        }
    }
}

#[test]
fn test_signed_by_rewrite() {
    let list = "deb https://nvidia.github.io/libnvidia-container/stable/deb/$(ARCH) /\n\
                #deb https://nvidia.github.io/libnvidia-container/experimental/deb/$(ARCH) /\n";
    let rewritten = Rewrite::SignedBy("/usr/share/keyrings/nvidia.asc".into()).apply(list);
    assert_eq!(
        rewritten,
        "deb [signed-by=/usr/share/keyrings/nvidia.asc] https://nvidia.github.io/libnvidia-container/stable/deb/$(ARCH) /\n\
         #deb https://nvidia.github.io/libnvidia-container/experimental/deb/$(ARCH) /\n"
    );
}

#[test]
fn test_step_display() {
    use crate::runtime::RestartPolicy;

    assert_eq!(
        Step::run("apt-get", ["install", "-y", "nvidia-container-toolkit"]).to_string(),
        "apt-get install -y nvidia-container-toolkit"
    );
    assert_eq!(
        Step::run("echo", ["two words"]).to_string(),
        "echo 'two words'"
    );
    let descriptor = ContainerDescriptor::new("watchtower", "containrrr/watchtower")
        .restart(RestartPolicy::Always)
        .bind("/var/run/docker.sock:/var/run/docker.sock")
        .args(["--cleanup", "--interval", "3600"]);
    assert_eq!(
        Step::CreateContainer(descriptor).to_string(),
        "create container watchtower from containrrr/watchtower (restart always) \
         -v /var/run/docker.sock:/var/run/docker.sock --cleanup --interval 3600"
    );
}
