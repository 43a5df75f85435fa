//! In-memory runtime and host used by the tests

use crate::host::{Captured, ExitCode, Host};
use crate::runtime::{ContainerDescriptor, ContainerRecord, ContainerRuntime};
use camino::Utf8Path;
use miette::{Report, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

const MUTATING: &[&str] = &["pull", "create", "start"];

pub struct FakeRuntime {
    reachable: bool,
    fail_on: Option<&'static str>,
    containers: Mutex<Vec<ContainerRecord>>,
    calls: Mutex<Vec<String>>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        FakeRuntime {
            reachable: true,
            fail_on: None,
            containers: Mutex::default(),
            calls: Mutex::default(),
        }
    }
}

impl FakeRuntime {
    pub fn unreachable() -> Self {
        FakeRuntime {
            reachable: false,
            ..FakeRuntime::default()
        }
    }

    /// Fail every call of the given kind, `pull`, `create` or `start`
    pub fn failing_on(operation: &'static str) -> Self {
        FakeRuntime {
            fail_on: Some(operation),
            ..FakeRuntime::default()
        }
    }

    pub fn insert_running(&self, name: &str, image: &str) {
        self.containers.lock().unwrap().push(ContainerRecord {
            name: name.to_string(),
            image: image.to_string(),
            state: "running".to_string(),
            restart: Default::default(),
            args: Vec::new(),
            binds: Vec::new(),
        });
    }

    pub fn containers(&self) -> Vec<ContainerRecord> {
        self.containers.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| MUTATING.iter().any(|op| call.starts_with(op)))
            .collect()
    }

    fn record(&self, operation: &str, target: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", operation, target));
        if self.fail_on == Some(operation) {
            Err(Report::msg(format!("{} {} failed", operation, target)))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<()> {
        self.calls.lock().unwrap().push("ping".to_string());
        if self.reachable {
            Ok(())
        } else {
            Err(Report::msg("Cannot connect to the Docker daemon"))
        }
    }

    async fn find(&self, name: &str) -> Result<Option<ContainerRecord>> {
        self.record("find", name)?;
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .find(|container| container.name == name)
            .cloned())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record("pull", image)
    }

    async fn create(&self, descriptor: &ContainerDescriptor) -> Result<String> {
        self.record("create", &descriptor.name)?;
        let mut containers = self.containers.lock().unwrap();
        if containers
            .iter()
            .any(|container| container.name == descriptor.name)
        {
            return Err(Report::msg(format!(
                "Conflict. The container name \"/{}\" is already in use",
                descriptor.name
            )));
        }
        containers.push(ContainerRecord {
            name: descriptor.name.clone(),
            image: descriptor.image.clone(),
            state: "created".to_string(),
            restart: descriptor.restart,
            args: descriptor.args.clone(),
            binds: descriptor.binds.clone(),
        });
        Ok(format!("{}-id", descriptor.name))
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.record("start", name)?;
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .iter_mut()
            .find(|container| container.name == name)
            .ok_or_else(|| Report::msg(format!("No such container: {}", name)))?;
        container.state = "running".to_string();
        Ok(())
    }
}

pub struct FakeHost {
    elevated: bool,
    fail_on: Option<&'static str>,
    installed: Mutex<HashSet<String>>,
    commands: Mutex<Vec<String>>,
    files: Mutex<HashMap<String, String>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        FakeHost {
            elevated: true,
            fail_on: None,
            installed: Mutex::default(),
            commands: Mutex::default(),
            files: Mutex::default(),
        }
    }
}

impl FakeHost {
    pub fn unprivileged() -> Self {
        FakeHost {
            elevated: false,
            ..FakeHost::default()
        }
    }

    /// Exit with a nonzero code for this exact command line, or fail fetching this exact url
    pub fn failing_on(command: &'static str) -> Self {
        FakeHost {
            fail_on: Some(command),
            ..FakeHost::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn files(&self) -> HashMap<String, String> {
        self.files.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Host for FakeHost {
    fn is_elevated(&self) -> bool {
        self.elevated
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<ExitCode> {
        let command = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.commands.lock().unwrap().push(command.clone());
        if self.fail_on == Some(command.as_str()) {
            return Ok(100.into());
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        if let ("apt-get", ["install", "-y", packages @ ..]) = (program, args.as_slice()) {
            self.installed
                .lock()
                .unwrap()
                .extend(packages.iter().map(|package| package.to_string()));
        }
        Ok(0.into())
    }

    async fn capture(&self, program: &str, args: &[String]) -> Result<Captured> {
        let installed = self.installed.lock().unwrap();
        match (program, args.last()) {
            ("dpkg-query", Some(package)) if installed.contains(package) => Ok(Captured {
                code: 0.into(),
                stdout: "install ok installed 1.17.3-1".to_string(),
            }),
            _ => Ok(Captured {
                code: 1.into(),
                stdout: String::new(),
            }),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        if self.fail_on == Some(url) {
            Err(Report::msg(format!("error sending request for url ({})", url)))
        } else if url.ends_with(".list") {
            Ok(
                "deb https://nvidia.github.io/libnvidia-container/stable/deb/$(ARCH) /\n"
                    .to_string(),
            )
        } else {
            Ok(
                "-----BEGIN PGP PUBLIC KEY BLOCK-----\n-----END PGP PUBLIC KEY BLOCK-----\n"
                    .to_string(),
            )
        }
    }

    async fn write_file(&self, path: &Utf8Path, content: &str) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }
}
