use crate::deployment::{DeploymentTrait, ResourceRecord};
use crate::host::Host;
use crate::runtime::ContainerRuntime;
use crate::step::{Rewrite, Step};
use miette::Result;
use std::fmt;

const PACKAGE: &str = "nvidia-container-toolkit";
const KEY_URL: &str = "https://nvidia.github.io/libnvidia-container/gpgkey";
const LIST_URL: &str =
    "https://nvidia.github.io/libnvidia-container/stable/deb/nvidia-container-toolkit.list";
// apt accepts armored keys when the keyring ends in .asc
const KEYRING: &str = "/usr/share/keyrings/nvidia-container-toolkit-keyring.asc";
const SOURCE_LIST: &str = "/etc/apt/sources.list.d/nvidia-container-toolkit.list";

/// NVIDIA Container Toolkit from NVIDIA's apt repository, registered as a docker runtime.
///
/// The host drivers are expected to be installed already.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NvidiaToolkit;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} is installed", self.name, self.version)
    }
}

/// Parse `dpkg-query --showformat '${Status} ${Version}'` output, `None` unless fully installed.
///
/// The selection (`install`, `hold`, ...) is ignored, only the `ok installed` state counts.
fn parse_dpkg_status(output: &str) -> Option<String> {
    let mut words = output.split_whitespace();
    let _selection = words.next()?;
    match (words.next()?, words.next()?) {
        ("ok", "installed") => Some(words.next().unwrap_or_default().to_string()),
        _ => None,
    }
}

#[async_trait::async_trait]
impl DeploymentTrait for NvidiaToolkit {
    fn name(&self) -> &str {
        "nvidia-toolkit"
    }

    fn description(&self) -> &str {
        "Install the NVIDIA Container Toolkit and enable GPU access in docker"
    }

    fn requires_root(&self) -> bool {
        true
    }

    async fn probe(
        &self,
        _runtime: &dyn ContainerRuntime,
        host: &dyn Host,
    ) -> Result<Option<ResourceRecord>> {
        let args = [
            "-W".to_string(),
            "--showformat=${Status} ${Version}".to_string(),
            PACKAGE.to_string(),
        ];
        let captured = host.capture("dpkg-query", &args).await?;
        if !captured.code.success() {
            return Ok(None);
        }
        Ok(parse_dpkg_status(&captured.stdout).map(|version| {
            ResourceRecord::Package(PackageRecord {
                name: PACKAGE.to_string(),
                version,
            })
        }))
    }

    fn plan(&self) -> Vec<Step> {
        vec![
            Step::run("apt-get", ["update"]),
            Step::run("apt-get", ["install", "-y", "ca-certificates"]),
            Step::Download {
                url: KEY_URL.to_string(),
                dest: KEYRING.into(),
                rewrite: None,
            },
            Step::Download {
                url: LIST_URL.to_string(),
                dest: SOURCE_LIST.into(),
                rewrite: Some(Rewrite::SignedBy(KEYRING.into())),
            },
            Step::run("apt-get", ["update"]),
            Step::run("apt-get", ["install", "-y", PACKAGE]),
            Step::run("nvidia-ctk", ["runtime", "configure", "--runtime=docker"]),
            Step::run("systemctl", ["restart", "docker"]),
        ]
    }

    fn summary(&self, record: Option<&ResourceRecord>) -> Vec<String> {
        vec![
            match record {
                Some(record) => record.to_string(),
                None => format!("{} is not installed", PACKAGE),
            },
            "Verify GPU access with: docker run --rm --gpus all ubuntu nvidia-smi".to_string(),
            "Containers need --gpus all (or a device reservation in compose) to see the GPU"
                .to_string(),
            "The NVIDIA driver itself is not managed here, check it with: nvidia-smi".to_string(),
        ]
    }
}

#[test]
fn test_parse_dpkg_status() {
    assert_eq!(
        parse_dpkg_status("install ok installed 1.17.3-1"),
        Some("1.17.3-1".to_string())
    );
    assert_eq!(
        parse_dpkg_status("hold ok installed 1.17.3-1\n"),
        Some("1.17.3-1".to_string())
    );
    assert_eq!(parse_dpkg_status("deinstall ok config-files 1.17.3-1"), None);
    assert_eq!(parse_dpkg_status("install ok half-configured 1.17.3-1"), None);
    assert_eq!(parse_dpkg_status("install reinstreq installed 1.17.3-1"), None);
    assert_eq!(parse_dpkg_status(""), None);
}

#[test]
fn test_toolkit_prerequisites() {
    let plan = NvidiaToolkit.plan();
    assert_eq!(plan.len(), 8);
    assert_eq!(plan[0].to_string(), "apt-get update");
    assert_eq!(plan[1].to_string(), "apt-get install -y ca-certificates");
    assert!(matches!(&plan[2], Step::Download { dest, .. } if dest == KEYRING));
}

#[test]
fn test_toolkit_plan_order() {
    let plan = NvidiaToolkit.plan();
    let install = plan
        .iter()
        .position(|step| step.to_string() == "apt-get install -y nvidia-container-toolkit")
        .unwrap();
    let list = plan
        .iter()
        .position(|step| matches!(step, Step::Download { dest, .. } if dest == SOURCE_LIST))
        .unwrap();
    let configure = plan
        .iter()
        .position(|step| matches!(step, Step::Run { program, .. } if program == "nvidia-ctk"))
        .unwrap();
    assert!(list < install);
    assert!(install < configure);
    assert_eq!(plan.last().unwrap().to_string(), "systemctl restart docker");
}
