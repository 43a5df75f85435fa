use crate::config::WatchtowerConfig;
use crate::deployment::ContainerDeployment;
use crate::runtime::{ContainerDescriptor, RestartPolicy};

const IMAGE: &str = "containrrr/watchtower";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Watchtower keeps every other container on the host up to date with its image
pub fn watchtower(config: &WatchtowerConfig) -> ContainerDeployment {
    let mut descriptor = ContainerDescriptor::new("watchtower", IMAGE)
        .restart(RestartPolicy::Always)
        .bind(format!("{}:{}", DOCKER_SOCKET, DOCKER_SOCKET));
    if config.cleanup {
        descriptor = descriptor.arg("--cleanup");
    }
    descriptor = descriptor.args(["--interval".to_string(), config.interval.to_string()]);

    let mut notes = vec![format!(
        "Checks for updated images every {} seconds",
        config.interval
    )];
    if config.cleanup {
        notes.push("Old images are removed after an update".to_string());
    }
    notes.extend([
        "Exclude a container with the label com.centurylinklabs.watchtower.enable=false"
            .to_string(),
        "To change the settings, remove it with: docker rm -f watchtower, and deploy again"
            .to_string(),
    ]);

    ContainerDeployment {
        descriptor,
        description: "Automatically update running containers".to_string(),
        notes,
    }
}

#[test]
fn test_default_watchtower() {
    let deployment = watchtower(&WatchtowerConfig::default());
    let descriptor = &deployment.descriptor;
    assert_eq!(descriptor.name, "watchtower");
    assert_eq!(descriptor.image, "containrrr/watchtower");
    assert_eq!(descriptor.restart, RestartPolicy::Always);
    assert_eq!(
        descriptor.binds,
        vec!["/var/run/docker.sock:/var/run/docker.sock"]
    );
    assert_eq!(descriptor.args, vec!["--cleanup", "--interval", "3600"]);
}

#[test]
fn test_watchtower_without_cleanup() {
    let deployment = watchtower(&WatchtowerConfig {
        interval: 86400,
        cleanup: false,
    });
    assert_eq!(deployment.descriptor.args, vec!["--interval", "86400"]);
    assert!(deployment.notes[0].contains("86400"));
}
