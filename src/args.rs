use miette::{Report, Result};
use parse_display::Display;
use std::fmt::Display;
use std::str::FromStr;

pub const USAGE: &str = "\
Usage: dockguard [command] [deployment...]

Commands:
    list                 List the known deployments (default)
    deploy <name>...     Create each deployment unless it already exists
    status <name>        Show whether a deployment exists, without changing anything
    plan <name>          Show the steps used to create a deployment
    help                 Show this message

dockguard <name>... is a shorthand for deploy";

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DockguardArgs {
    List,
    Deploy { names: Vec<String> },
    Status { name: String },
    Plan { name: String },
    Help,
}

impl DockguardArgs {
    pub fn parse<I, S>(mut args: I) -> Result<DockguardArgs>
    where
        S: AsRef<str> + Into<String> + Display,
        I: Iterator<Item = S>,
    {
        let _bin = args.next();
        let command_or_name = match args.next() {
            Some(s) => s,
            None => return Ok(DockguardArgs::List),
        };
        let cmd = match DockguardCommand::from_str(command_or_name.as_ref()) {
            Ok(cmd) => cmd,
            Err(_) if command_or_name.as_ref().starts_with('-') => {
                return Err(Report::msg(format!(
                    "unrecognized option {}",
                    command_or_name
                )));
            }
            Err(_) => {
                let mut names = vec![command_or_name.into()];
                names.extend(args.map(S::into));
                return Ok(DockguardArgs::Deploy { names });
            }
        };

        match cmd {
            DockguardCommand::List => {
                no_leftover(args)?;
                Ok(DockguardArgs::List)
            }
            DockguardCommand::Deploy => {
                let names: Vec<String> = args.map(S::into).collect();
                if names.is_empty() {
                    return Err(Report::msg("No deployment specified"));
                }
                Ok(DockguardArgs::Deploy { names })
            }
            DockguardCommand::Status => {
                let name = single_name(&mut args, cmd)?;
                no_leftover(args)?;
                Ok(DockguardArgs::Status { name })
            }
            DockguardCommand::Plan => {
                let name = single_name(&mut args, cmd)?;
                no_leftover(args)?;
                Ok(DockguardArgs::Plan { name })
            }
            DockguardCommand::Help => Ok(DockguardArgs::Help),
        }
    }
}

fn single_name<I, S>(args: &mut I, cmd: DockguardCommand) -> Result<String>
where
    S: Into<String>,
    I: Iterator<Item = S>,
{
    args.next()
        .map(S::into)
        .ok_or_else(|| Report::msg(format!("{} requires a deployment name", cmd)))
}

fn no_leftover<I, S>(mut args: I) -> Result<()>
where
    S: Display,
    I: Iterator<Item = S>,
{
    match args.next() {
        Some(leftover) => Err(Report::msg(format!("unrecognized option {}", leftover))),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
#[display(style = "lowercase")]
pub enum DockguardCommand {
    List,
    Deploy,
    Status,
    Plan,
    Help,
}

impl FromStr for DockguardCommand {
    type Err = Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" | "ls" => Ok(DockguardCommand::List),
            "deploy" | "up" => Ok(DockguardCommand::Deploy),
            "status" => Ok(DockguardCommand::Status),
            "plan" => Ok(DockguardCommand::Plan),
            "help" | "--help" | "-h" => Ok(DockguardCommand::Help),
            _ => Err(Report::msg(format!("Unknown command: {}", s))),
        }
    }
}

#[test]
fn test_arg_parse() {
    assert_eq!(
        DockguardArgs::parse(vec!["dockguard"].into_iter()).unwrap(),
        DockguardArgs::List
    );
    assert_eq!(
        DockguardArgs::parse(vec!["dockguard", "list"].into_iter()).unwrap(),
        DockguardArgs::List
    );
    assert_eq!(
        DockguardArgs::parse(vec!["dockguard", "deploy", "watchtower"].into_iter()).unwrap(),
        DockguardArgs::Deploy {
            names: vec!["watchtower".to_string()]
        }
    );
    assert_eq!(
        DockguardArgs::parse(vec!["dockguard", "watchtower", "nvidia-toolkit"].into_iter())
            .unwrap(),
        DockguardArgs::Deploy {
            names: vec!["watchtower".to_string(), "nvidia-toolkit".to_string()]
        }
    );
    assert_eq!(
        DockguardArgs::parse(vec!["dockguard", "status", "watchtower"].into_iter()).unwrap(),
        DockguardArgs::Status {
            name: "watchtower".to_string()
        }
    );
    assert_eq!(
        DockguardArgs::parse(vec!["dockguard", "plan", "nvidia-toolkit"].into_iter()).unwrap(),
        DockguardArgs::Plan {
            name: "nvidia-toolkit".to_string()
        }
    );
    assert_eq!(
        DockguardArgs::parse(vec!["dockguard", "--help"].into_iter()).unwrap(),
        DockguardArgs::Help
    );
}

#[test]
fn test_arg_parse_errors() {
    assert!(DockguardArgs::parse(vec!["dockguard", "deploy"].into_iter()).is_err());
    assert!(DockguardArgs::parse(vec!["dockguard", "status"].into_iter()).is_err());
    assert!(DockguardArgs::parse(vec!["dockguard", "status", "a", "b"].into_iter()).is_err());
    assert!(DockguardArgs::parse(vec!["dockguard", "list", "extra"].into_iter()).is_err());
    assert!(DockguardArgs::parse(vec!["dockguard", "--verbose"].into_iter()).is_err());
}
