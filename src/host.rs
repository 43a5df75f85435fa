use camino::Utf8Path;
use miette::{IntoDiagnostic, Report, Result, WrapErr};
use std::process::Stdio;
use tokio::fs::{create_dir_all, write};
use tokio::process::Command;
use tracing::debug;

/// Access to the machine dockguard runs on: processes, downloads and files.
#[async_trait::async_trait]
pub trait Host: Send + Sync {
    fn is_elevated(&self) -> bool;

    /// Run a command with inherited stdio and wait for it to exit
    async fn run(&self, program: &str, args: &[String]) -> Result<ExitCode>;

    /// Run a command and collect its stdout
    async fn capture(&self, program: &str, args: &[String]) -> Result<Captured>;

    async fn fetch(&self, url: &str) -> Result<String>;

    async fn write_file(&self, path: &Utf8Path, content: &str) -> Result<()>;
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Captured {
    pub code: ExitCode,
    pub stdout: String,
}

#[derive(Default)]
pub struct SystemHost {
    client: reqwest::Client,
}

#[async_trait::async_trait]
impl Host for SystemHost {
    fn is_elevated(&self) -> bool {
        // SAFETY: geteuid has no preconditions and can't fail
        unsafe { libc::geteuid() == 0 }
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<ExitCode> {
        debug!(program, ?args, "running command");
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to run {}", program))?;
        Ok(status.code().map(i64::from).unwrap_or(-1).into())
    }

    async fn capture(&self, program: &str, args: &[String]) -> Result<Captured> {
        debug!(program, ?args, "capturing command output");
        let output = Command::new(program)
            .args(args)
            .stderr(Stdio::null())
            .output()
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to run {}", program))?;
        Ok(Captured {
            code: output.status.code().map(i64::from).unwrap_or(-1).into(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        debug!(url, "downloading");
        self.client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to download {}", url))?
            .text()
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read response from {}", url))
    }

    async fn write_file(&self, path: &Utf8Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)
                .await
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to create directory {}", parent))?;
        }
        write(path, content)
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to write {}", path))
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ExitCode(i64);

impl ExitCode {
    pub fn success(&self) -> bool {
        self.0 == 0
    }

    pub fn to_result(&self) -> Result<()> {
        match self.0 {
            0 => Ok(()),
            code => Err(Report::msg(format!(
                "Command failed with exit code {}",
                code
            ))),
        }
    }
}

impl From<i64> for ExitCode {
    fn from(code: i64) -> Self {
        ExitCode(code)
    }
}

#[test]
fn test_exit_code() {
    assert!(ExitCode::from(0).success());
    assert!(ExitCode::from(0).to_result().is_ok());
    let err = ExitCode::from(100).to_result().unwrap_err();
    assert_eq!(err.to_string(), "Command failed with exit code 100");
}
