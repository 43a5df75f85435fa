use bollard::image::CreateImageOptions;
use bollard::models::CreateImageInfo;
use bollard::Docker;
use futures_util::StreamExt;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::collections::HashMap;
use std::io::stdout;
use std::io::Write;
use termion::cursor;
use tracing::debug;

/// Pull an image unless it's already available locally.
///
/// When stdout is a terminal, per-layer progress is drawn in place.
pub async fn pull_image(docker: &Docker, image: &str) -> Result<()> {
    if docker.inspect_image(image).await.is_ok() {
        debug!(image, "image already present");
        return Ok(());
    }

    let mut info_stream = docker.create_image(
        Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        }),
        None,
        None,
    );

    let show_progress = atty::is(atty::Stream::Stdout);
    let mut bars: HashMap<String, u16> = HashMap::new();

    while let Some(info) = info_stream.next().await {
        let info: CreateImageInfo = info
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to pull image {}", image))?;
        if !show_progress {
            continue;
        }
        if let (Some(id), Some(status), Some(progress)) = (info.id, info.status, info.progress) {
            // the lock must not be held across the next await
            let mut stdout = stdout().lock();
            match bars.get(&id) {
                Some(pos) => {
                    let offset = bars.len() as u16 - pos;
                    write!(
                        stdout,
                        "{}{}{} - {:12} {}{}",
                        cursor::Save,
                        cursor::Up(offset),
                        id,
                        status,
                        progress,
                        cursor::Restore
                    )
                    .into_diagnostic()?;
                }
                None => {
                    writeln!(stdout, "{} - {:12} {}", id, status, progress).into_diagnostic()?;
                    bars.insert(id, bars.len() as u16);
                }
            }
            stdout.flush().into_diagnostic()?;
        }
    }
    debug!(image, "image pulled");
    Ok(())
}

#[test]
fn test_pull_future_is_send() {
    fn assert_send<T: Send>(_: &T) {}
    fn check(docker: &Docker) {
        let pull = pull_image(docker, "alpine");
        assert_send(&pull);
    }
    let _ = check;
}
