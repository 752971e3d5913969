use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Audit lines share the destination and are
/// told apart by the `audit` target.
pub fn init(log_file: &Path, to_stderr: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if to_stderr {
        return install(subscriber(filter, std::io::stderr));
    }

    if let Some(parent) = log_file.parent() {
        if !parent.as_os_str().is_empty() {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o700);
            }
            builder
                .create(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
    }

    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o640);
    }
    let file = options
        .open(log_file)
        .with_context(|| format!("opening log file {}", log_file.display()))?;

    install(subscriber(filter, Mutex::new(file)))?;
    tracing::info!(path = %log_file.display(), "logging initialized");
    Ok(())
}

/// Plain-text formatter shared by every destination.
fn subscriber<W>(filter: EnvFilter, writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_writer(writer)
        .finish()
}

fn install(subscriber: impl tracing::Subscriber + Send + Sync + 'static) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber).context("installing log subscriber")
}
