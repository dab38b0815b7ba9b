//! Activity and error log sinks.
//!
//! Every component receives a [`LogContext`] at construction time instead of
//! relying on a process-wide subscriber. Informational messages land in the
//! activity log; warnings and errors land in both the activity log and the
//! error log.

use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

pub const ACTIVITY_LOG: &str = "activity.log";
pub const ERROR_LOG: &str = "errors.log";

#[derive(Clone)]
pub struct LogContext {
    activity: Dispatch,
    errors: Dispatch,
}

impl LogContext {
    /// Open (append) `activity.log` and `errors.log` under `logs_dir`,
    /// optionally echoing activity to stderr.
    pub fn open(logs_dir: &Path, echo_to_stderr: bool) -> std::io::Result<Self> {
        fs::create_dir_all(logs_dir)?;
        let activity_file = open_append(&logs_dir.join(ACTIVITY_LOG))?;
        let error_file = open_append(&logs_dir.join(ERROR_LOG))?;

        let stderr_layer = echo_to_stderr.then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(LevelFilter::INFO)
        });

        let activity = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(Mutex::new(activity_file))
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(LevelFilter::INFO),
            )
            .with(stderr_layer);

        let errors = tracing_subscriber::registry().with(
            fmt::layer()
                .with_writer(Mutex::new(error_file))
                .with_ansi(false)
                .with_target(false)
                .with_filter(LevelFilter::WARN),
        );

        Ok(Self {
            activity: Dispatch::new(activity),
            errors: Dispatch::new(errors),
        })
    }

    /// Discards everything.
    pub fn silent() -> Self {
        Self {
            activity: Dispatch::none(),
            errors: Dispatch::none(),
        }
    }

    pub fn debug(&self, message: impl Display) {
        tracing::dispatcher::with_default(&self.activity, || tracing::debug!("{}", message));
    }

    pub fn info(&self, message: impl Display) {
        tracing::dispatcher::with_default(&self.activity, || tracing::info!("{}", message));
    }

    pub fn warn(&self, message: impl Display) {
        tracing::dispatcher::with_default(&self.activity, || tracing::warn!("{}", message));
        tracing::dispatcher::with_default(&self.errors, || tracing::warn!("{}", message));
    }

    pub fn error(&self, message: impl Display) {
        tracing::dispatcher::with_default(&self.activity, || tracing::error!("{}", message));
        tracing::dispatcher::with_default(&self.errors, || tracing::error!("{}", message));
    }
}

impl std::fmt::Debug for LogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogContext").finish_non_exhaustive()
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
