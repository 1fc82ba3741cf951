//! Subscriber setup for the command-line front end
//!
//! The library only emits `tracing` events; binaries decide where they go.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Formatting of emitted events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Colored single-line output
    #[default]
    Console,
    /// Uncolored output for CI logs
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Destination of emitted events
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TracingOutput {
    /// stderr
    #[default]
    Console,
    /// Append to a log file; console output is left to the progress bar
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
}

/// Keeps background log writers alive; flushes when dropped
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

#[derive(Debug, Default)]
pub struct TracingConfig {
    /// `-v` count
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Explicit filter directive; wins over `RUST_LOG` and verbosity
    pub env_filter: Option<String>,
    /// Logged once at startup for correlating runs
    pub session_id: Option<String>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directive for the configured verbosity
    ///
    /// Dependencies stay at `warn` until `-vvv`.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn,bgremove_studio=info",
            1 => "warn,bgremove_studio=debug",
            2 => "warn,bgremove_studio=trace",
            _ => "trace",
        }
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        if let Some(directive) = &self.env_filter {
            return Ok(EnvFilter::try_new(directive)?);
        }
        if self.verbosity == 0 {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        Ok(EnvFilter::try_new(self.verbosity_to_filter())?)
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive or a subscriber is already installed
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        let registry = Registry::default().with(self.filter()?);
        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        match &self.output {
            TracingOutput::Console => match self.format {
                TracingFormat::Console => registry
                    .with(
                        fmt::layer()
                            .with_writer(std::io::stderr)
                            .with_ansi(true)
                            .with_target(false)
                            .compact(),
                    )
                    .try_init()?,
                TracingFormat::Compact => registry
                    .with(
                        fmt::layer()
                            .with_writer(std::io::stderr)
                            .with_ansi(false)
                            .with_target(false)
                            .compact(),
                    )
                    .try_init()?,
                #[cfg(feature = "tracing-json")]
                TracingFormat::Json => registry
                    .with(
                        fmt::layer()
                            .json()
                            .with_writer(std::io::stderr)
                            .with_current_span(true)
                            .with_span_list(true),
                    )
                    .try_init()?,
            },

            #[cfg(feature = "tracing-files")]
            TracingOutput::File(path) => {
                use tracing_appender::{non_blocking, rolling};

                let directory = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| std::path::Path::new("."));
                let file_name = path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("bgremove-studio.log"));
                let (writer, file_guard) = non_blocking(rolling::never(directory, file_name));
                guard._file = Some(file_guard);

                match self.format {
                    TracingFormat::Console | TracingFormat::Compact => registry
                        .with(fmt::layer().with_ansi(false).with_writer(writer).compact())
                        .try_init()?,
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => registry
                        .with(
                            fmt::layer()
                                .json()
                                .with_writer(writer)
                                .with_current_span(true)
                                .with_span_list(true),
                        )
                        .try_init()?,
                }
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "Session started");
        }

        Ok(guard)
    }
}

/// Console tracing with the CLI's defaults
///
/// # Errors
/// - A subscriber is already installed
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<TracingGuard> {
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_session_id(uuid::Uuid::new_v4().to_string())
        .init()
}
