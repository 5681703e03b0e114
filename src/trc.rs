//! Tracing configuration and initialization.

use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{
    EnvFilter,
    fmt::format::FmtSpan,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

/// Environment variable holding an `EnvFilter` directive.
const LOG_ENV: &str = "MEDIA_FS_LOG";

enum TrcMode {
    /// Plain, verbose output. Chosen when the user supplied a filter.
    Plain,
    /// Compact output with progress spinners.
    Pretty,
    /// Plain output without ANSI colors, for a log file.
    Daemon,
}

pub struct Trc {
    mode: TrcMode,
    env_filter: EnvFilter,
}

impl Default for Trc {
    fn default() -> Self {
        let maybe_env_filter =
            EnvFilter::try_from_env(LOG_ENV).or_else(|_| EnvFilter::try_from_default_env());

        match maybe_env_filter {
            // A hand-written filter means someone is debugging; skip the spinners.
            Ok(env_filter) => Self {
                mode: TrcMode::Plain,
                env_filter,
            },
            Err(_) => Self {
                mode: TrcMode::Pretty,
                env_filter: EnvFilter::new("info"),
            },
        }
    }
}

impl Trc {
    /// Switch to log-file output when the process is about to detach.
    #[must_use]
    pub fn daemonized(mut self, daemonized: bool) -> Self {
        if daemonized {
            self.mode = TrcMode::Daemon;
        }
        self
    }

    pub fn init(self) -> Result<(), TryInitError> {
        match self.mode {
            TrcMode::Plain => self.init_plain_mode(true),
            TrcMode::Daemon => self.init_plain_mode(false),
            TrcMode::Pretty => self.init_pretty_mode(),
        }
    }

    fn init_plain_mode(self, ansi: bool) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(self.env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(ansi)
                    .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE),
            )
            .try_init()
    }

    fn init_pretty_mode(self) -> Result<(), TryInitError> {
        let indicatif_layer = IndicatifLayer::new();
        tracing_subscriber::registry()
            .with(self.env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(indicatif_layer.get_stderr_writer())
                    .with_target(false)
                    .without_time()
                    .compact(),
            )
            .with(indicatif_layer)
            .try_init()
    }
}
