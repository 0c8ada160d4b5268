//! Tracing configuration and initialization.

use tracing_subscriber::{
    EnvFilter,
    fmt::format::FmtSpan,
    util::{SubscriberInitExt as _, TryInitError},
};

enum TrcMode {
    /// Plain, verbose rust logging with span events.
    Plain,
    /// Compact output without timestamps or targets.
    Compact,
}

pub struct Trc {
    mode: TrcMode,
    env_filter: EnvFilter,
}

impl Default for Trc {
    fn default() -> Self {
        let maybe_env_filter =
            EnvFilter::try_from_env("SCURRY_LOG").or_else(|_| EnvFilter::try_from_default_env());

        match maybe_env_filter {
            Ok(env_filter) => Self {
                // An explicit filter usually means someone is debugging, so give them everything.
                mode: TrcMode::Plain,
                env_filter,
            },
            Err(_) => Self {
                mode: TrcMode::Compact,
                env_filter: EnvFilter::new("info"),
            },
        }
    }
}

impl Trc {
    pub fn init(self) -> Result<(), TryInitError> {
        match self.mode {
            TrcMode::Plain => tracing_subscriber::fmt()
                .with_env_filter(self.env_filter)
                .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE)
                .with_writer(std::io::stderr)
                .finish()
                .try_init(),
            TrcMode::Compact => tracing_subscriber::fmt()
                .with_env_filter(self.env_filter)
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr)
                .compact()
                .finish()
                .try_init(),
        }
    }
}
