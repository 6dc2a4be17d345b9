//! Structured logging setup for binaries and tests using kitsune futures.
//!
//! Futures emit `tracing` events on their transitions: `trace` on
//! completion, `debug` on cancellation, `warn` on slow listeners and losing
//! deferred writers, `error` when a listener panics. Nothing is printed
//! until a subscriber is installed, e.g. with [`init_fmt`].
//!
//! ```bash
//! RUST_LOG=kitsune_p2p_future=trace my_bin
//! ```

use derive_more::Display;
use std::str::FromStr;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{
        format::{DefaultFields, Format},
        MakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer, Registry,
};

/// Sets the kind of structured logging output you want
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum Output {
    /// Regular logging (default)
    #[default]
    Log,
    /// More compact version of above
    Compact,
    /// Outputs everything as json
    Json,
    /// No logging to console
    None,
}

impl FromStr for Output {
    type Err = TracingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Log" => Ok(Output::Log),
            "Compact" => Ok(Output::Compact),
            "Json" => Ok(Output::Json),
            "None" => Ok(Output::None),
            oth => Err(TracingError::UnknownOutput(oth.to_string())),
        }
    }
}

/// Error in the tracing/logging setup
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error(transparent)]
    TryInit(#[from] tracing_subscriber::util::TryInitError),
    #[error(transparent)]
    BadDirective(#[from] tracing_subscriber::filter::ParseError),
    #[error("could not parse log output type: {0}")]
    UnknownOutput(String),
}

/// Run logging in a unit test.
///
/// RUST_LOG must be set or this is a no-op.
pub fn test_run() -> Result<(), TracingError> {
    if std::env::var_os("RUST_LOG").is_none() {
        return Ok(());
    }

    init_fmt(Output::Log)
}

/// Build the canonical filter based on env.
///
/// Without RUST_LOG, warnings from this crate still get through, so
/// listener panics and slow listeners are never silent.
pub fn standard_filter() -> Result<EnvFilter, TracingError> {
    let mut filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => {
            EnvFilter::from_default_env().add_directive("kitsune_p2p_future=warn".parse()?)
        }
    };
    if std::env::var("CUSTOM_FILTER").is_ok() {
        EnvFilter::try_from_env("CUSTOM_FILTER")
            .map_err(|e| eprintln!("Failed to parse CUSTOM_FILTER {:?}", e))
            .map(|f| {
                filter = f;
            })
            .ok();
    }
    Ok(filter)
}

/// The fmt layer every [`Output`] builds on, before filtering.
pub fn standard_layer_unfiltered<W, S>(
    writer: W,
) -> tracing_subscriber::fmt::Layer<S, DefaultFields, Format, W>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    S: Subscriber + Send + Sync + for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::Layer::default()
        .with_writer(writer)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
}

/// Install a global subscriber logging to stderr.
///
/// This checks RUST_LOG for a filter but doesn't complain if there is none.
/// It then checks for CUSTOM_FILTER which if set will output an error if it
/// doesn't parse. Fails if a global subscriber is already installed.
pub fn init_fmt(output: Output) -> Result<(), TracingError> {
    init_fmt_with_writer(output, std::io::stderr)
}

fn init_fmt_with_writer<W>(output: Output, writer: W) -> Result<(), TracingError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = standard_filter()?;

    match output {
        Output::Log => Registry::default()
            .with(standard_layer_unfiltered(writer).with_filter(filter))
            .try_init()?,
        Output::Compact => Registry::default()
            .with(
                standard_layer_unfiltered(writer)
                    .compact()
                    .with_filter(filter),
            )
            .try_init()?,
        Output::Json => Registry::default()
            .with(standard_layer_unfiltered(writer).json().with_filter(filter))
            .try_init()?,
        Output::None => (),
    }
    Ok(())
}
