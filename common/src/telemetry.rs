use tokio::task::JoinHandle;
use tracing::subscriber::set_global_default;
use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry};

use crate::helper::error_chain_fmt;

/// Composes the layers of our `tracing` Subscriber.
///
/// Spans and events are filtered with `RUST_LOG` (or `fallback_env_filter` when it is not set),
/// their fields are stored by `JsonStorageLayer` so that children spans inherit the context
/// of their parents, and they are finally written as bunyan-compatible JSON lines to `sink`.
///
/// # Arguments
/// - `name`: name of the app, added to every log line
/// - `fallback_env_filter`: filter level for traces if RUST_LOG env variable has not been set
/// - `sink`: to what the traces will be outputted
///
/// # Returns
/// `impl Subscriber` to avoid spelling out the layered type, which is quite complex.
pub fn get_tracing_subscriber<Sink>(
    name: String,
    fallback_env_filter: String,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    // The sink implements `MakeWriter` for all choices of the lifetime `'a`
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_env_filter));

    let formatting_layer = BunyanFormattingLayer::new(name, sink);

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

/// Registers a tracing Subscriber as the global default to process span data.
///
/// Also redirects the `log` records emitted by our dependencies (lapin, rust-s3)
/// to this subscriber.
///
/// It should only be called once: a second call returns an error.
pub fn init_tracing_subscriber(
    subscriber: impl Subscriber + Send + Sync,
) -> Result<(), TelemetryError> {
    LogTracer::init()?;
    set_global_default(subscriber)?;

    Ok(())
}

/// Runs a blocking closure on tokio's blocking pool, inside the span of the caller
pub fn spawn_blocking_with_tracing<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let current_span = tracing::Span::current();
    tokio::task::spawn_blocking(move || current_span.in_scope(f))
}

#[derive(thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to redirect log records to tracing")]
    LogTracer(#[from] tracing_log::log::SetLoggerError),
    #[error("Failed to set the global tracing subscriber")]
    GlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

impl std::fmt::Debug for TelemetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
