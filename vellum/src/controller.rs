//! Top-level configuration and run loop, grounded in `empath`'s
//! `controller::Empath`, trimmed to this crate's single protocol and
//! dropping the FFI module-dispatch / spool / delivery pipelines that are
//! out of scope here.

use std::{net::SocketAddr, sync::Arc, sync::LazyLock};

use serde::Deserialize;
use tokio::sync::broadcast;
use vellum_common::{internal, tracing, Signal};
use vellum_smtp::{
    config::{EngineConfig, ServerTimeouts, TlsContext},
    hooks::Hooks,
    listener::Listener,
    server::Server,
};
use vellum_tracing::traced;

use crate::handlers::LoggingHooks;

#[derive(Deserialize)]
pub struct Vellum {
    #[serde(alias = "listener")]
    listeners: Vec<SocketAddr>,
    #[serde(default = "default_hostname")]
    hostname: String,
    #[serde(default = "default_ident")]
    ident: String,
    #[serde(default)]
    tls: Option<TlsContext>,
    #[serde(default)]
    require_starttls: bool,
    #[serde(default)]
    auth_required: bool,
    #[serde(default = "default_true")]
    auth_require_tls: bool,
    #[serde(default)]
    chunking: bool,
    #[serde(default)]
    lmtp: bool,
    #[serde(default)]
    data_size_limit: usize,
    #[serde(default = "default_true")]
    smtputf8: bool,
    #[serde(default)]
    timeouts: ServerTimeouts,
}

fn default_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_ident() -> String {
    "vellum".to_string()
}

const fn default_true() -> bool {
    true
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[traced(instrument(level = tracing::Level::TRACE))]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    Ok(())
}

impl Vellum {
    /// Run the configured listeners until a shutdown signal arrives.
    ///
    /// # Errors
    /// Returns an error if the engine configuration is invalid, or if any
    /// listener fails to bind.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, err), timing(precision = "s"))]
    pub async fn run(self) -> anyhow::Result<()> {
        vellum_common::logging::init();
        internal!("Controller running");

        let handler: Arc<dyn Hooks> = Arc::new(LoggingHooks);
        let engine_config = Arc::new(
            EngineConfig::builder(handler)
                .with_hostname(self.hostname)
                .with_ident(self.ident)
                .with_tls_context(self.tls)
                .with_require_starttls(self.require_starttls)
                .with_auth_required(self.auth_required)
                .with_auth_require_tls(self.auth_require_tls)
                .with_chunking(self.chunking)
                .with_lmtp(self.lmtp)
                .with_data_size_limit(self.data_size_limit)
                .with_smtputf8(self.smtputf8)
                .with_timeouts(self.timeouts)
                .build()?,
        );

        let listeners = self
            .listeners
            .into_iter()
            .map(|address| Listener::new(address, Arc::clone(&engine_config)))
            .collect();
        let server = Server::new(listeners);

        let result = tokio::select! {
            r = server.serve(SHUTDOWN_BROADCAST.clone()) => r.map_err(Into::into),
            r = shutdown() => r,
        };

        internal!("Shutting down...");
        result
    }
}
