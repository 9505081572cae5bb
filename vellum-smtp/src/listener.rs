//! Binds a socket and drives one [`Session`](crate::session::Session) per
//! accepted connection until a shutdown signal arrives.

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use vellum_common::{error::ListenerError, internal, traits::protocol::Protocol, Signal};

use crate::{config::EngineConfig, SmtpArgs, Smtp};

pub struct Listener {
    address: SocketAddr,
    config: Arc<EngineConfig>,
}

impl Listener {
    #[must_use]
    pub const fn new(address: SocketAddr, config: Arc<EngineConfig>) -> Self {
        Self { address, config }
    }

    /// Bind and accept connections until `shutdown` fires, then wait for all
    /// in-flight sessions to finish before returning.
    pub async fn serve(
        &self,
        shutdown: tokio::sync::broadcast::Sender<Signal>,
    ) -> Result<(), ListenerError> {
        if let Some(tls_context) = &self.config.tls_context {
            if !tls_context.certificate.exists() {
                return Err(ListenerError::BindFailed {
                    address: self.address.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("certificate not found: {}", tls_context.certificate.display()),
                    ),
                });
            }
            if !tls_context.key.exists() {
                return Err(ListenerError::BindFailed {
                    address: self.address.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("key not found: {}", tls_context.key.display()),
                    ),
                });
            }
        }

        let listener = TcpListener::bind(self.address)
            .await
            .map_err(|source| ListenerError::BindFailed {
                address: self.address.to_string(),
                source,
            })?;

        internal!("Listening on {}", self.address);

        let protocol = Smtp;
        let mut sessions = Vec::new();
        let mut signal = shutdown.subscribe();

        loop {
            tokio::select! {
                _ = signal.recv() => {
                    internal!("Listener on {} shutting down", self.address);
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted.map_err(ListenerError::AcceptFailed)?;
                    let args = SmtpArgs {
                        config: Arc::clone(&self.config),
                        shutdown: shutdown.clone(),
                    };
                    let session = protocol.handle(stream, peer, Default::default(), args);
                    sessions.push(tokio::spawn(async move {
                        if let Err(err) = session.run().await {
                            internal!(level = ERROR, "session with {peer} ended: {err}");
                        }
                    }));
                }
            }
        }

        futures_util::future::join_all(sessions).await;
        Ok(())
    }
}

impl From<(SocketAddr, Arc<EngineConfig>)> for Listener {
    fn from((address, config): (SocketAddr, Arc<EngineConfig>)) -> Self {
        Self::new(address, config)
    }
}
