//! Runs a set of [`Listener`]s to completion, forwarding one shutdown signal
//! to all of them.

use vellum_common::Signal;

use crate::listener::Listener;

pub struct Server {
    listeners: Vec<Listener>,
}

impl Server {
    #[must_use]
    pub const fn new(listeners: Vec<Listener>) -> Self {
        Self { listeners }
    }

    /// Serve every listener concurrently until `shutdown` fires.
    pub async fn serve(
        &self,
        shutdown: tokio::sync::broadcast::Sender<Signal>,
    ) -> Result<(), vellum_common::error::ListenerError> {
        let results = futures_util::future::join_all(
            self.listeners.iter().map(|listener| listener.serve(shutdown.clone())),
        )
        .await;

        for result in results {
            result?;
        }
        Ok(())
    }
}
