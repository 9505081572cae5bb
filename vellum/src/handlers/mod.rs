//! A minimal, stdout-logging [`Hooks`] implementation, standing in for the
//! module-dispatch handler `empath-smtp` delegates to its FFI layer. This one
//! just accepts everything and logs the envelope once a message is queued.

use vellum_common::{envelope::Envelope, internal, status::Status};
use vellum_smtp::{HookResult, Hooks};

/// Accepts every transaction and logs the envelope at `DATA` time.
pub struct LoggingHooks;

impl Hooks for LoggingHooks {
    fn handle_connect(&self, peer: std::net::SocketAddr) -> HookResult {
        internal!("connection from {peer}");
        HookResult::Accept
    }

    fn handle_data(&self, envelope: &Envelope) -> HookResult {
        internal!(
            "queued message from {:?} to {} recipient(s)",
            envelope.mail_from(),
            envelope.rcpt_tos().0.len()
        );
        HookResult::AcceptWith(Status::Ok, "queued".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_connect_and_data() {
        let hooks = LoggingHooks;
        let addr: std::net::SocketAddr = "127.0.0.1:2525".parse().unwrap();
        assert!(hooks.handle_connect(addr).is_accepted());
        assert!(hooks.handle_data(&Envelope::default()).is_accepted());
    }
}
