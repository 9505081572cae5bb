//! Handler contract: the business-logic hooks the protocol engine calls out
//! to at each meaningful transition. Shaped after `empath-smtp`'s
//! `SmtpTransactionHandler`, but expressed as plain hook methods against the
//! session [`vellum_common::envelope::Envelope`] rather than a module-dispatch
//! system, since the FFI plugin layer is out of scope here.

use vellum_common::{envelope::Envelope, status::Status};

/// Outcome of a hook: either accept with the default response, accept with a
/// custom response, or reject with a specific status and message.
#[derive(Debug, Clone)]
pub enum HookResult {
    Accept,
    AcceptWith(Status, String),
    Reject(Status, String),
}

impl HookResult {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept | Self::AcceptWith(..))
    }
}

/// Business-logic hooks for an SMTP/LMTP session.
///
/// Every method has a default, accept-everything implementation so a handler
/// only needs to override the hooks it cares about.
#[allow(unused_variables)]
pub trait Hooks: Send + Sync {
    fn handle_connect(&self, peer: std::net::SocketAddr) -> HookResult {
        HookResult::Accept
    }

    fn handle_helo(&self, id: &str) -> HookResult {
        HookResult::Accept
    }

    fn handle_ehlo(&self, id: &str) -> HookResult {
        HookResult::Accept
    }

    fn handle_mail(&self, envelope: &Envelope) -> HookResult {
        HookResult::Accept
    }

    fn handle_rcpt(&self, envelope: &Envelope) -> HookResult {
        HookResult::Accept
    }

    fn handle_rset(&self) -> HookResult {
        HookResult::Accept
    }

    fn handle_data(&self, envelope: &Envelope) -> HookResult {
        HookResult::Accept
    }

    fn handle_starttls(&self) -> HookResult {
        HookResult::Accept
    }

    fn handle_auth(&self, mechanism: &str, authzid: &str) -> HookResult {
        HookResult::Reject(Status::AuthFailure, "authentication not configured".to_string())
    }

    fn handle_vrfy(&self, query: &str) -> HookResult {
        HookResult::Reject(Status::CannotVrfy, "VRFY not supported".to_string())
    }

    fn handle_expn(&self, query: &str) -> HookResult {
        HookResult::Reject(Status::CannotVrfy, "EXPN not supported".to_string())
    }

    fn handle_help(&self, topic: Option<&str>) -> HookResult {
        HookResult::AcceptWith(
            Status::HelpMessage,
            "see RFC 5321 for supported commands".to_string(),
        )
    }

    fn handle_noop(&self) -> HookResult {
        HookResult::Accept
    }

    fn handle_quit(&self) -> HookResult {
        HookResult::Accept
    }

    fn handle_exception(&self, reason: &str) -> HookResult {
        HookResult::Reject(Status::Error, reason.to_string())
    }
}

/// A [`Hooks`] implementation that accepts everything and implements no
/// authentication. Useful as a starting point and in tests.
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hooks_accept_mail_and_reject_auth() {
        let hooks = DefaultHooks;
        assert!(hooks.handle_mail(&Envelope::default()).is_accepted());
        assert!(!hooks.handle_auth("PLAIN", "").is_accepted());
    }
}
