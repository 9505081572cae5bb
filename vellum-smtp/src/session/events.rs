//! Hook dispatch: translate a freshly-entered protocol state into a business
//! decision via [`Hooks`], updating the session envelope along the way.

use std::net::SocketAddr;

use vellum_common::{envelope::Envelope, status::Status};

use crate::{
    config::EngineConfig,
    hooks::{HookResult, Hooks},
    state::{State, TransitionContext},
};

pub(crate) struct Outcome {
    pub status: Status,
    pub lines: Vec<String>,
    pub close: bool,
}

impl Outcome {
    fn accept(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            lines: vec![message.into()],
            close: false,
        }
    }

    fn accept_multi(status: Status, lines: Vec<String>) -> Self {
        Self {
            status,
            lines,
            close: false,
        }
    }

    fn reject(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            lines: vec![message.into()],
            close: false,
        }
    }
}

/// Build the capability lines advertised after `EHLO`, in the order spec'd
/// by RFC 5321/1870/6152/6531/3207/4954/3030.
fn ehlo_capabilities(config: &EngineConfig, ctx: &TransitionContext) -> Vec<String> {
    let mut lines = vec![config.hostname.to_string()];

    if config.data_size_limit > 0 {
        lines.push(format!("SIZE {}", config.data_size_limit));
    }
    lines.push("8BITMIME".to_string());
    if config.enable_smtputf8 {
        lines.push("SMTPUTF8".to_string());
    }
    if config.tls_context.is_some() && !ctx.tls_active {
        lines.push("STARTTLS".to_string());
    }
    if !ctx.authenticated && (ctx.tls_active || !ctx.auth_require_tls) {
        let mechanisms: Vec<&str> = ["PLAIN", "LOGIN"]
            .into_iter()
            .filter(|m| !config.auth_exclude_mechanism.iter().any(|excluded| excluded.eq_ignore_ascii_case(m)))
            .collect();
        if !mechanisms.is_empty() {
            lines.push(format!("AUTH {}", mechanisms.join(" ")));
        }
    }
    if config.chunking {
        lines.push("CHUNKING".to_string());
    }
    lines.push("PIPELINING".to_string());
    lines.push("HELP".to_string());
    lines
}

/// Synchronize `envelope` with a freshly-entered state, call the matching
/// hook, and translate the result into a response.
pub(crate) fn dispatch(
    handler: &dyn Hooks,
    peer: SocketAddr,
    state: &State,
    envelope: &mut Envelope,
    config: &EngineConfig,
    ctx: &TransitionContext,
) -> Outcome {
    match state {
        State::Connect(_) => match handler.handle_connect(peer) {
            HookResult::Reject(status, message) => Outcome::reject(status, message),
            _ => Outcome::accept(Status::ServiceReady, "ready"),
        },
        State::Ehlo(ehlo) => match handler.handle_ehlo(&ehlo.id) {
            HookResult::Reject(status, message) => Outcome::reject(status, message),
            HookResult::AcceptWith(status, message) => Outcome::accept(status, message),
            HookResult::Accept => Outcome::accept_multi(Status::Ok, ehlo_capabilities(config, ctx)),
        },
        State::Helo(helo) | State::Lhlo(helo) => match handler.handle_helo(&helo.id) {
            HookResult::Reject(status, message) => Outcome::reject(status, message),
            HookResult::AcceptWith(status, message) => Outcome::accept(status, message),
            HookResult::Accept => Outcome::accept(Status::Ok, config.hostname.to_string()),
        },
        State::StartTls(_) => match handler.handle_starttls() {
            HookResult::Reject(status, message) => Outcome::reject(status, message),
            _ => Outcome::accept(Status::ServiceReady, "ready to start TLS"),
        },
        State::Help(_) => match handler.handle_help(None) {
            HookResult::AcceptWith(status, message) => Outcome::accept(status, message),
            HookResult::Reject(status, message) => Outcome::reject(status, message),
            HookResult::Accept => Outcome::accept(Status::HelpMessage, "ok"),
        },
        State::Rset(_) => {
            *envelope = Envelope::default();
            match handler.handle_rset() {
                HookResult::AcceptWith(status, message) => Outcome::accept(status, message),
                HookResult::Reject(status, message) => Outcome::reject(status, message),
                HookResult::Accept => Outcome::accept(Status::Ok, "Ok"),
            }
        }
        State::Vrfy(vrfy) => match handler.handle_vrfy(&vrfy.query) {
            HookResult::AcceptWith(status, message) => Outcome::accept(status, message),
            HookResult::Reject(status, message) => Outcome::reject(status, message),
            HookResult::Accept => Outcome::accept(Status::Ok, vrfy.query.clone()),
        },
        State::Expn(expn) => match handler.handle_expn(&expn.query) {
            HookResult::AcceptWith(status, message) => Outcome::accept(status, message),
            HookResult::Reject(status, message) => Outcome::reject(status, message),
            HookResult::Accept => Outcome::accept(Status::Ok, expn.query.clone()),
        },
        State::MailFrom(mail_from) => {
            *envelope = Envelope::default();
            *envelope.mail_from_mut() = mail_from.sender.clone();
            envelope.set_smtp_utf8(mail_from.params.smtp_utf8());
            match handler.handle_mail(envelope) {
                HookResult::Reject(status, message) => Outcome::reject(status, message),
                HookResult::AcceptWith(status, message) => Outcome::accept(status, message),
                HookResult::Accept => Outcome::accept(Status::Ok, "Ok"),
            }
        }
        State::RcptTo(rcpt_to) => {
            envelope.rcpt_tos_mut().0.clone_from(&rcpt_to.recipients.0);
            match handler.handle_rcpt(envelope) {
                HookResult::Reject(status, message) => Outcome::reject(status, message),
                HookResult::AcceptWith(status, message) => Outcome::accept(status, message),
                HookResult::Accept => Outcome::accept(Status::Ok, "Ok"),
            }
        }
        State::Data(_) => Outcome::accept(Status::StartMailInput, "Start mail input; end with <CRLF>.<CRLF>"),
        State::PostDot(_) => match handler.handle_data(envelope) {
            HookResult::Reject(status, message) => Outcome::reject(status, message),
            HookResult::AcceptWith(status, message) => Outcome::accept(status, message),
            HookResult::Accept => Outcome::accept(Status::Ok, "Ok: queued"),
        },
        State::AuthInProgress(auth_state) => {
            let message = if auth_state.mechanism.eq_ignore_ascii_case("LOGIN") {
                super::auth::encode_challenge("Username:")
            } else {
                String::new()
            };
            Outcome {
                status: Status::Continue,
                lines: vec![message],
                close: false,
            }
        }
        State::Quit(_) => {
            let _ = handler.handle_quit();
            Outcome {
                status: Status::GoodBye,
                lines: vec!["Bye".to_string()],
                close: true,
            }
        }
        State::Close(_) => Outcome {
            status: Status::Unavailable,
            lines: vec!["Server shutting down".to_string()],
            close: true,
        },
        State::Invalid(invalid) => Outcome::reject(Status::InvalidCommandSequence, invalid.reason.clone()),
        State::Reject(_) => Outcome::reject(Status::Error, "rejected"),
        State::Reading(_) => Outcome::accept(Status::Ok, "Ok"),
    }
}
