//! Type-safe SMTP session state machine.
//!
//! Each state is a distinct marker type implementing the sealed `SessionState`
//! trait; transitions are exhaustively matched in [`State::transition`] so an
//! invalid command in a given state can only ever produce `Invalid`.

use serde::Deserialize;
use vellum_common::address::{Address, AddressList};

use crate::command::{Command, HeloVariant, MailParameters};

mod sealed {
    pub trait Sealed {}
}

pub trait SessionState: sealed::Sealed {}

macro_rules! state {
    ($name:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
        pub struct $name {
            $(pub $field: $ty),*
        }

        impl sealed::Sealed for $name {}
        impl SessionState for $name {}
    };
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
        pub struct $name;

        impl sealed::Sealed for $name {}
        impl SessionState for $name {}
    };
}

state!(Connect);
state!(Ehlo { id: String });
state!(Helo { id: String });
state!(Lhlo { id: String });
state!(StartTls);
state!(Help);
state!(Rset);
state!(Vrfy { query: String });
state!(Expn { query: String });
state!(AuthInProgress { mechanism: String });
state!(MailFrom {
    sender: Option<Address>,
    params: MailParameters,
});
state!(RcptTo {
    sender: Option<Address>,
    recipients: AddressList,
    params: MailParameters,
});
state!(Data);
state!(Reading { chunks: Vec<Vec<u8>> });
state!(PostDot);
state!(Quit);
state!(Close);
state!(Invalid { reason: String });
state!(Reject);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum State {
    Connect(Connect),
    Ehlo(Ehlo),
    Helo(Helo),
    Lhlo(Lhlo),
    StartTls(StartTls),
    Help(Help),
    Rset(Rset),
    Vrfy(Vrfy),
    Expn(Expn),
    AuthInProgress(AuthInProgress),
    MailFrom(MailFrom),
    RcptTo(RcptTo),
    Data(Data),
    Reading(Reading),
    PostDot(PostDot),
    Quit(Quit),
    Close(Close),
    Invalid(Invalid),
    Reject(Reject),
}

impl Default for State {
    fn default() -> Self {
        Self::Connect(Connect)
    }
}

/// Context carried alongside a transition: whether the client greeted with
/// EHLO (extended) vs HELO, whether STARTTLS has already been negotiated,
/// whether AUTH is required before mail transactions, and whether AUTH
/// has already completed successfully.
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    pub extended: bool,
    pub tls_active: bool,
    pub require_starttls: bool,
    pub auth_required: bool,
    pub auth_require_tls: bool,
    pub authenticated: bool,
    /// Set once the client has completed a HELO/EHLO/LHLO. RSET before this
    /// point must not be allowed to forge a greeted state.
    pub greeted: bool,
}

impl State {
    #[must_use]
    pub fn transition(self, command: Command, ctx: &TransitionContext) -> Self {
        match (self, command) {
            (Self::Connect(_), Command::Helo(HeloVariant::Ehlo(id))) => {
                Self::Ehlo(Ehlo { id })
            }
            (Self::Connect(_), Command::Helo(HeloVariant::Helo(id))) => {
                Self::Helo(Helo { id })
            }
            (Self::Connect(_), Command::Helo(HeloVariant::Lhlo(id))) => {
                Self::Lhlo(Lhlo { id })
            }

            (Self::Ehlo(_) | Self::Helo(_) | Self::Lhlo(_), Command::StartTls)
                if !ctx.tls_active =>
            {
                Self::StartTls(StartTls)
            }
            (Self::MailFrom(_) | Self::RcptTo(_), Command::StartTls) => Self::Invalid(Invalid {
                reason: "STARTTLS not permitted mid-transaction".to_string(),
            }),

            (
                Self::Connect(_) | Self::Ehlo(_) | Self::Helo(_) | Self::Lhlo(_),
                Command::Help(_),
            ) => Self::Help(Help),

            (Self::Ehlo(_) | Self::Helo(_) | Self::Lhlo(_), Command::Vrfy(query)) => {
                Self::Vrfy(Vrfy { query })
            }
            (Self::Ehlo(_) | Self::Helo(_) | Self::Lhlo(_), Command::Expn(query)) => {
                Self::Expn(Expn { query })
            }

            (Self::Ehlo(_) | Self::Helo(_) | Self::Lhlo(_), Command::Auth { .. })
                if ctx.authenticated =>
            {
                Self::Invalid(Invalid {
                    reason: "already authenticated".to_string(),
                })
            }
            (Self::Ehlo(_) | Self::Helo(_) | Self::Lhlo(_), Command::Auth { mechanism, .. })
                if ctx.tls_active || !ctx.auth_require_tls =>
            {
                Self::AuthInProgress(AuthInProgress { mechanism })
            }
            (Self::Ehlo(_) | Self::Helo(_) | Self::Lhlo(_), Command::Auth { .. }) => {
                Self::Invalid(Invalid {
                    reason: "AUTH requires an encrypted channel".to_string(),
                })
            }
            (Self::AuthInProgress(state), Command::AuthContinuation(_)) => {
                Self::AuthInProgress(state)
            }

            (
                Self::Ehlo(_) | Self::Helo(_) | Self::Lhlo(_) | Self::StartTls(_) | Self::Help(_)
                | Self::AuthInProgress(_) | Self::PostDot(_),
                Command::MailFrom(sender, params),
            ) if !ctx.require_starttls || ctx.tls_active => {
                if ctx.auth_required && !ctx.authenticated {
                    Self::Invalid(Invalid {
                        reason: "authentication required".to_string(),
                    })
                } else {
                    Self::MailFrom(MailFrom { sender, params })
                }
            }
            (
                Self::Ehlo(_) | Self::Helo(_) | Self::Lhlo(_) | Self::StartTls(_) | Self::Help(_)
                | Self::PostDot(_),
                Command::MailFrom(..),
            ) => Self::Invalid(Invalid {
                reason: "must issue STARTTLS before MAIL".to_string(),
            }),

            (Self::MailFrom(state), Command::RcptTo(recipients, params)) => {
                Self::RcptTo(RcptTo {
                    sender: state.sender,
                    recipients,
                    params,
                })
            }
            (Self::RcptTo(mut state), Command::RcptTo(recipients, _)) => {
                state.recipients.extend_from_slice(&recipients[..]);
                Self::RcptTo(state)
            }

            (Self::RcptTo(_), Command::Data) => Self::Data(Data),
            (Self::RcptTo(_), Command::Bdat { .. }) => Self::Reading(Reading::default()),
            (Self::Reading(_), Command::Bdat { .. }) => Self::Reading(Reading::default()),
            // Unreachable via the session's own command loop (classic DATA
            // consumes all following lines as message body, never as
            // commands), kept so the rule holds if that routing ever changes.
            (Self::Data(_), Command::Bdat { .. }) => Self::Invalid(Invalid {
                reason: "DATA and BDAT cannot be combined".to_string(),
            }),
            (Self::Reading(_), Command::Data) => Self::Invalid(Invalid {
                reason: "DATA and BDAT cannot be combined".to_string(),
            }),

            (_, Command::Rset) => Self::Rset(Rset),
            (_, Command::Quit) => Self::Quit(Quit),
            (state, Command::Noop(_)) => state,

            (_state, invalid) => Self::Invalid(Invalid {
                reason: format!("command not permitted in current state: {invalid:?}"),
            }),
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Invalid(_) | Self::Reject(_))
    }

    #[must_use]
    pub const fn should_close(&self) -> bool {
        matches!(self, Self::Quit(_) | Self::Close(_))
    }

    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        matches!(self, Self::MailFrom(_) | Self::RcptTo(_) | Self::Data(_) | Self::Reading(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TransitionContext {
        TransitionContext::default()
    }

    #[test]
    fn connect_to_ehlo() {
        let state = State::Connect(Connect).transition(
            Command::Helo(HeloVariant::Ehlo("client.example.com".to_string())),
            &ctx(),
        );
        assert!(matches!(state, State::Ehlo(_)));
    }

    #[test]
    fn ehlo_to_starttls() {
        let state = State::Ehlo(Ehlo {
            id: "client".to_string(),
        })
        .transition(Command::StartTls, &ctx());
        assert!(matches!(state, State::StartTls(_)));
    }

    #[test]
    fn prevent_starttls_after_mail_from() {
        let state = State::MailFrom(MailFrom::default()).transition(Command::StartTls, &ctx());
        assert!(state.is_error());
    }

    #[test]
    fn mail_transaction_flow() {
        let state = State::Ehlo(Ehlo::default())
            .transition(Command::MailFrom(None, MailParameters::new()), &ctx());
        assert!(matches!(state, State::MailFrom(_)));

        let state = state.transition(
            Command::RcptTo(AddressList::default(), MailParameters::new()),
            &ctx(),
        );
        assert!(matches!(state, State::RcptTo(_)));

        let state = state.transition(Command::Data, &ctx());
        assert!(matches!(state, State::Data(_)));
    }

    #[test]
    fn quit_from_any_state() {
        let state = State::Helo(Helo::default()).transition(Command::Quit, &ctx());
        assert!(state.should_close());
    }

    #[test]
    fn rset_clears_transaction() {
        let state = State::RcptTo(RcptTo::default()).transition(Command::Rset, &ctx());
        assert!(!state.in_transaction());
    }

    #[test]
    fn auth_requires_tls_when_configured() {
        let mut context = ctx();
        context.auth_require_tls = true;
        let state = State::Ehlo(Ehlo::default()).transition(
            Command::Auth {
                mechanism: "PLAIN".to_string(),
                initial_response: None,
            },
            &context,
        );
        assert!(state.is_error());
    }

    #[test]
    fn mail_from_requires_auth_when_configured() {
        let mut context = ctx();
        context.auth_required = true;
        let state = State::Ehlo(Ehlo::default())
            .transition(Command::MailFrom(None, MailParameters::new()), &context);
        assert!(state.is_error());
    }
}
