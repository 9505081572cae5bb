#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod hooks;
pub mod listener;
pub mod server;
pub mod session;
pub mod state;

pub use command::{Command, HeloVariant, MailParameters};
pub use config::{CallLimit, EngineConfig, EngineConfigBuilder, ServerTimeouts, TlsContext};
pub use hooks::{DefaultHooks, HookResult, Hooks};
pub use session::{
    auth::{Authenticator, Credentials, Mechanism, RejectAll},
    Session,
};
pub use state::State;

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use tokio::net::TcpStream;
use vellum_common::traits::protocol::Protocol;

/// The SMTP (or, when [`EngineConfig::lmtp`] is set, LMTP) protocol, driving
/// one [`Session`] per accepted connection.
#[derive(Default)]
pub struct Smtp;

/// Arguments handed to [`Smtp::handle`] for each accepted connection: the
/// resolved engine configuration, and a shutdown broadcast sender each
/// session subscribes to fresh so it owns an independent receiver.
#[derive(Clone)]
pub struct SmtpArgs {
    pub config: Arc<EngineConfig>,
    pub shutdown: tokio::sync::broadcast::Sender<vellum_common::Signal>,
}

impl Protocol for Smtp {
    type Session = Session<TcpStream>;
    type Context = HashMap<String, String>;
    type ExtraArgs = SmtpArgs;

    fn handle(
        &self,
        stream: TcpStream,
        address: SocketAddr,
        _context: Self::Context,
        args: Self::ExtraArgs,
    ) -> Self::Session {
        Session::create(stream, address, args.config, args.shutdown.subscribe())
    }
}
