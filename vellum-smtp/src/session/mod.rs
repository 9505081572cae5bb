use std::{net::SocketAddr, sync::Arc, time::Instant};

use ahash::AHashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use vellum_common::{
    envelope::Envelope, error::SessionError, internal, outgoing, incoming, status::Status, Signal,
};
use vellum_tracing::traced;

pub mod auth;
mod events;
mod io;
mod response;

use crate::{
    command::{Command, CommandParseError},
    config::EngineConfig,
    connection::Connection,
    state::{self, State, TransitionContext},
};

/// RFC doesn't fix this number; spec default is 25 unrecognized commands
/// before a successful greeting.
const MAX_UNRECOGNIZED_BEFORE_GREETING: u32 = 25;

pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    peer: SocketAddr,
    connection: Option<Connection<Stream>>,
    config: Arc<EngineConfig>,
    state: State,
    ctx: TransitionContext,
    envelope: Envelope,
    start_time: Instant,
    auth_failures: u32,
    login_step: Option<auth::LoginStep>,
    call_counts: AHashMap<&'static str, u32>,
    unrecognized_before_greeting: u32,
    shutdown: Option<tokio::sync::broadcast::Receiver<Signal>>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    #[must_use]
    pub fn create(
        stream: Stream,
        peer: SocketAddr,
        config: Arc<EngineConfig>,
        shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Self {
        let ctx = TransitionContext {
            extended: false,
            tls_active: false,
            require_starttls: config.require_starttls,
            auth_required: config.auth_required,
            auth_require_tls: config.auth_require_tls,
            authenticated: false,
            greeted: false,
        };

        Self {
            peer,
            connection: Some(Connection::plain(stream)),
            config,
            state: State::default(),
            ctx,
            envelope: Envelope::default(),
            start_time: Instant::now(),
            auth_failures: 0,
            login_step: None,
            call_counts: AHashMap::new(),
            unrecognized_before_greeting: 0,
            shutdown: Some(shutdown),
        }
    }

    fn conn(&mut self) -> &mut Connection<Stream> {
        self.connection.as_mut().expect("connection present outside TLS upgrade")
    }

    fn timeout_secs(&self) -> u64 {
        match &self.state {
            State::Reading(_) => self.config.timeouts.data_block_secs,
            State::Data(_) => self.config.timeouts.data_init_secs,
            State::PostDot(_) => self.config.timeouts.data_termination_secs,
            _ => self.config.timeouts.command_secs,
        }
    }

    async fn send_outcome(&mut self, outcome: &events::Outcome) -> Result<(), SessionError> {
        for line in response::multi(outcome.status, &outcome.lines) {
            outgoing!("{line}");
            self.conn()
                .send(&line)
                .await
                .map_err(|e| SessionError::Protocol(e.to_string()))?;
        }
        Ok(())
    }

    /// Returns `true` when the connection was rejected and should close
    /// without entering the command loop.
    async fn greet(&mut self) -> Result<bool, SessionError> {
        if let crate::hooks::HookResult::Reject(status, message) =
            self.config.handler.handle_connect(self.peer)
        {
            let outcome = events::Outcome { status, lines: vec![message], close: true };
            self.send_outcome(&outcome).await?;
            return Ok(true);
        }

        let banner = format!("{} {}", self.config.hostname, self.config.ident);
        let outcome = events::Outcome {
            status: Status::ServiceReady,
            lines: vec![banner],
            close: false,
        };
        self.send_outcome(&outcome).await?;
        Ok(false)
    }

    #[traced(instrument(level = tracing::Level::TRACE, skip_all, fields(?peer = self.peer)), timing(precision = "us"))]
    pub async fn run(mut self) -> Result<(), SessionError> {
        internal!("Connected");
        if self.greet().await? {
            return Ok(());
        }

        let mut shutdown = self.shutdown.take().expect("shutdown receiver present at construction");

        loop {
            let elapsed = self.start_time.elapsed();
            if elapsed.as_secs() >= self.config.timeouts.connection_secs {
                return Err(SessionError::Timeout(self.config.timeouts.connection_secs));
            }

            let timeout_secs = self.timeout_secs();
            let timeout_duration = std::time::Duration::from_secs(timeout_secs);

            tokio::select! {
                _ = shutdown.recv() => {
                    let outcome = events::Outcome {
                        status: Status::Unavailable,
                        lines: vec!["Server shutting down".to_string()],
                        close: true,
                    };
                    let _ = self.send_outcome(&outcome).await;
                    return Ok(());
                }
                result = tokio::time::timeout(timeout_duration, self.step()) => {
                    match result {
                        Ok(Ok(true)) => return Ok(()),
                        Ok(Ok(false)) => {}
                        Ok(Err(err)) => return Err(err),
                        Err(_) => return Err(SessionError::Timeout(timeout_secs)),
                    }
                }
            }
        }
    }

    /// Process one unit of protocol work. Returns `Ok(true)` when the
    /// connection should close.
    async fn step(&mut self) -> Result<bool, SessionError> {
        match &self.state {
            State::Data(_) => return self.read_classic_body().await,
            State::AuthInProgress(_) => return self.read_auth_continuation().await,
            _ => {}
        }

        let limit = self.config.line_length_limit;
        let Some(line) = self
            .conn()
            .receive_line(limit)
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?
        else {
            return Ok(true);
        };

        incoming!("{}", line.trim_end_matches(['\r', '\n']));

        let command = match Command::try_from(line.as_str()) {
            Ok(command) => command,
            Err(CommandParseError::UnknownCommand(verb)) => {
                if !self.ctx.greeted {
                    self.unrecognized_before_greeting += 1;
                    if self.unrecognized_before_greeting > MAX_UNRECOGNIZED_BEFORE_GREETING {
                        let outcome = events::Outcome {
                            status: Status::Unavailable,
                            lines: vec![format!(
                                "{} Error: too many unrecognized commands",
                                self.config.hostname
                            )],
                            close: true,
                        };
                        self.send_outcome(&outcome).await?;
                        return Ok(true);
                    }
                }
                let outcome = events::Outcome {
                    status: Status::CommandUnrecognized,
                    lines: vec![format!("unrecognized command {verb:?}")],
                    close: false,
                };
                self.send_outcome(&outcome).await?;
                return Ok(false);
            }
            Err(err) => {
                let _ = self.config.handler.handle_exception(&err.to_string());
                let outcome = events::Outcome {
                    status: Status::Syntax,
                    lines: vec![err.to_string()],
                    close: false,
                };
                self.send_outcome(&outcome).await?;
                return Ok(false);
            }
        };

        if matches!(command, Command::Bdat { .. }) && !self.config.chunking {
            let outcome = events::Outcome {
                status: Status::InvalidCommandSequence,
                lines: vec!["BDAT/CHUNKING not enabled".to_string()],
                close: false,
            };
            self.send_outcome(&outcome).await?;
            return Ok(false);
        }

        let verb = command.verb();
        let limit = self.config.command_call_limit.limit_for(verb);
        if limit > 0 {
            let count = self.call_counts.entry(verb).or_insert(0);
            *count += 1;
            if *count > limit {
                let outcome = events::Outcome {
                    status: Status::Unavailable,
                    lines: vec![format!("{} Error: too many {}", self.config.hostname, verb)],
                    close: true,
                };
                self.send_outcome(&outcome).await?;
                return Ok(true);
            }
        }

        let bdat_request = if let Command::Bdat { size, last } = &command { Some((*size, *last)) } else { None };
        let initial_response = if let Command::Auth { ref initial_response, .. } = command {
            initial_response.clone()
        } else {
            None
        };

        let old_state = std::mem::take(&mut self.state);
        self.state = old_state.transition(command, &self.ctx);

        if matches!(self.state, State::Ehlo(_) | State::Helo(_) | State::Lhlo(_)) {
            self.ctx.greeted = true;
        }
        if matches!(self.state, State::Ehlo(_)) {
            self.ctx.extended = true;
        }

        if let (Some((size, last)), State::Reading(_)) = (bdat_request, &self.state) {
            return self.read_bdat_chunk(size, last).await;
        }

        if let (State::AuthInProgress(_), Some(response)) = (&self.state, &initial_response) {
            return self.process_auth_step(response.clone()).await;
        }

        let outcome = events::dispatch(
            self.config.handler.as_ref(),
            self.peer,
            &self.state,
            &mut self.envelope,
            &self.config,
            &self.ctx,
        );

        if !outcome.close {
            if let State::Invalid(_) | State::Reject(_) | State::Rset(_) | State::Vrfy(_)
                | State::Expn(_) | State::Help(_) = &self.state
            {
                self.state = self.fallback_state();
            }
        }

        self.send_outcome(&outcome).await?;

        if matches!(self.state, State::StartTls(_)) {
            self.upgrade_tls().await?;
        }

        Ok(outcome.close)
    }

    async fn upgrade_tls(&mut self) -> Result<(), SessionError> {
        let Some(tls_context) = self.config.tls_context.clone() else {
            return Ok(());
        };

        let connection = self.connection.take().expect("connection present");
        match connection.upgrade(&tls_context).await {
            Ok((connection, _info)) => {
                self.connection = Some(connection);
                self.ctx.tls_active = true;
                self.state = State::Connect(state::Connect);
            }
            Err(err) => {
                internal!(level = ERROR, "TLS upgrade failed: {err}");
                return Err(SessionError::Protocol(err.to_string()));
            }
        }
        Ok(())
    }

    /// Populate both `content` and `original_content` from a reconstructed
    /// message body. `original_content` always keeps the verbatim bytes as
    /// received; `content` is decoded to lossy UTF-8 when `decode_data` is
    /// enabled, otherwise it mirrors `original_content`.
    fn set_body(&mut self, body: Vec<u8>) {
        *self.envelope.original_content_mut() = Some(body.clone());
        let content = if self.config.decode_data {
            String::from_utf8_lossy(&body).into_owned().into_bytes()
        } else {
            body
        };
        *self.envelope.content_mut() = Some(content);
    }

    async fn read_classic_body(&mut self) -> Result<bool, SessionError> {
        let data_size_limit = self.config.data_size_limit;
        let line_length_limit = self.config.line_length_limit;
        let result = io::read_dotted_body(self.conn(), data_size_limit, line_length_limit)
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        let Some(body) = result else {
            let outcome = events::Outcome {
                status: Status::ExceededStorage,
                lines: vec!["message exceeds fixed maximum message size".to_string()],
                close: false,
            };
            self.send_outcome(&outcome).await?;
            self.state = self.fallback_state();
            return Ok(false);
        };

        self.set_body(body);
        self.state = State::PostDot(state::PostDot);
        self.finish_data_transaction().await
    }

    async fn read_bdat_chunk(&mut self, size: usize, last: bool) -> Result<bool, SessionError> {
        let chunk = io::read_bdat_chunk(self.conn(), size)
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        let mut combined = self.envelope.original_content().unwrap_or(&[]).to_vec();
        combined.extend_from_slice(&chunk);

        if last {
            self.set_body(combined);
            self.state = State::PostDot(state::PostDot);
            self.finish_data_transaction().await
        } else {
            *self.envelope.original_content_mut() = Some(combined);
            let outcome = events::Outcome {
                status: Status::Ok,
                lines: vec![format!("{size} octets received")],
                close: false,
            };
            self.send_outcome(&outcome).await?;
            Ok(false)
        }
    }

    /// Dispatch `handle_data` once and reply: a single combined reply for
    /// SMTP, or one identical reply per recipient for LMTP (RFC 2033 §4.2),
    /// since [`crate::hooks::Hooks::handle_data`] has no per-recipient verdict
    /// to report distinct statuses for.
    async fn finish_data_transaction(&mut self) -> Result<bool, SessionError> {
        let outcome = events::dispatch(
            self.config.handler.as_ref(),
            self.peer,
            &self.state,
            &mut self.envelope,
            &self.config,
            &self.ctx,
        );

        if self.config.lmtp {
            let recipients = self.envelope.rcpt_tos().len().max(1);
            for _ in 0..recipients {
                self.send_outcome(&outcome).await?;
            }
        } else {
            self.send_outcome(&outcome).await?;
        }

        self.envelope = Envelope::default();
        self.state = self.fallback_state();
        Ok(false)
    }

    async fn read_auth_continuation(&mut self) -> Result<bool, SessionError> {
        let limit = self.config.line_length_limit;
        let Some(line) = self
            .conn()
            .receive_line(limit)
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?
        else {
            return Ok(true);
        };

        self.process_auth_step(line.trim_end_matches(['\r', '\n']).to_string()).await
    }

    /// Drive one step of the `AUTH` exchange: decode the client's response
    /// against the mechanism and (for `LOGIN`) the current
    /// [`auth::LoginStep`], send the matching reply, and finalize once full
    /// credentials have been collected.
    async fn process_auth_step(&mut self, payload: String) -> Result<bool, SessionError> {
        let State::AuthInProgress(current) = &self.state else {
            return Ok(false);
        };
        let mechanism_name = current.mechanism.clone();

        if payload.trim() == "*" {
            self.login_step = None;
            let outcome = events::Outcome {
                status: Status::Syntax,
                lines: vec!["Authentication cancelled".to_string()],
                close: false,
            };
            self.send_outcome(&outcome).await?;
            self.state = self.fallback_state();
            return Ok(false);
        }

        let Some(mechanism) = auth::Mechanism::parse(&mechanism_name) else {
            let outcome = events::Outcome {
                status: Status::AuthFailure,
                lines: vec!["unsupported mechanism".to_string()],
                close: false,
            };
            self.send_outcome(&outcome).await?;
            self.state = self.fallback_state();
            return Ok(false);
        };

        let credentials = match mechanism {
            auth::Mechanism::Plain => auth::decode_plain(&payload).ok(),
            auth::Mechanism::Login => match self.login_step.clone() {
                Some(auth::LoginStep::AwaitPassword { username }) => {
                    match auth::decode_base64_field(&payload) {
                        Ok(password) => Some(auth::Credentials {
                            authzid: String::new(),
                            authcid: username,
                            password,
                        }),
                        Err(_) => None,
                    }
                }
                None | Some(auth::LoginStep::AwaitUsername) => {
                    match auth::decode_base64_field(&payload) {
                        Ok(username) => {
                            self.login_step = Some(auth::LoginStep::AwaitPassword { username });
                            let outcome = events::Outcome {
                                status: Status::Continue,
                                lines: vec![auth::encode_challenge("Password:")],
                                close: false,
                            };
                            self.send_outcome(&outcome).await?;
                            return Ok(false);
                        }
                        Err(_) => None,
                    }
                }
            },
        };

        self.login_step = None;
        let accepted = credentials.as_ref().is_some_and(|creds| self.config.auth.authenticate(creds));

        let outcome = if accepted {
            self.ctx.authenticated = true;
            self.auth_failures = 0;
            if let Some(creds) = &credentials {
                let _ = self.config.handler.handle_auth(mechanism.as_str(), &creds.authcid);
            }
            events::Outcome {
                status: Status::AuthSuccess,
                lines: vec!["Authentication successful".to_string()],
                close: false,
            }
        } else {
            self.auth_failures += 1;
            let close = self.auth_failures >= self.config.auth_max_failures;
            events::Outcome {
                status: Status::AuthFailure,
                lines: vec!["Authentication failed".to_string()],
                close,
            }
        };

        let close = outcome.close;
        self.send_outcome(&outcome).await?;
        self.state = self.fallback_state();
        Ok(close)
    }

    fn fallback_state(&self) -> State {
        if !self.ctx.greeted {
            State::Connect(state::Connect)
        } else if self.ctx.extended {
            State::Ehlo(state::Ehlo::default())
        } else {
            State::Helo(state::Helo::default())
        }
    }
}

impl vellum_common::traits::protocol::SessionHandler for Session<tokio::net::TcpStream> {
    async fn run(self) -> anyhow::Result<()> {
        Self::run(self).await.map_err(Into::into)
    }
}
