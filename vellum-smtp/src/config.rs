//! Engine configuration: timeouts, TLS, call limits, and the handler hook.

use std::{path::PathBuf, sync::Arc};

use ahash::AHashMap;
use serde::Deserialize;

use crate::{hooks::Hooks, session::auth::{Authenticator, RejectAll}};

/// SMTP server-side timeout configuration, following RFC 5321 Section 4.5.3.2.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerTimeouts {
    /// Timeout for regular commands (EHLO, MAIL FROM, RCPT TO, ...). RFC default: 5 minutes.
    #[serde(default = "default_command_timeout")]
    pub command_secs: u64,
    /// Timeout waiting for the DATA command's own response. RFC default: 2 minutes.
    #[serde(default = "default_data_init_timeout")]
    pub data_init_secs: u64,
    /// Timeout between chunks of message body. RFC default: 3 minutes.
    #[serde(default = "default_data_block_timeout")]
    pub data_block_secs: u64,
    /// Timeout processing after the terminating dot. RFC default: 10 minutes.
    #[serde(default = "default_data_termination_timeout")]
    pub data_termination_secs: u64,
    /// Maximum total session duration.
    #[serde(default = "default_connection_timeout")]
    pub connection_secs: u64,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            command_secs: default_command_timeout(),
            data_init_secs: default_data_init_timeout(),
            data_block_secs: default_data_block_timeout(),
            data_termination_secs: default_data_termination_timeout(),
            connection_secs: default_connection_timeout(),
        }
    }
}

const fn default_command_timeout() -> u64 {
    300
}
const fn default_data_init_timeout() -> u64 {
    120
}
const fn default_data_block_timeout() -> u64 {
    180
}
const fn default_data_termination_timeout() -> u64 {
    600
}
const fn default_connection_timeout() -> u64 {
    1800
}

#[derive(Clone, Debug, Deserialize)]
pub struct TlsContext {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

/// Per-command call limits, guarding against clients that spam a single
/// command (e.g. repeated RSET/NOOP) to exhaust server resources.
#[derive(Clone, Debug)]
pub enum CallLimit {
    /// The same limit applies to every command.
    Uniform(u32),
    /// A limit keyed by command verb, falling back to `default` when a verb
    /// has no explicit entry.
    PerCommand {
        limits: AHashMap<String, u32>,
        default: u32,
    },
}

impl Default for CallLimit {
    fn default() -> Self {
        Self::Uniform(0)
    }
}

impl CallLimit {
    #[must_use]
    pub fn limit_for(&self, verb: &str) -> u32 {
        match self {
            Self::Uniform(n) => *n,
            Self::PerCommand { limits, default } => {
                limits.get(verb).copied().unwrap_or(*default)
            }
        }
    }
}

/// Fully resolved configuration for an SMTP/LMTP engine instance.
pub struct EngineConfig {
    pub hostname: Arc<str>,
    pub ident: Arc<str>,
    pub data_size_limit: usize,
    pub enable_smtputf8: bool,
    pub decode_data: bool,
    pub tls_context: Option<TlsContext>,
    pub require_starttls: bool,
    pub timeouts: ServerTimeouts,
    pub auth_required: bool,
    pub auth_require_tls: bool,
    pub auth_exclude_mechanism: Vec<String>,
    pub auth_max_failures: u32,
    pub auth: Arc<dyn Authenticator>,
    pub command_call_limit: CallLimit,
    pub chunking: bool,
    pub lmtp: bool,
    pub line_length_limit: usize,
    pub handler: Arc<dyn Hooks>,
}

impl EngineConfig {
    #[must_use]
    pub fn builder(handler: Arc<dyn Hooks>) -> EngineConfigBuilder {
        EngineConfigBuilder::new(handler)
    }
}

pub struct EngineConfigBuilder {
    hostname: Arc<str>,
    ident: Arc<str>,
    data_size_limit: usize,
    enable_smtputf8: bool,
    decode_data: bool,
    tls_context: Option<TlsContext>,
    require_starttls: bool,
    timeouts: ServerTimeouts,
    auth_required: bool,
    auth_require_tls: bool,
    auth_exclude_mechanism: Vec<String>,
    auth_max_failures: u32,
    auth: Arc<dyn Authenticator>,
    command_call_limit: CallLimit,
    chunking: bool,
    lmtp: bool,
    line_length_limit: usize,
    handler: Arc<dyn Hooks>,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn new(handler: Arc<dyn Hooks>) -> Self {
        Self {
            hostname: Arc::from(
                std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            ),
            ident: Arc::from("vellum"),
            data_size_limit: 0,
            enable_smtputf8: true,
            decode_data: false,
            tls_context: None,
            require_starttls: false,
            timeouts: ServerTimeouts::default(),
            auth_required: false,
            auth_require_tls: true,
            auth_exclude_mechanism: Vec::new(),
            auth_max_failures: 3,
            auth: Arc::new(RejectAll),
            command_call_limit: CallLimit::default(),
            chunking: false,
            lmtp: false,
            line_length_limit: crate::connection::DEFAULT_LINE_LENGTH_LIMIT,
            handler,
        }
    }

    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<Arc<str>>) -> Self {
        self.hostname = hostname.into();
        self
    }

    #[must_use]
    pub fn with_ident(mut self, ident: impl Into<Arc<str>>) -> Self {
        self.ident = ident.into();
        self
    }

    #[must_use]
    pub const fn with_data_size_limit(mut self, limit: usize) -> Self {
        self.data_size_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_smtputf8(mut self, enabled: bool) -> Self {
        self.enable_smtputf8 = enabled;
        self
    }

    #[must_use]
    pub const fn with_decode_data(mut self, decode: bool) -> Self {
        self.decode_data = decode;
        self
    }

    #[must_use]
    pub fn with_tls_context(mut self, tls_context: Option<TlsContext>) -> Self {
        self.tls_context = tls_context;
        self
    }

    #[must_use]
    pub const fn with_require_starttls(mut self, required: bool) -> Self {
        self.require_starttls = required;
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: ServerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub const fn with_auth_required(mut self, required: bool) -> Self {
        self.auth_required = required;
        self
    }

    #[must_use]
    pub const fn with_auth_require_tls(mut self, required: bool) -> Self {
        self.auth_require_tls = required;
        self
    }

    #[must_use]
    pub fn with_auth_exclude_mechanism(mut self, mechanisms: Vec<String>) -> Self {
        self.auth_exclude_mechanism = mechanisms;
        self
    }

    #[must_use]
    pub const fn with_auth_max_failures(mut self, max: u32) -> Self {
        self.auth_max_failures = max;
        self
    }

    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.auth = authenticator;
        self
    }

    #[must_use]
    pub fn with_command_call_limit(mut self, limit: CallLimit) -> Self {
        self.command_call_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_chunking(mut self, enabled: bool) -> Self {
        self.chunking = enabled;
        self
    }

    #[must_use]
    pub const fn with_lmtp(mut self, enabled: bool) -> Self {
        self.lmtp = enabled;
        self
    }

    #[must_use]
    pub const fn with_line_length_limit(mut self, limit: usize) -> Self {
        self.line_length_limit = limit;
        self
    }

    /// Finalize the configuration.
    ///
    /// # Errors
    /// Returns [`vellum_common::error::ProtocolError::InvalidConfiguration`] if
    /// STARTTLS is required but no TLS context was supplied.
    pub fn build(self) -> Result<EngineConfig, vellum_common::error::ProtocolError> {
        if self.require_starttls && self.tls_context.is_none() {
            return Err(vellum_common::error::ProtocolError::InvalidConfiguration {
                field: "tls_context".to_string(),
                reason: "require_starttls set without a tls_context".to_string(),
            });
        }

        Ok(EngineConfig {
            hostname: self.hostname,
            ident: self.ident,
            data_size_limit: self.data_size_limit,
            enable_smtputf8: self.enable_smtputf8,
            decode_data: self.decode_data,
            tls_context: self.tls_context,
            require_starttls: self.require_starttls,
            timeouts: self.timeouts,
            auth_required: self.auth_required,
            auth_require_tls: self.auth_require_tls,
            auth_exclude_mechanism: self.auth_exclude_mechanism,
            auth_max_failures: self.auth_max_failures,
            auth: self.auth,
            command_call_limit: self.command_call_limit,
            chunking: self.chunking,
            lmtp: self.lmtp,
            line_length_limit: self.line_length_limit,
            handler: self.handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::DefaultHooks;

    #[test]
    fn require_starttls_without_context_is_rejected() {
        let result = EngineConfig::builder(Arc::new(DefaultHooks))
            .with_require_starttls(true)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn call_limit_falls_back_to_default() {
        let mut limits = AHashMap::new();
        limits.insert("RSET".to_string(), 5);
        let limit = CallLimit::PerCommand { limits, default: 100 };
        assert_eq!(limit.limit_for("RSET"), 5);
        assert_eq!(limit.limit_for("NOOP"), 100);
    }
}
