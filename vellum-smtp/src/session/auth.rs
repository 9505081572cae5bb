//! SASL `AUTH` mechanism handling (RFC 4954).
//!
//! `empath-smtp` never implemented AUTH (its state machine returns
//! `Invalid("AUTH not implemented")` unconditionally); this module is new,
//! grounded in the RFC and in `base64`-based SASL handling as seen in sibling
//! example crates.

use base64::{engine::general_purpose::STANDARD, Engine};

/// Credentials extracted from a decoded `PLAIN` or `LOGIN` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub authzid: String,
    pub authcid: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Plain,
    Login,
}

impl Mechanism {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}

/// State machine driving a multi-step `AUTH LOGIN` challenge/response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStep {
    AwaitUsername,
    AwaitPassword { username: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed base64")]
    Base64,
    #[error("malformed PLAIN response")]
    MalformedPlain,
}

/// Decode an `AUTH PLAIN` initial response or continuation line.
///
/// Format per RFC 4616: `authzid NUL authcid NUL password`, base64-encoded.
pub fn decode_plain(encoded: &str) -> Result<Credentials, AuthError> {
    let raw = STANDARD.decode(encoded.trim()).map_err(|_| AuthError::Base64)?;
    let mut parts = raw.split(|&b| b == 0);
    let authzid = parts.next().ok_or(AuthError::MalformedPlain)?;
    let authcid = parts.next().ok_or(AuthError::MalformedPlain)?;
    let password = parts.next().ok_or(AuthError::MalformedPlain)?;

    Ok(Credentials {
        authzid: String::from_utf8_lossy(authzid).into_owned(),
        authcid: String::from_utf8_lossy(authcid).into_owned(),
        password: String::from_utf8_lossy(password).into_owned(),
    })
}

pub fn decode_base64_field(encoded: &str) -> Result<String, AuthError> {
    let raw = STANDARD.decode(encoded.trim()).map_err(|_| AuthError::Base64)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

#[must_use]
pub fn encode_challenge(prompt: &str) -> String {
    STANDARD.encode(prompt.as_bytes())
}

/// Validates decoded credentials against whatever backing store the handler
/// wires in. The default implementation always fails closed.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> bool;
}

pub struct RejectAll;

impl Authenticator for RejectAll {
    fn authenticate(&self, _credentials: &Credentials) -> bool {
        false
    }
}
