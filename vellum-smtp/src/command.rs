//! SMTP/LMTP command parsing.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use vellum_common::address::{Address, AddressList};

/// Known ESMTP `MAIL FROM`/`RCPT TO` parameter names (RFC 1870, RFC 6152, RFC 6531).
static KNOWN_PARAMS: phf::Set<&'static str> = phf::phf_set! {
    "SIZE",
    "BODY",
    "SMTPUTF8",
    "AUTH",
    "RET",
    "ENVID",
    "ORCPT",
    "NOTIFY",
};

/// Parsed `MAIL FROM`/`RCPT TO` parameter set.
///
/// Keys are upper-cased on insertion so lookups are case-insensitive, as RFC 5321
/// requires for parameter keywords. Values are stored verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailParameters {
    values: AHashMap<String, Option<String>>,
}

impl MailParameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `key=value` (or bare `key`) parameters trailing a MAIL FROM/RCPT TO
    /// path, as produced by splitting the command on whitespace.
    ///
    /// # Errors
    /// Returns an error if `SIZE` is given more than once, is non-numeric, or is zero.
    pub fn from_params_str(params: &str) -> Result<Self, CommandParseError> {
        let mut parsed = Self::new();

        for token in params.split_whitespace() {
            let (key, value) = token
                .split_once('=')
                .map_or((token, None), |(k, v)| (k, Some(v.to_string())));
            let key = key.to_ascii_uppercase();

            if key == "SIZE" {
                if parsed.values.contains_key("SIZE") {
                    return Err(CommandParseError::DuplicateParameter("SIZE"));
                }
                let size: usize = value
                    .as_deref()
                    .ok_or(CommandParseError::MissingParameterValue("SIZE"))?
                    .parse()
                    .map_err(|_| CommandParseError::InvalidParameterValue("SIZE"))?;
                if size == 0 {
                    return Err(CommandParseError::InvalidParameterValue("SIZE"));
                }
            }

            parsed.values.insert(key, value);
        }

        Ok(parsed)
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(&key.to_ascii_uppercase())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_ascii_uppercase())?.as_deref()
    }

    #[must_use]
    pub fn size(&self) -> Option<usize> {
        self.get("SIZE").and_then(|v| v.parse().ok())
    }

    #[must_use]
    pub fn smtp_utf8(&self) -> bool {
        self.has("SMTPUTF8")
    }

    #[must_use]
    pub fn is_known(key: &str) -> bool {
        KNOWN_PARAMS.contains(key.to_ascii_uppercase().as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("duplicate {0} parameter")]
    DuplicateParameter(&'static str),
    #[error("missing value for {0} parameter")]
    MissingParameterValue(&'static str),
    #[error("invalid value for {0} parameter")]
    InvalidParameterValue(&'static str),
    #[error("malformed address")]
    MalformedAddress,
    #[error("empty command")]
    Empty,
    #[error("unrecognized command {0:?}")]
    UnknownCommand(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeloVariant {
    Helo(String),
    Ehlo(String),
    Lhlo(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(HeloVariant),
    MailFrom(Option<Address>, MailParameters),
    RcptTo(AddressList, MailParameters),
    Data,
    Bdat { size: usize, last: bool },
    Rset,
    Noop(Option<String>),
    Vrfy(String),
    Expn(String),
    Help(Option<String>),
    StartTls,
    Auth {
        mechanism: String,
        initial_response: Option<String>,
    },
    AuthContinuation(String),
    Quit,
}

impl Command {
    /// The canonical uppercase verb for this command, as used for call-limit
    /// bookkeeping and logging.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo(HeloVariant::Helo(_)) => "HELO",
            Self::Helo(HeloVariant::Ehlo(_)) => "EHLO",
            Self::Helo(HeloVariant::Lhlo(_)) => "LHLO",
            Self::MailFrom(..) => "MAIL",
            Self::RcptTo(..) => "RCPT",
            Self::Data => "DATA",
            Self::Bdat { .. } => "BDAT",
            Self::Rset => "RSET",
            Self::Noop(_) => "NOOP",
            Self::Vrfy(_) => "VRFY",
            Self::Expn(_) => "EXPN",
            Self::Help(_) => "HELP",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } => "AUTH",
            Self::AuthContinuation(_) => "AUTH",
            Self::Quit => "QUIT",
        }
    }
}

fn parse_address(raw: &str) -> Result<Option<Address>, CommandParseError> {
    let raw = raw.trim();
    if raw == "<>" {
        return Ok(None);
    }
    let trimmed = raw.trim_start_matches('<').trim_end_matches('>');
    if trimmed.is_empty() {
        return Ok(None);
    }
    mailparse::addrparse(trimmed)
        .map_err(|_| CommandParseError::MalformedAddress)
        .map(|mut list| {
            if list.is_empty() {
                None
            } else {
                Some(Address::from(list.remove(0)))
            }
        })
}

fn split_command(line: &str) -> (String, String) {
    line.trim_end_matches(['\r', '\n'])
        .split_once(' ')
        .map_or_else(
            || (line.trim_end_matches(['\r', '\n']).to_string(), String::new()),
            |(cmd, rest)| (cmd.to_string(), rest.trim_start().to_string()),
        )
}

impl TryFrom<&str> for Command {
    type Error = CommandParseError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return Err(CommandParseError::Empty);
        }

        let (verb, rest) = split_command(trimmed);
        let upper = verb.to_ascii_uppercase();

        Ok(match upper.as_str() {
            "HELO" => Command::Helo(HeloVariant::Helo(rest)),
            "EHLO" => Command::Helo(HeloVariant::Ehlo(rest)),
            "LHLO" => Command::Helo(HeloVariant::Lhlo(rest)),
            "MAIL" => {
                let rest = rest.strip_prefix("FROM:").or_else(|| rest.strip_prefix("from:")).unwrap_or(&rest);
                let (addr_part, params_part) = rest.split_once(' ').unwrap_or((rest, ""));
                let address = parse_address(addr_part)?;
                let params = MailParameters::from_params_str(params_part)?;
                Command::MailFrom(address, params)
            }
            "RCPT" => {
                let rest = rest.strip_prefix("TO:").or_else(|| rest.strip_prefix("to:")).unwrap_or(&rest);
                let (addr_part, params_part) = rest.split_once(' ').unwrap_or((rest, ""));
                let address = parse_address(addr_part)?
                    .ok_or(CommandParseError::MalformedAddress)?;
                let params = MailParameters::from_params_str(params_part)?;
                Command::RcptTo(std::iter::once(address).collect(), params)
            }
            "DATA" => Command::Data,
            "BDAT" => {
                let mut parts = rest.split_whitespace();
                let size: usize = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or(CommandParseError::InvalidParameterValue("BDAT"))?;
                let last = parts.next().is_some_and(|tok| tok.eq_ignore_ascii_case("LAST"));
                Command::Bdat { size, last }
            }
            "RSET" => Command::Rset,
            "NOOP" => Command::Noop(if rest.is_empty() { None } else { Some(rest) }),
            "VRFY" => Command::Vrfy(rest),
            "EXPN" => Command::Expn(rest),
            "HELP" => Command::Help(if rest.is_empty() { None } else { Some(rest) }),
            "STARTTLS" => {
                if rest.is_empty() {
                    Command::StartTls
                } else {
                    return Err(CommandParseError::InvalidParameterValue("STARTTLS"));
                }
            }
            "QUIT" => Command::Quit,
            "AUTH" => {
                let (mechanism, initial) = rest.split_once(' ').unwrap_or((rest.as_str(), ""));
                Command::Auth {
                    mechanism: mechanism.to_ascii_uppercase(),
                    initial_response: if initial.is_empty() { None } else { Some(initial.to_string()) },
                }
            }
            _ => return Err(CommandParseError::UnknownCommand(verb)),
        })
    }
}

impl TryFrom<String> for Command {
    type Error = CommandParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_casing(s: &str) -> Vec<String> {
        vec![s.to_uppercase(), s.to_lowercase(), s.to_string()]
    }

    #[test]
    fn mail_from_command() {
        for variant in string_casing("mail from:<sender@example.com>") {
            let cmd = Command::try_from(variant.as_str()).unwrap();
            match cmd {
                Command::MailFrom(Some(addr), _) => {
                    assert_eq!(addr.to_string(), "sender@example.com");
                }
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[test]
    fn mail_from_null_sender() {
        let cmd = Command::try_from("MAIL FROM:<>").unwrap();
        assert_eq!(cmd, Command::MailFrom(None, MailParameters::new()));
    }

    #[test]
    fn mail_from_size_edge_cases() {
        assert_eq!(
            MailParameters::from_params_str("SIZE=0"),
            Err(CommandParseError::InvalidParameterValue("SIZE"))
        );
        assert_eq!(
            MailParameters::from_params_str("SIZE=1 SIZE=2"),
            Err(CommandParseError::DuplicateParameter("SIZE"))
        );
        let params = MailParameters::from_params_str("SIZE=1024 SMTPUTF8").unwrap();
        assert_eq!(params.size(), Some(1024));
        assert!(params.smtp_utf8());
    }

    #[test]
    fn rcpt_to_command() {
        let cmd = Command::try_from("RCPT TO:<rcpt@example.com>").unwrap();
        match cmd {
            Command::RcptTo(addrs, _) => assert_eq!(addrs.to_string(), "rcpt@example.com"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rcpt_to_requires_address() {
        assert_eq!(
            Command::try_from("RCPT TO:<>"),
            Err(CommandParseError::MalformedAddress)
        );
    }

    #[test]
    fn helo_ehlo_lhlo_command() {
        assert_eq!(
            Command::try_from("HELO mail.example.com").unwrap(),
            Command::Helo(HeloVariant::Helo("mail.example.com".to_string()))
        );
        assert_eq!(
            Command::try_from("EHLO mail.example.com").unwrap(),
            Command::Helo(HeloVariant::Ehlo("mail.example.com".to_string()))
        );
        assert_eq!(
            Command::try_from("LHLO mail.example.com").unwrap(),
            Command::Helo(HeloVariant::Lhlo("mail.example.com".to_string()))
        );
    }

    #[test]
    fn bdat_command() {
        assert_eq!(
            Command::try_from("BDAT 1024 LAST").unwrap(),
            Command::Bdat { size: 1024, last: true }
        );
        assert_eq!(
            Command::try_from("BDAT 1024").unwrap(),
            Command::Bdat { size: 1024, last: false }
        );
    }

    #[test]
    fn auth_command() {
        assert_eq!(
            Command::try_from("AUTH PLAIN dGVzdA==").unwrap(),
            Command::Auth {
                mechanism: "PLAIN".to_string(),
                initial_response: Some("dGVzdA==".to_string()),
            }
        );
        assert_eq!(
            Command::try_from("AUTH LOGIN").unwrap(),
            Command::Auth {
                mechanism: "LOGIN".to_string(),
                initial_response: None,
            }
        );
    }

    #[test]
    fn other_commands() {
        assert_eq!(Command::try_from("DATA").unwrap(), Command::Data);
        assert_eq!(Command::try_from("QUIT").unwrap(), Command::Quit);
        assert_eq!(Command::try_from("RSET").unwrap(), Command::Rset);
        assert_eq!(Command::try_from("STARTTLS").unwrap(), Command::StartTls);
        assert!(matches!(
            Command::try_from("GARBAGE"),
            Err(CommandParseError::UnknownCommand(verb)) if verb == "GARBAGE"
        ));
    }

    #[test]
    fn starttls_rejects_arguments() {
        assert_eq!(
            Command::try_from("STARTTLS foo"),
            Err(CommandParseError::InvalidParameterValue("STARTTLS"))
        );
    }
}
