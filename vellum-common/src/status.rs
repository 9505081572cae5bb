use core::fmt::{self, Display, Formatter};

/// SMTP reply status codes, named by the role they play rather than the
/// bare number, matching RFC 5321 §4.2 and the extensions this engine
/// implements (RFC 4954 AUTH, RFC 3207 STARTTLS).
#[repr(C, u32)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    ConnectionError = 101,
    #[allow(clippy::enum_variant_names)]
    SystemStatus = 211,
    HelpMessage = 215,
    ServiceReady = 220,
    GoodBye = 221,
    Continue = 334,
    Ok = 250,
    AuthSuccess = 235,
    StartMailInput = 354,
    Unavailable = 421,
    ActionUnavailable = 451,
    CommandUnrecognized = 500,
    Syntax = 501,
    CannotVrfy = 252,
    AuthRequired = 530,
    InvalidCommandSequence = 503,
    AuthFailure = 535,
    AuthRequireTls = 538,
    Error = 550,
    ExceededStorage = 552,
    Unknown(u32),
}

impl Status {
    /// Checks if the status is a permanent rejection.
    #[must_use]
    pub fn is_permanent(self) -> bool {
        u32::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection.
    #[must_use]
    pub fn is_temporary(self) -> bool {
        (400..500).contains(&u32::from(self))
    }
}

impl From<u32> for Status {
    fn from(value: u32) -> Self {
        match value {
            101 => Self::ConnectionError,
            211 => Self::SystemStatus,
            215 => Self::HelpMessage,
            220 => Self::ServiceReady,
            221 => Self::GoodBye,
            235 => Self::AuthSuccess,
            250 => Self::Ok,
            252 => Self::CannotVrfy,
            334 => Self::Continue,
            354 => Self::StartMailInput,
            421 => Self::Unavailable,
            451 => Self::ActionUnavailable,
            500 => Self::CommandUnrecognized,
            501 => Self::Syntax,
            503 => Self::InvalidCommandSequence,
            530 => Self::AuthRequired,
            535 => Self::AuthFailure,
            538 => Self::AuthRequireTls,
            550 => Self::Error,
            552 => Self::ExceededStorage,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Status> for u32 {
    fn from(value: Status) -> Self {
        match value {
            Status::ConnectionError => 101,
            Status::SystemStatus => 211,
            Status::HelpMessage => 215,
            Status::ServiceReady => 220,
            Status::GoodBye => 221,
            Status::AuthSuccess => 235,
            Status::Ok => 250,
            Status::CannotVrfy => 252,
            Status::Continue => 334,
            Status::StartMailInput => 354,
            Status::Unavailable => 421,
            Status::ActionUnavailable => 451,
            Status::CommandUnrecognized => 500,
            Status::Syntax => 501,
            Status::InvalidCommandSequence => 503,
            Status::AuthRequired => 530,
            Status::AuthFailure => 535,
            Status::AuthRequireTls => 538,
            Status::Error => 550,
            Status::ExceededStorage => 552,
            Status::Unknown(v) => v,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u32::from(*self))
    }
}

#[cfg(test)]
mod test {
    use super::Status;

    #[test]
    fn classification() {
        assert!(Status::Error.is_permanent());
        assert!(!Status::Error.is_temporary());

        assert!(Status::Unavailable.is_temporary());
        assert!(!Status::Unavailable.is_permanent());

        assert!(Status::AuthRequired.is_permanent());
        assert!(Status::AuthFailure.is_permanent());
    }

    #[test]
    fn round_trip() {
        assert_eq!(Status::from(550), Status::Error);
        assert_eq!(u32::from(Status::Error), 550);
        assert_eq!(Status::from(538), Status::AuthRequireTls);
        assert_eq!(Status::from(500), Status::CommandUnrecognized);
        assert_eq!(Status::from(9999), Status::Unknown(9999));
    }

    #[test]
    fn display_prints_numeric_code() {
        assert_eq!(Status::ServiceReady.to_string(), "220");
    }
}
