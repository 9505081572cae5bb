//! Property-based tests for SMTP command parsing.
//!
//! Unrecognised verbs are a parse error (`CommandParseError::UnknownCommand`),
//! distinct from a command that parses fine but is out of place in the
//! current session state (the state machine's job, not the parser's).

use proptest::prelude::*;
use vellum_smtp::command::CommandParseError;
use vellum_smtp::Command;

fn domain_strategy() -> impl Strategy<Value = String> {
    #[allow(clippy::expect_used, reason = "compile-time constant regex should be valid")]
    let regex = prop::string::string_regex("[a-z]{3,10}\\.[a-z]{2,5}").expect("domain regex should be valid");
    regex.prop_map(|s| s.to_lowercase())
}

/// RFC 5321 Dot-string: one or more atoms of atext, joined by single dots.
fn email_local_strategy() -> impl Strategy<Value = String> {
    #[allow(clippy::expect_used, reason = "compile-time constant regex should be valid")]
    let atom_regex = prop::string::string_regex("[a-z0-9+_-]{1,10}").expect("atom regex should be valid");
    prop::collection::vec(atom_regex, 1..=3).prop_map(|atoms| atoms.join("."))
}

fn email_strategy() -> impl Strategy<Value = String> {
    (email_local_strategy(), domain_strategy()).prop_map(|(local, domain)| format!("{local}@{domain}"))
}

fn simple_command_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("QUIT".to_string()),
        Just("RSET".to_string()),
        Just("DATA".to_string()),
        Just("HELP".to_string()),
        Just("STARTTLS".to_string()),
        Just("AUTH".to_string()),
    ]
}

fn helo_command_strategy() -> impl Strategy<Value = String> {
    (prop_oneof![Just("HELO"), Just("EHLO")], domain_strategy()).prop_map(|(cmd, domain)| format!("{cmd} {domain}"))
}

fn mail_from_strategy() -> impl Strategy<Value = String> {
    email_strategy().prop_map(|email| format!("MAIL FROM:<{email}>"))
}

fn rcpt_to_strategy() -> impl Strategy<Value = String> {
    email_strategy().prop_map(|email| format!("RCPT TO:<{email}>"))
}

fn command_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        simple_command_strategy(),
        helo_command_strategy(),
        mail_from_strategy(),
        rcpt_to_strategy(),
    ]
}

proptest! {
    #[test]
    fn test_simple_commands_parse(cmd in simple_command_strategy()) {
        let parsed = Command::try_from(cmd.as_str());
        prop_assert!(parsed.is_ok(), "failed to parse command: {cmd}");
    }

    #[test]
    fn test_helo_commands_parse(cmd in helo_command_strategy()) {
        let parsed = Command::try_from(cmd.as_str());
        prop_assert!(matches!(parsed, Ok(Command::Helo(_))), "failed to parse HELO/EHLO: {cmd}");
    }

    #[test]
    fn test_mail_from_parses(cmd in mail_from_strategy()) {
        let parsed = Command::try_from(cmd.as_str());
        prop_assert!(matches!(parsed, Ok(Command::MailFrom(Some(_), _))), "failed to parse MAIL FROM: {cmd}");
    }

    #[test]
    fn test_rcpt_to_parses(cmd in rcpt_to_strategy()) {
        let parsed = Command::try_from(cmd.as_str());
        match parsed {
            Ok(Command::RcptTo(addrs, _)) => prop_assert_eq!(addrs.0.len(), 1),
            other => prop_assert!(false, "failed to parse RCPT TO: {cmd} -> {other:?}"),
        }
    }

    #[test]
    fn test_case_insensitive_parsing(cmd in simple_command_strategy()) {
        let lower = cmd.to_lowercase();
        let upper = cmd.to_uppercase();
        let mixed = cmd.chars().enumerate().map(|(i, c)| {
            if i % 2 == 0 { c.to_lowercase().to_string() } else { c.to_uppercase().to_string() }
        }).collect::<String>();

        let lower_result = Command::try_from(lower.as_str());
        let upper_result = Command::try_from(upper.as_str());
        let mixed_result = Command::try_from(mixed.as_str());

        prop_assert!(lower_result.is_ok(), "failed to parse lowercase: {lower}");
        prop_assert!(upper_result.is_ok(), "failed to parse uppercase: {upper}");
        prop_assert!(mixed_result.is_ok(), "failed to parse mixed case: {mixed}");

        #[allow(clippy::unwrap_used, reason = "checked with prop_assert above")]
        let lower_cmd = lower_result.unwrap();
        #[allow(clippy::unwrap_used, reason = "checked with prop_assert above")]
        let upper_cmd = upper_result.unwrap();
        #[allow(clippy::unwrap_used, reason = "checked with prop_assert above")]
        let mixed_cmd = mixed_result.unwrap();

        prop_assert_eq!(std::mem::discriminant(&lower_cmd), std::mem::discriminant(&upper_cmd));
        prop_assert_eq!(std::mem::discriminant(&lower_cmd), std::mem::discriminant(&mixed_cmd));
    }

    /// Verbs outside the known set are a parse error, not a parsed variant.
    #[test]
    fn test_unknown_verbs_are_errors(s in {
        #[allow(clippy::expect_used, reason = "compile-time constant regex should be valid")]
        let regex = prop::string::string_regex("[A-Z]{1,20}").expect("invalid command regex should be valid");
        regex
    }) {
        let known = [
            "HELO", "EHLO", "LHLO", "MAIL", "RCPT", "DATA", "BDAT", "RSET",
            "NOOP", "VRFY", "EXPN", "HELP", "STARTTLS", "QUIT", "AUTH",
        ];
        prop_assume!(!known.contains(&s.as_str()));

        let parsed = Command::try_from(s.as_str());
        prop_assert!(
            matches!(parsed, Err(CommandParseError::UnknownCommand(_))),
            "unexpected result for {s}: {parsed:?}"
        );
    }

    #[test]
    fn test_email_address_characters(email in email_strategy()) {
        let mail_from = format!("MAIL FROM:<{email}>");
        let result = Command::try_from(mail_from.as_str());
        match result {
            Ok(Command::MailFrom(Some(addr), _)) => prop_assert!(addr.to_string().contains(&email)),
            other => prop_assert!(false, "failed to parse email: {email} -> {other:?}"),
        }
    }

    /// Trailing whitespace is swallowed by the arg split and doesn't change
    /// which variant a command parses to.
    #[test]
    fn test_trailing_whitespace(cmd in command_strategy()) {
        let with_whitespace = format!("{cmd}   ");
        let plain = Command::try_from(cmd.as_str());
        let padded = Command::try_from(with_whitespace.as_str());
        prop_assert!(padded.is_ok(), "failed to parse command with trailing whitespace: {cmd}");
        prop_assert_eq!(
            std::mem::discriminant(plain.as_ref().unwrap()),
            std::mem::discriminant(padded.as_ref().unwrap()),
        );
    }

    /// A leading space shifts the verb into an empty first token, so the
    /// line fails to parse rather than parsing normally. This documents that
    /// behaviour rather than asserting success.
    #[test]
    fn test_leading_whitespace_yields_unknown_command(cmd in command_strategy()) {
        let with_whitespace = format!(" {cmd}");
        let result = Command::try_from(with_whitespace.as_str());
        prop_assert!(
            matches!(result, Err(CommandParseError::UnknownCommand(_))),
            "expected UnknownCommand for {cmd:?}, got {result:?}"
        );
    }
}
