use crate::address::{Address, AddressList};

/// Per-message state collected between `MAIL FROM` and a completed `DATA`.
///
/// One envelope is ever in flight per [`crate::Signal`]-scoped session; it is
/// replaced wholesale by RSET, a fresh HELO/EHLO, successful DATA delivery,
/// or disconnect. Never reused across messages.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    mail_from: Option<Address>,
    mail_options: Vec<String>,
    smtp_utf8: bool,
    content: Option<Vec<u8>>,
    original_content: Option<Vec<u8>>,
    rcpt_tos: AddressList,
    rcpt_options: Vec<Vec<String>>,
}

impl Envelope {
    #[must_use]
    pub const fn mail_from(&self) -> Option<&Address> {
        self.mail_from.as_ref()
    }

    pub const fn mail_from_mut(&mut self) -> &mut Option<Address> {
        &mut self.mail_from
    }

    #[must_use]
    pub fn mail_options(&self) -> &[String] {
        &self.mail_options
    }

    pub fn mail_options_mut(&mut self) -> &mut Vec<String> {
        &mut self.mail_options
    }

    #[must_use]
    pub const fn smtp_utf8(&self) -> bool {
        self.smtp_utf8
    }

    pub const fn set_smtp_utf8(&mut self, value: bool) {
        self.smtp_utf8 = value;
    }

    #[must_use]
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    pub const fn content_mut(&mut self) -> &mut Option<Vec<u8>> {
        &mut self.content
    }

    #[must_use]
    pub fn original_content(&self) -> Option<&[u8]> {
        self.original_content.as_deref()
    }

    pub const fn original_content_mut(&mut self) -> &mut Option<Vec<u8>> {
        &mut self.original_content
    }

    #[must_use]
    pub const fn rcpt_tos(&self) -> &AddressList {
        &self.rcpt_tos
    }

    pub const fn rcpt_tos_mut(&mut self) -> &mut AddressList {
        &mut self.rcpt_tos
    }

    #[must_use]
    pub fn rcpt_options(&self) -> &[Vec<String>] {
        &self.rcpt_options
    }

    pub fn rcpt_options_mut(&mut self) -> &mut Vec<Vec<String>> {
        &mut self.rcpt_options
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_envelope_is_empty() {
        let env = Envelope::default();
        assert!(env.mail_from().is_none());
        assert!(env.rcpt_tos().is_empty());
        assert!(env.content().is_none());
        assert!(!env.smtp_utf8());
    }

    #[test]
    fn accumulates_recipients_in_order() {
        let mut env = Envelope::default();
        let first: AddressList = mailparse::addrparse("a@b.com").unwrap().into();
        let second: AddressList = mailparse::addrparse("c@d.com").unwrap().into();
        env.rcpt_tos_mut().extend_from_slice(&first[..]);
        env.rcpt_tos_mut().extend_from_slice(&second[..]);
        assert_eq!(env.rcpt_tos().to_string(), "a@b.com, c@d.com");
    }
}
