//! Turning an (event, status, message) triple into wire-ready response lines.

use vellum_common::status::Status;

/// Render a multi-line reply, as used for the EHLO capability list: all but
/// the last line use `<code>-<message>`, the last uses `<code> <message>`.
pub(crate) fn multi(status: Status, lines: &[String]) -> Vec<String> {
    let Some((last, rest)) = lines.split_last() else {
        return vec![format!("{status}")];
    };

    let mut out: Vec<String> = rest
        .iter()
        .map(|line| format!("{status}-{line}"))
        .collect();
    out.push(format!("{status} {last}"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_formats_code_and_message() {
        assert_eq!(multi(Status::Ok, &["queued".to_string()]), vec!["250 queued".to_string()]);
    }

    #[test]
    fn multiline_uses_dash_except_last() {
        let lines = vec!["mail.example.com".to_string(), "SIZE 1024".to_string(), "PIPELINING".to_string()];
        let rendered = multi(Status::Ok, &lines);
        assert_eq!(
            rendered,
            vec![
                "250-mail.example.com".to_string(),
                "250-SIZE 1024".to_string(),
                "250 PIPELINING".to_string(),
            ]
        );
    }
}
