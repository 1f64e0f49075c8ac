//! Parsing of Tor control-port replies.
//!
//! Replies are CRLF lines of the form `NNN<sep>text` where `sep` is `-`
//! (more lines follow), `+` (a data block follows, terminated by a lone `.`)
//! or space (final line).

use crate::error::{Error, Result};

/// One complete reply from the control port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    status: u16,
    lines: Vec<String>,
}

impl Reply {
    /// Status code of the final line.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the reply ended in `250`.
    pub fn is_ok(&self) -> bool {
        self.status == 250
    }

    /// Whether Tor did not recognize a GETINFO key.
    pub fn is_unrecognized(&self) -> bool {
        self.status == 552
    }

    /// Lines as received, without line terminators.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The final status line.
    pub fn last_line(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or_default()
    }

    /// The reply as newline-joined text.
    pub fn text(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

/// Incremental assembler for a reply, fed one line at a time.
#[derive(Debug, Default)]
pub struct ReplyBuilder {
    lines: Vec<String>,
    in_data: bool,
}

impl ReplyBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one line (terminator already stripped). Returns the reply once
    /// its final line has arrived.
    pub fn push_line(&mut self, line: &str) -> Result<Option<Reply>> {
        if line.is_empty() && !self.in_data {
            return Ok(None);
        }
        self.lines.push(line.to_string());

        if self.in_data {
            if line == "." {
                self.in_data = false;
            }
            return Ok(None);
        }

        let (status, separator) = parse_status(line)?;
        match separator {
            b'-' => Ok(None),
            b'+' => {
                self.in_data = true;
                Ok(None)
            }
            _ => Ok(Some(Reply {
                status,
                lines: std::mem::take(&mut self.lines),
            })),
        }
    }
}

fn parse_status(line: &str) -> Result<(u16, u8)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(Error::Control(format!("malformed reply line: {:?}", line)));
    }
    let status = line[..3]
        .parse()
        .map_err(|_| Error::Control(format!("malformed status: {:?}", line)))?;
    match bytes.get(3).copied() {
        None | Some(b' ') => Ok((status, b' ')),
        Some(sep @ (b'-' | b'+')) => Ok((status, sep)),
        Some(_) => Err(Error::Control(format!("malformed reply line: {:?}", line))),
    }
}

/// Fields of a PROTOCOLINFO reply used for authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolInfo {
    /// Available authentication methods.
    pub auth_methods: Vec<String>,
    /// Path to control port cookie file for authentication.
    pub cookie_file: Option<String>,
    /// Tor version, when reported.
    pub tor_version: Option<String>,
}

impl ProtocolInfo {
    /// Parse a PROTOCOLINFO reply text.
    pub fn parse(text: &str) -> Self {
        let mut info = Self::default();

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            let body = line.get(4..).unwrap_or_default();

            // AUTH METHODS=COOKIE,SAFECOOKIE COOKIEFILE="/path"
            if let Some(auth_part) = body.strip_prefix("AUTH ") {
                if let Some(methods_start) = auth_part.find("METHODS=") {
                    let after_methods = &auth_part[methods_start + 8..];
                    let methods_end = after_methods.find(' ').unwrap_or(after_methods.len());
                    info.auth_methods = after_methods[..methods_end]
                        .split(',')
                        .filter(|m| !m.is_empty())
                        .map(|m| m.to_ascii_uppercase())
                        .collect();
                }
                if let Some(cookie_start) = auth_part.find("COOKIEFILE=\"") {
                    info.cookie_file = unquote(&auth_part[cookie_start + 11..]);
                }
            } else if let Some(version_part) = body.strip_prefix("VERSION ") {
                if let Some(start) = version_part.find("Tor=\"") {
                    info.tor_version = unquote(&version_part[start + 4..]);
                }
            }
        }

        info
    }

    /// Whether `method` was advertised.
    pub fn supports(&self, method: &str) -> bool {
        self.auth_methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}

/// Read a control-protocol quoted string starting at its opening quote.
fn unquote(s: &str) -> Option<String> {
    let mut chars = s.strip_prefix('"')?.chars();
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(out),
            '\\' => out.push(chars.next()?),
            other => out.push(other),
        }
    }
    None
}

/// Extract the value of `key` from a GETINFO reply text.
///
/// Handles `250-key=value`, `250 key=value` and the data-block form
/// `250+key=` … `.`. Returns `None` when Tor answered `552` or the key is
/// absent.
pub fn parse_getinfo_value(text: &str, key: &str) -> Option<String> {
    let single = format!("{}=", key);
    let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));

    while let Some(line) = lines.next() {
        if line.starts_with("552") {
            return None;
        }
        if let Some(rest) = line.strip_prefix("250-").or_else(|| line.strip_prefix("250 ")) {
            if let Some(value) = rest.strip_prefix(&single) {
                return Some(value.to_string());
            }
        } else if let Some(rest) = line.strip_prefix("250+") {
            if let Some(first) = rest.strip_prefix(&single) {
                let mut value: Vec<&str> = Vec::new();
                if !first.is_empty() {
                    value.push(first);
                }
                for data in lines.by_ref() {
                    if data == "." {
                        break;
                    }
                    // Leading dots are doubled inside data blocks.
                    value.push(data.strip_prefix('.').filter(|d| d.starts_with('.')).unwrap_or(data));
                }
                return Some(value.join("\n"));
            }
        }
    }

    None
}

/// Normalize an onion listing into lowercase bare hostnames.
///
/// Accepts entries separated by whitespace, commas or newlines, with or
/// without the `.onion` suffix. Duplicates are dropped, order is kept.
pub fn normalize_onion_list(value: &str) -> Vec<String> {
    let mut onions: Vec<String> = Vec::new();
    for entry in value.split(|c: char| c.is_whitespace() || c == ',') {
        let entry = entry.trim().to_ascii_lowercase();
        let bare = entry.strip_suffix(".onion").unwrap_or(&entry);
        if !bare.is_empty() && !onions.iter().any(|o| o == bare) {
            onions.push(bare.to_string());
        }
    }
    onions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(lines: &[&str]) -> Reply {
        let mut builder = ReplyBuilder::new();
        for (i, line) in lines.iter().enumerate() {
            let done = builder.push_line(line).expect("well formed");
            if i + 1 == lines.len() {
                return done.expect("complete reply");
            }
            assert!(done.is_none(), "reply ended early at line {}", i);
        }
        panic!("no lines");
    }

    #[test]
    fn test_reply_builder_single_and_multi() {
        let reply = build(&["250 OK"]);
        assert!(reply.is_ok());

        let reply = build(&["250-version=0.4.8.9", "250 OK"]);
        assert_eq!(reply.lines().len(), 2);
        assert_eq!(reply.last_line(), "250 OK");
    }

    #[test]
    fn test_reply_builder_data_block() {
        // A "250 " line inside the data block must not end the reply.
        let reply = build(&["250+foo=", "250 not the end", ".", "250 OK"]);
        assert_eq!(reply.lines().len(), 4);
        assert!(reply.is_ok());
    }

    #[test]
    fn test_reply_builder_error_status() {
        let reply = build(&["552 Unrecognized key \"bogus\""]);
        assert!(!reply.is_ok());
        assert!(reply.is_unrecognized());

        let mut builder = ReplyBuilder::new();
        assert!(builder.push_line("garbage").is_err());
    }

    #[test]
    fn test_parse_protocolinfo() {
        let text = "250-PROTOCOLINFO 1\r\n\
                    250-AUTH METHODS=COOKIE,SAFECOOKIE COOKIEFILE=\"/run/tor/control.authcookie\"\r\n\
                    250-VERSION Tor=\"0.4.8.9\"\r\n\
                    250 OK\r\n";
        let info = ProtocolInfo::parse(text);
        assert_eq!(info.auth_methods, vec!["COOKIE", "SAFECOOKIE"]);
        assert_eq!(info.cookie_file.as_deref(), Some("/run/tor/control.authcookie"));
        assert_eq!(info.tor_version.as_deref(), Some("0.4.8.9"));
        assert!(info.supports("cookie"));
        assert!(!info.supports("NULL"));
    }

    #[test]
    fn test_parse_protocolinfo_escaped_cookie_path() {
        let text = "250-AUTH METHODS=COOKIE COOKIEFILE=\"C:\\\\Tor\\\\cookie \\\"x\\\"\"\n250 OK\n";
        let info = ProtocolInfo::parse(text);
        assert_eq!(info.cookie_file.as_deref(), Some("C:\\Tor\\cookie \"x\""));
    }

    #[test]
    fn test_parse_protocolinfo_null_auth() {
        let info = ProtocolInfo::parse("250-AUTH METHODS=NULL\n250 OK\n");
        assert_eq!(info.auth_methods, vec!["NULL"]);
        assert_eq!(info.cookie_file, None);
    }

    #[test]
    fn test_getinfo_single_line() {
        let text = "250-version=0.4.8.9 (git-abc)\r\n250 OK\r\n";
        assert_eq!(
            parse_getinfo_value(text, "version").as_deref(),
            Some("0.4.8.9 (git-abc)")
        );
        assert_eq!(parse_getinfo_value(text, "other"), None);
    }

    #[test]
    fn test_getinfo_multi_line() {
        let text = "250+foo=\nline1\nline2\n.\n250 OK\n";
        assert_eq!(parse_getinfo_value(text, "foo").as_deref(), Some("line1\nline2"));
    }

    #[test]
    fn test_getinfo_dot_unescaping() {
        let text = "250+foo=\r\n..hidden\r\n.\r\n250 OK\r\n";
        assert_eq!(parse_getinfo_value(text, "foo").as_deref(), Some(".hidden"));
    }

    #[test]
    fn test_getinfo_unrecognized() {
        let text = "552 Unrecognized key \"onions/current\"\r\n";
        assert_eq!(parse_getinfo_value(text, "onions/current"), None);
    }

    #[test]
    fn test_getinfo_empty_value() {
        let text = "250-onions/current=\r\n250 OK\r\n";
        assert_eq!(parse_getinfo_value(text, "onions/current").as_deref(), Some(""));
    }

    #[test]
    fn test_normalize_onion_list() {
        let raw = "ABC.onion, def\nghi.ONION  abc.onion\n\n";
        assert_eq!(normalize_onion_list(raw), vec!["abc", "def", "ghi"]);
        assert!(normalize_onion_list("").is_empty());
    }
}
