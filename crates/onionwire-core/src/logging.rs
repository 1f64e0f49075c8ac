//! Logging helpers that keep secrets out of log output.
//!
//! Seeds, auth cookies and full onion addresses are wrapped in these types
//! before they are handed to `tracing`.

use std::fmt;

/// A wrapper that redacts sensitive data when displayed.
pub struct Redacted<T>(pub T);

impl<T> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Shortened onion address: first 6 and last 4 characters of the hostname.
pub struct RedactedOnion<'a>(pub &'a str);

impl<'a> fmt::Display for RedactedOnion<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = self.0.strip_suffix(".onion").unwrap_or(self.0);
        if host.len() > 12 && host.is_ascii() {
            write!(f, "{}...{}.onion", &host[..6], &host[host.len() - 4..])
        } else {
            write!(f, "[REDACTED ONION]")
        }
    }
}

impl<'a> fmt::Debug for RedactedOnion<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Redact a byte slice, showing only length.
pub struct RedactedBytes<'a>(pub &'a [u8]);

impl<'a> fmt::Display for RedactedBytes<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} bytes]", self.0.len())
    }
}

impl<'a> fmt::Debug for RedactedBytes<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Control-port command text safe for logging.
///
/// `AUTHENTICATE` arguments are cookie or password material and are dropped.
pub fn sanitize_command(command: &str) -> String {
    match command.split_once(' ') {
        Some((verb, _)) if verb.eq_ignore_ascii_case("AUTHENTICATE") => {
            format!("{} [REDACTED]", verb)
        }
        _ => command.to_string(),
    }
}
