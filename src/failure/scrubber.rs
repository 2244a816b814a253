//! Removes IP addresses from error messages.
//!
//! Some TLS and socket errors embed the remote (or local) endpoint in their
//! text. Unknown failures carry that text into shared measurement results,
//! so every embedded address is replaced first.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::net::{IpAddr, SocketAddr};

/// Replacement for every scrubbed address.
pub const SCRUBBED: &str = "[scrubbed]";

// Candidates are validated by parsing, the regex only finds them.
static CANDIDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[[0-9A-Za-z:.%]+\](?::[0-9]+)?|[0-9A-Fa-f:.]{3,}")
        .expect("static regex")
});

/// Replaces IPv4 and IPv6 addresses (with or without port) in `message`.
pub fn scrub(message: &str) -> String {
    CANDIDATE
        .replace_all(message, |caps: &Captures| {
            let token = &caps[0];
            let trimmed = token.trim_end_matches(['.', ':']);
            if is_address(trimmed) {
                format!("{}{}", SCRUBBED, &token[trimmed.len()..])
            } else {
                token.to_string()
            }
        })
        .into_owned()
}

fn is_address(token: &str) -> bool {
    if token.parse::<SocketAddr>().is_ok() || token.parse::<IpAddr>().is_ok() {
        return true;
    }
    token
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .and_then(|t| t.split('%').next())
        .is_some_and(|t| t.parse::<IpAddr>().is_ok())
}
