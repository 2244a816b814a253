//! `host:port` handling.

use crate::{Error, Result};

/// Split `host:port`, `[host]:port` or `[v6]:port` into host and port.
///
/// The port may be empty (`host:`); a missing port is an error.
pub fn split_host_port(address: &str) -> Result<(String, String)> {
    if let Some(rest) = address.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| Error::InvalidAddress(format!("{}: missing ']'", address)))?;
        let host = &rest[..end];
        return match &rest[end + 1..] {
            "" => Err(Error::MissingPort(address.to_string())),
            tail => match tail.strip_prefix(':') {
                Some(port) if !port.contains(':') => Ok((host.to_string(), port.to_string())),
                _ => Err(Error::InvalidAddress(format!(
                    "{}: unexpected text after ']'",
                    address
                ))),
            },
        };
    }

    match address.rfind(':') {
        None => Err(Error::MissingPort(address.to_string())),
        Some(idx) => {
            let host = &address[..idx];
            if host.contains(':') {
                return Err(Error::InvalidAddress(format!(
                    "{}: too many colons",
                    address
                )));
            }
            Ok((host.to_string(), address[idx + 1..].to_string()))
        }
    }
}

/// Join host and port, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        let ok = [
            ("example.com:443", ("example.com", "443")),
            ("1.1.1.1:853", ("1.1.1.1", "853")),
            ("[::1]:80", ("::1", "80")),
            ("[fe80::1%eth0]:80", ("fe80::1%eth0", "80")),
            ("example.com:", ("example.com", "")),
        ];
        for (address, (host, port)) in ok {
            let (h, p) = split_host_port(address).unwrap();
            assert_eq!((h.as_str(), p.as_str()), (host, port), "{address}");
        }
    }

    #[test]
    fn test_split_host_port_errors() {
        assert!(matches!(
            split_host_port("example.com"),
            Err(Error::MissingPort(_))
        ));
        assert!(matches!(split_host_port("[::1]"), Err(Error::MissingPort(_))));
        assert!(matches!(
            split_host_port("::1:443"),
            Err(Error::InvalidAddress(_))
        ));
        assert!(matches!(
            split_host_port("[::1:443"),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_join_host_port() {
        assert_eq!(join_host_port("example.com", "443"), "example.com:443");
        assert_eq!(join_host_port("::1", "53"), "[::1]:53");
        let (host, port) = split_host_port(&join_host_port("2001:db8::1", "853")).unwrap();
        assert_eq!((host.as_str(), port.as_str()), ("2001:db8::1", "853"));
    }
}
