//! Detection of the caller's public address for the bastion firewall rule.

use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Default plain-text lookup endpoint.
pub const DEFAULT_PUBLIC_IP_URL: &str = "https://checkip.amazonaws.com";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while detecting the public address.
#[derive(Debug, Error)]
pub enum PublicIpError {
    /// Raised when the lookup request fails or returns a non-success status.
    #[error("public IP lookup against {url} failed: {source}")]
    Request {
        /// Endpoint queried.
        url: String,
        /// HTTP client error.
        #[source]
        source: reqwest::Error,
    },
    /// Raised when the response body is not an IP address.
    #[error("public IP lookup returned an unexpected body: {body:?}")]
    Malformed {
        /// Trimmed response body.
        body: String,
    },
}

/// Source of the caller's public address.
pub trait PublicIpDetector {
    /// Returns the address other hosts see for this machine.
    ///
    /// # Errors
    ///
    /// Returns [`PublicIpError`] when the address cannot be determined.
    fn detect(&self) -> Result<IpAddr, PublicIpError>;
}

impl<D: PublicIpDetector + ?Sized> PublicIpDetector for &D {
    fn detect(&self) -> Result<IpAddr, PublicIpError> {
        (**self).detect()
    }
}

/// Queries an HTTP endpoint that answers with the caller's address as text.
#[derive(Clone, Debug)]
pub struct HttpPublicIpDetector {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpPublicIpDetector {
    /// Creates a detector for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            url: url.into(),
            client,
        }
    }
}

impl PublicIpDetector for HttpPublicIpDetector {
    fn detect(&self) -> Result<IpAddr, PublicIpError> {
        let request_error = |source| PublicIpError::Request {
            url: self.url.clone(),
            source,
        };
        let body = self
            .client
            .get(&self.url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(reqwest::blocking::Response::text)
            .map_err(request_error)?;
        let ip = parse_ip(&body)?;
        debug!(%ip, "detected public address");
        Ok(ip)
    }
}

/// Parses a lookup response body, ignoring surrounding whitespace.
///
/// # Errors
///
/// Returns [`PublicIpError::Malformed`] when the body is not an address.
pub fn parse_ip(body: &str) -> Result<IpAddr, PublicIpError> {
    let trimmed = body.trim();
    trimmed.parse().map_err(|_| PublicIpError::Malformed {
        body: trimmed.to_owned(),
    })
}

/// Single-host CIDR for `ip`: `/32` for IPv4, `/128` for IPv6.
#[must_use]
pub fn access_cidr(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{v4}/32"),
        IpAddr::V6(v6) => format!("{v6}/128"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("203.0.113.7\n", "203.0.113.7/32")]
    #[case("  198.51.100.1  ", "198.51.100.1/32")]
    #[case("2001:db8::1\n", "2001:db8::1/128")]
    fn lookup_bodies_become_single_host_cidrs(#[case] body: &str, #[case] expected: &str) {
        let ip = parse_ip(body).expect("parse");
        assert_eq!(access_cidr(ip), expected);
    }

    #[rstest]
    #[case("")]
    #[case("<html>blocked</html>")]
    #[case("203.0.113.7/32")]
    fn malformed_bodies_are_rejected(#[case] body: &str) {
        let err = parse_ip(body).expect_err("should fail");
        assert!(matches!(err, PublicIpError::Malformed { .. }));
    }
}
