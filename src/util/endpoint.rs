use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Reasons an outbound endpoint is refused.
///
/// Topic URLs and hub URLs come from users or from third-party documents, so
/// they are checked before any request is made (SSRF protection).
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host: {0}")]
    MissingHost(String),
    #[error("localhost not allowed: {0}")]
    Localhost(String),
    #[error("private IP address not allowed: {0}")]
    PrivateIp(IpAddr),
}

/// Which outbound endpoints may be contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointPolicy {
    /// Allow localhost and private/link-local addresses
    pub allow_private_hosts: bool,
}

impl EndpointPolicy {
    /// Policy that still requires http(s) but accepts any host.
    pub fn permissive() -> Self {
        Self {
            allow_private_hosts: true,
        }
    }

    /// Checks an outbound URL.
    ///
    /// # Errors
    ///
    /// - [`EndpointError::UnsupportedScheme`] - scheme is not `http` or `https`
    /// - [`EndpointError::MissingHost`] - URL has no host
    /// - [`EndpointError::Localhost`] / [`EndpointError::PrivateIp`] - private
    ///   destination while `allow_private_hosts` is off
    pub fn check(&self, url: &Url) -> Result<(), EndpointError> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(EndpointError::UnsupportedScheme(scheme.to_owned())),
        }

        let host = url
            .host()
            .ok_or_else(|| EndpointError::MissingHost(url.to_string()))?;

        if self.allow_private_hosts {
            return Ok(());
        }

        let ip = match host {
            Host::Domain(domain) => {
                let domain = domain.trim_end_matches('.');
                if domain.eq_ignore_ascii_case("localhost")
                    || domain.to_ascii_lowercase().ends_with(".localhost")
                {
                    return Err(EndpointError::Localhost(domain.to_owned()));
                }
                return Ok(());
            }
            Host::Ipv4(ip) => IpAddr::V4(ip),
            Host::Ipv6(ip) => match ip.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(ip),
            },
        };

        if ip.is_loopback() {
            return Err(EndpointError::Localhost(ip.to_string()));
        }
        if is_private_ip(&ip) {
            return Err(EndpointError::PrivateIp(ip));
        }
        Ok(())
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_unspecified() {
                return true;
            }
            let first = ipv6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link-local
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}
