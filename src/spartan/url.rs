//! `spartan://` URLs.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;
use url::{Host, Url};

/// Port used when a URL does not name one.
pub const DEFAULT_PORT: u16 = 300;

/// Errors produced while parsing a Spartan URL.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("invalid URL: {0}")]
    Syntax(#[from] url::ParseError),

    #[error("must be a spartan URL, got scheme `{0}`")]
    WrongScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("spartan URLs cannot carry credentials")]
    Userinfo,

    #[error("{0} is not a valid port number")]
    InvalidPort(u16),
}

/// A validated `spartan://host[:port][/path][?query]` URL.
///
/// Construction is the only validation point: a `SpartanUrl` value always has
/// a host, a port in 1..=65535 and a path starting with `/`. Fragments are
/// dropped since they are never sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpartanUrl {
    host: String,
    port: u16,
    path: String,
    query: Option<String>,
}

impl SpartanUrl {
    /// Parses and validates `text`.
    ///
    /// ```
    /// # use spartoi::spartan::url::SpartanUrl;
    /// let url = SpartanUrl::parse("spartan://example.com").unwrap();
    /// assert_eq!(url.host(), "example.com");
    /// assert_eq!(url.port(), 300);
    /// assert_eq!(url.path(), "/");
    /// ```
    pub fn parse(text: &str) -> Result<Self, UrlError> {
        let url = Url::parse(text)?;

        // `Url` lowercases the scheme, so match it as written
        let scheme = text.split_once(':').map_or(text, |(scheme, _)| scheme);
        if scheme != "spartan" {
            return Err(UrlError::WrongScheme(scheme.to_string()));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(UrlError::Userinfo);
        }

        let host = match url.host() {
            Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(UrlError::MissingHost),
        };

        let port = match url.port() {
            Some(0) => return Err(UrlError::InvalidPort(0)),
            Some(port) => port,
            None => DEFAULT_PORT,
        };

        let path = if url.path().is_empty() {
            "/".to_string()
        } else {
            url.path().to_string()
        };

        Ok(Self {
            host,
            port,
            path,
            query: url.query().map(str::to_string),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The path and query as sent in the request line.
    pub fn request_target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// The host as an IP address when it is a literal one.
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    /// The peer address for literal-IP hosts; `None` means the host must be
    /// resolved first.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip().map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl FromStr for SpartanUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SpartanUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spartan://")?;
        if matches!(self.ip(), Some(IpAddr::V6(_))) {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        if self.port != DEFAULT_PORT {
            write!(f, ":{}", self.port)?;
        }
        write!(f, "{}", self.request_target())
    }
}
