use crate::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static URI_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<scheme>[a-zA-Z][a-zA-Z0-9+.\-]*)://(?:[^@/?#]*@)?(?P<host>\[[0-9a-fA-F:.]+\]|[0-9a-zA-Z.\-_~%]+)(?::(?P<port>\d+))?(?P<path>[/?][^#]*)?(?:#.*)?$").unwrap()
});
static ABSOLUTE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://").unwrap());

/// URL schemes the transport can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

/// An absolute URL split into the parts a single round trip needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: Scheme,
    /// Host as written in the URL (IPv6 literals keep their brackets).
    pub host: String,
    /// Port, if the URL spells one out.
    pub port: Option<u16>,
    /// Path and query, always starting with `/`.
    pub path: String,
}

impl Target {
    /// Split an absolute `http(s)://` URL.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidInput`] if the URL is empty, relative, not http(s), or its path
    /// holds spaces or control characters.
    pub fn parse(url: &str) -> Result<Self, Error> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::invalid_input("request url must not be empty"));
        }
        let parts = URI_REGEX
            .captures(url)
            .ok_or_else(|| Error::invalid_input(format!("not an absolute url: {url}")))?;

        let scheme = match parts["scheme"].to_ascii_lowercase().as_str() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(Error::invalid_input(format!("unsupported scheme: {other}"))),
        };
        let host = parts["host"].to_ascii_lowercase();
        let port = parts
            .name("port")
            .map(|m| m.as_str().parse::<u16>())
            .transpose()
            .map_err(|_| Error::invalid_input(format!("invalid port in url: {url}")))?;
        let path = match parts.name("path").map_or("", |m| m.as_str()) {
            "" => "/".to_string(),
            p if p.starts_with('?') => format!("/{p}"),
            p => p.to_string(),
        };
        // the path goes into the request line verbatim
        if path.chars().any(|c| c.is_control() || c == ' ') {
            return Err(Error::invalid_input(format!("unescaped characters in url path: {url:?}")));
        }

        Ok(Self {
            scheme,
            host,
            port,
            path,
        })
    }

    /// Port to connect to: the explicit one, or the scheme default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// Host without IPv6 brackets, suitable for resolution and TLS server names.
    pub fn hostname(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }

    /// `host[:port]`, as sent in the `host` header.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        }
    }

    /// `scheme://host[:port]`.
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme, self.authority())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.origin(), self.path)
    }
}

/// Whether `url` already names its own scheme and host.
pub(crate) fn is_absolute(url: &str) -> bool {
    ABSOLUTE_REGEX.is_match(url)
}

/// Turn a `Location` header into the next URL, relative to the hop that received it.
pub(crate) fn resolve(base: &Target, location: &str) -> String {
    let location = location.trim();
    if is_absolute(location) {
        return location.to_string();
    }
    if let Some(rest) = location.strip_prefix("//") {
        return format!("{}://{rest}", base.scheme);
    }
    if location.starts_with('/') {
        return format!("{}{location}", base.origin());
    }

    // relative reference: replace everything after the last '/' of the current path
    let path = base.path.split('?').next().unwrap_or("/");
    if location.starts_with('?') {
        return format!("{}{path}{location}", base.origin());
    }
    let directory = path.rfind('/').map_or("/", |i| &path[..=i]);
    format!("{}{directory}{location}", base.origin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_url() {
        let target = Target::parse("HTTPS://Example.org:8443/a/b?c=d#frag").unwrap();
        assert_eq!(target.scheme, Scheme::Https);
        assert_eq!(target.host, "example.org");
        assert_eq!(target.port, Some(8443));
        assert_eq!(target.path, "/a/b?c=d");
        assert_eq!(target.authority(), "example.org:8443");
    }

    #[test]
    fn parse_defaults() {
        let target = Target::parse("http://example.org").unwrap();
        assert_eq!(target.path, "/");
        assert_eq!(target.port(), 80);
        assert_eq!(target.origin(), "http://example.org");

        let target = Target::parse("https://example.org?q=1").unwrap();
        assert_eq!(target.path, "/?q=1");
        assert_eq!(target.port(), 443);
    }

    #[test]
    fn parse_ipv6_and_userinfo() {
        let target = Target::parse("http://user:pw@[::1]:8080/x").unwrap();
        assert_eq!(target.host, "[::1]");
        assert_eq!(target.hostname(), "::1");
        assert_eq!(target.port(), 8080);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(Target::parse(""), Err(Error::InvalidInput(_))));
        assert!(matches!(Target::parse("example.org/x"), Err(Error::InvalidInput(_))));
        assert!(matches!(Target::parse("ftp://example.org/x"), Err(Error::InvalidInput(_))));
        assert!(matches!(Target::parse("http://example.org:99999/"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn parse_rejects_unescaped_path() {
        for url in [
            "http://example.org/a HTTP/1.1\r\nX-Smuggled: 1\r\nX:",
            "http://example.org/a\nb",
            "http://example.org/with space",
            "http://example.org/?q=\ta",
            "http://example.org/\u{7f}",
        ] {
            assert!(matches!(Target::parse(url), Err(Error::InvalidInput(_))), "{url:?}");
        }
        assert_eq!(Target::parse("http://example.org/with%20space").unwrap().path, "/with%20space");
    }

    #[test]
    fn resolve_locations() {
        let base = Target::parse("https://a.example/x").unwrap();
        assert_eq!(resolve(&base, "/next"), "https://a.example/next");
        assert_eq!(resolve(&base, "https://b.example/y"), "https://b.example/y");
        assert_eq!(resolve(&base, "HTTP://b.example/y"), "HTTP://b.example/y");
        assert_eq!(resolve(&base, "//c.example/z"), "https://c.example/z");

        let base = Target::parse("http://localhost:8000/dir/page?x=1").unwrap();
        assert_eq!(resolve(&base, "/next"), "http://localhost:8000/next");
        assert_eq!(resolve(&base, "other"), "http://localhost:8000/dir/other");
        assert_eq!(resolve(&base, "?y=2"), "http://localhost:8000/dir/page?y=2");
    }
}
