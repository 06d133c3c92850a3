//! Connections: plain TCP or TLS, opened through an [`Agent`].

use crate::{
    dns,
    uri::{Scheme, Target},
};
use log::debug;
use once_cell::sync::Lazy;
use std::{
    fmt, io,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
};
use tokio_rustls::{
    client::TlsStream,
    rustls::{pki_types::ServerName, ClientConfig, RootCertStore},
    TlsConnector,
};

static DEFAULT_AGENT: Lazy<Agent> = Lazy::new(Agent::new);

/// TLS client config with the Mozilla roots, no client auth, HTTP/1.1 only.
fn default_client_config() -> Arc<ClientConfig> {
    let mut root_store = RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

/// Connection agent: how hosts are resolved and how TLS is set up.
///
/// Requests without an agent share one default instance. An agent is cheap to clone.
#[derive(Clone)]
pub struct Agent {
    connector: TlsConnector,
    nameservers: Arc<[SocketAddr]>,
}

impl Agent {
    /// Agent with the bundled root certificates and the system nameservers.
    pub fn new() -> Self {
        Self {
            connector: TlsConnector::from(default_client_config()),
            nameservers: dns::SYSTEM_NAMESERVERS.as_slice().into(),
        }
    }

    /// Use a custom TLS configuration (roots, client certificates, ALPN).
    #[must_use]
    pub fn tls_config(self, config: Arc<ClientConfig>) -> Self {
        let mut agent = self;
        agent.connector = TlsConnector::from(config);
        agent
    }

    /// Ask these nameservers instead of the system ones. With none, the system resolver is used.
    #[must_use]
    pub fn nameservers(self, servers: impl IntoIterator<Item = SocketAddr>) -> Self {
        let mut agent = self;
        agent.nameservers = servers.into_iter().collect();
        agent
    }

    pub(crate) fn shared() -> &'static Agent {
        &DEFAULT_AGENT
    }

    /// Open a connection to `target`, with a TLS handshake for `https`.
    pub(crate) async fn connect(&self, target: &Target) -> Result<HttpStream, io::Error> {
        let ip = dns::resolve(target.hostname(), &self.nameservers).await?;
        let tcp = TcpStream::connect((ip, target.port())).await?;
        debug!("connected to {} ({ip}:{})", target.host, target.port());

        match target.scheme {
            Scheme::Http => Ok(HttpStream::Plain(tcp)),
            Scheme::Https => {
                let server_name = ServerName::try_from(target.hostname().to_string())
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid host name"))?;
                let tls = self.connector.connect(server_name, tcp).await?;
                Ok(HttpStream::Tls(Box::new(tls)))
            }
        }
    }
}

impl Default for Agent {
    fn default() -> Self {
        Agent::new()
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("nameservers", &self.nameservers)
            .finish_non_exhaustive()
    }
}

/// Unified stream: plain TCP or TLS.
pub(crate) enum HttpStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for HttpStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            HttpStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            HttpStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            HttpStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            HttpStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
