use async_trait::async_trait;
use rustls::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::Error;
use crate::network::tls::get_tls_connector;
use crate::settings::Shared;

/// A new trait, which can be used to represent any encrypted byte stream
/// towards the gateway. \
/// This is necessary to write generic functions where test doubles can be
/// used instead of real TLS streams.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl Stream for tokio_rustls::client::TlsStream<TcpStream> {}

/// Convenience type, so we don't have to write `Box<dyn Stream>` all the
/// time. \
/// This also prevents name collisions, since `Stream` is imported in many
/// preludes.
pub type GenericStream = Box<dyn Stream>;

/// Anything that can open a fresh secure stream to a remote endpoint.
///
/// The delivery engine reconnects through this trait whenever a previous
/// failure dropped its stream, which is why connectors hand out any number
/// of streams over their lifetime.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<GenericStream, Error>;
}

/// The production [Connector]: a TLS connection to one of the well-known
/// endpoints, authenticated with the configured client certificate.
pub struct GatewayConnector {
    host: String,
    port: u16,
    settings: Shared,
}

impl GatewayConnector {
    /// A connector for the push gateway itself.
    pub fn push(settings: &Shared) -> Self {
        GatewayConnector {
            host: settings.host(),
            port: settings.port(),
            settings: settings.clone(),
        }
    }

    /// A connector for the companion feedback service.
    pub fn feedback(settings: &Shared) -> Self {
        GatewayConnector {
            host: settings.feedback_host(),
            port: settings.feedback_port(),
            settings: settings.clone(),
        }
    }
}

// Test doubles for the generic stream type: unit tests run their fake
// gateways on plain TCP or in-memory pipes instead of TLS.
#[cfg(test)]
impl Stream for TcpStream {}
#[cfg(test)]
impl Stream for tokio::io::DuplexStream {}

#[async_trait]
impl Connector for GatewayConnector {
    async fn connect(&self) -> Result<GenericStream, Error> {
        let address = format!("{}:{}", self.host, self.port);
        let tcp_stream = TcpStream::connect(&address).await.map_err(|err| {
            Error::Connection(format!("Failed to connect to the gateway at {address}: {err}"))
        })?;

        // Get the configured rustls TlsConnector
        let tls_connector = get_tls_connector(&self.settings).await?;

        let server_name = ServerName::try_from(self.host.as_str()).map_err(|_| {
            Error::InvalidConfiguration(format!("Invalid gateway hostname: {}", self.host))
        })?;

        // Initialize the TLS layer
        let stream = tls_connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|err| Error::Connection(format!("Failed to initialize tls: {err}")))?;

        Ok(Box::new(stream))
    }
}
