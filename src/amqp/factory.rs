use crate::amqp::configuration::BrokerSettings;
use anyhow::Context;
use lapin::{
    tcp::{AMQPUriTcpExt, NativeTlsConnector},
    uri::{AMQPScheme, AMQPUri},
    ConnectionProperties,
};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::warn;

const DEFAULT_CONNECTION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Clone)]
/// All the information required to connect to the broker.
pub struct ConnectionFactory {
    uri: AMQPUri,
    /// The timeout observed when trying to connect.
    connection_timeout: std::time::Duration,
    /// If `None`, the connection will not be encrypted by us (an `amqps://` connection string is
    /// still encrypted by `lapin` itself).
    tls: Option<Arc<Tls>>,
}

struct Tls {
    connector: NativeTlsConnector,
    domain_name: String,
}

impl ConnectionFactory {
    /// Create a new connection factory from settings.
    ///
    /// If the connection timeout is left unspecified, it defaults to 10 seconds.
    pub fn new_from_config(settings: &BrokerSettings) -> Result<Self, anyhow::Error> {
        let uri = settings.amqp_uri()?;
        let tls = settings
            .tls
            .as_ref()
            .map::<Result<Tls, anyhow::Error>, _>(|tls_settings| {
                let domain_name = tls_settings
                    .domain
                    .clone()
                    .unwrap_or_else(|| uri.authority.host.clone());

                let mut connector_builder = NativeTlsConnector::builder();
                if let Some(certificate) = tls_settings.ca_certificate_chain()? {
                    connector_builder.add_root_certificate(certificate);
                }
                let connector = connector_builder
                    .build()
                    .context("Failed to build the TLS connector for the broker connection.")?;

                Ok(Tls {
                    connector,
                    domain_name,
                })
            })
            .transpose()?;

        Ok(Self {
            uri,
            connection_timeout: settings
                .connection_timeout()
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
            tls: tls.map(Arc::new),
        })
    }

    /// The host this factory connects to.
    pub fn host(&self) -> &str {
        &self.uri.authority.host
    }

    /// Open a new connection to the broker.
    ///
    /// The connection is encrypted if TLS settings were provided.
    #[tracing::instrument(name = "broker_connect", skip(self), fields(host = %self.host()))]
    pub async fn new_connection(&self) -> Result<lapin::Connection, anyhow::Error> {
        let properties =
            ConnectionProperties::default().with_executor(tokio_executor_trait::Tokio::current());
        let connection = timeout(self.connection_timeout, async {
            match &self.tls {
                None => lapin::Connection::connect_uri(self.uri.clone(), properties).await,
                Some(tls) => self.connect_with_tls(properties, Arc::clone(tls)).await,
            }
        })
        .await
        .context("Timed out while connecting to the broker.")??;

        connection.on_error(|e| {
            warn!("Broker connection broken: {:?}", e);
        });
        Ok(connection)
    }

    async fn connect_with_tls(
        &self,
        properties: ConnectionProperties,
        tls: Arc<Tls>,
    ) -> Result<lapin::Connection, lapin::Error> {
        lapin::Connection::connector(
            self.uri.clone(),
            Box::new(move |uri| {
                // Plain TCP first, then the TLS handshake with our own connector and domain.
                let mut amqp_uri = uri.clone();
                amqp_uri.scheme = AMQPScheme::AMQP;
                amqp_uri
                    .connect()
                    .and_then(|tcp| tcp.into_native_tls(&tls.connector, &tls.domain_name))
            }),
            properties,
        )
        .await
    }
}
