use crate::amqp::ConnectionFactory;
use crate::pool::Error;
use lapin::{Channel, Connection, ConnectionState};
use tokio::sync::Mutex;

const REPLY_SUCCESS: u16 = 200;

/// One broker connection, shared by every channel opened through it.
pub struct SharedConnection {
    factory: ConnectionFactory,
    current: Mutex<Option<Connection>>,
}

impl SharedConnection {
    /// Nothing is opened until the first channel is requested.
    pub fn new(factory: ConnectionFactory) -> Self {
        Self {
            factory,
            current: Mutex::new(None),
        }
    }

    /// Open a channel, connecting first if there is no healthy connection.
    ///
    /// Concurrent callers wait for each other, so a broken connection is only replaced once.
    pub async fn open_channel(&self) -> Result<Channel, Error> {
        let mut current = self.current.lock().await;
        let connection = match current.take() {
            Some(connection) if is_connected(&connection) => connection,
            stale => {
                if let Some(stale) = stale {
                    tracing::info!(
                        state = ?stale.status().state(),
                        "Replacing the broker connection"
                    );
                }
                self.factory.new_connection().await.map_err(Error::Connect)?
            }
        };
        let channel = connection.create_channel().await;
        *current = Some(connection);
        channel.map_err(Error::OpenChannel)
    }

    /// Whether a connection is open and healthy.
    pub async fn is_open(&self) -> bool {
        self.current.lock().await.as_ref().map_or(false, is_connected)
    }

    /// Close the connection, and every channel on it, if one is open.
    ///
    /// A connection that was never opened, or that already broke, is dropped as is. The next
    /// [`SharedConnection::open_channel`] connects again.
    pub async fn close(&self, reason: &str) {
        let Some(connection) = self.current.lock().await.take() else {
            return;
        };
        if !is_connected(&connection) {
            tracing::debug!(
                state = ?connection.status().state(),
                "The broker connection is already down"
            );
            return;
        }
        if let Err(e) = connection.close(REPLY_SUCCESS, reason).await {
            tracing::warn!(error = %e, "Failed to close the broker connection");
        }
    }
}

fn is_connected(connection: &Connection) -> bool {
    matches!(connection.status().state(), ConnectionState::Connected)
}
