use crate::pool::{Error, SharedConnection};
use deadpool::managed::{self, Manager};
use lapin::{options::ConfirmSelectOptions, Channel, ChannelState};
use std::sync::Arc;

/// A pool of publishing [`Channel`]s, all opened on one [`SharedConnection`].
pub type ChannelPool = deadpool::managed::Pool<ChannelManager>;

/// Creates pooled channels and discards the ones the broker closed.
///
/// Closing the [`SharedConnection`] (e.g. when the relay stops) closes every pooled channel with
/// it: they are all replaced on their next checkout.
///
/// Channels are put in confirm mode: every publish waits for the broker to take the message.
pub struct ChannelManager {
    connection: Arc<SharedConnection>,
}

impl ChannelManager {
    pub fn new(connection: Arc<SharedConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait::async_trait]
impl Manager for ChannelManager {
    type Type = Channel;
    type Error = Error;

    async fn create(&self) -> Result<Channel, Error> {
        let channel = self.connection.open_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions { nowait: false })
            .await
            .map_err(Error::ConfirmSelect)?;
        Ok(channel)
    }

    async fn recycle(&self, channel: &mut Channel) -> managed::RecycleResult<Error> {
        let state = channel.status().state();
        if matches!(state, ChannelState::Connected) {
            return Ok(());
        }
        tracing::debug!(channel_id = channel.id(), ?state, "Discarding a pooled channel");
        Err(managed::RecycleError::Message(format!(
            "Channel {} is {state:?}",
            channel.id()
        )))
    }
}
