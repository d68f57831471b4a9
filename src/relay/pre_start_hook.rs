use amq_protocol_types::FieldTable;
use lapin::Channel;
use std::sync::Arc;

/// Logic to run against the broker before consuming from a queue, e.g. declaring it.
///
/// [`AmqpTransport`](super::AmqpTransport) runs its hooks, in registration order, every time it
/// opens a receiver: topology is in place whenever the relay (re)starts.
///
/// `queue_args` are the arguments the queue must be declared with. Hooks wrapping another hook
/// add their own arguments before delegating (see [`hooks`](super::hooks)).
#[async_trait::async_trait]
pub trait ConsumerPreStartHook: Send + Sync + 'static {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error>;
}

/// assert it's object safe
type _CHECK = Box<dyn ConsumerPreStartHook>;

#[async_trait::async_trait]
impl ConsumerPreStartHook for Arc<dyn ConsumerPreStartHook> {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        self.as_ref().run(channel, queue_name, queue_args).await
    }
}
