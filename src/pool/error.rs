use deadpool::managed::PoolError;

/// Failure to get hold of a broker channel.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to connect to the broker.")]
    Connect(#[source] anyhow::Error),
    #[error("Failed to open a channel on the broker connection.")]
    OpenChannel(#[source] lapin::Error),
    #[error("Failed to put the channel in confirm mode.")]
    ConfirmSelect(#[source] lapin::Error),
    #[error("Failed to check out a pooled channel: {0}")]
    Checkout(String),
}

impl From<PoolError<Error>> for Error {
    fn from(err: PoolError<Error>) -> Self {
        match err {
            PoolError::Backend(e) => e,
            err => Self::Checkout(err.to_string()),
        }
    }
}
