//! Process configuration.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. `configuration/base.yml`;
//! 2. `configuration/<environment>.yml`, where the environment comes from `APP_ENVIRONMENT`
//!    (`local` if unset);
//! 3. environment variables prefixed with `APP__`, using `__` to separate nested keys, e.g.
//!    `APP__QUEUES__REGISTERED_USER_QUEUE=registereduser-v2`.
//!
//! Every file is optional and every field has a default.
use crate::amqp::configuration::BrokerSettings;
use config::{Config, ConfigError, Environment, File, Source};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use std::path::Path;

const ENV_PREFIX: &str = "APP";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub queues: QueueSettings,
    pub consumer: ConsumerSettings,
    pub email: EmailSettings,
}

/// The queues the relay consumes from.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueueSettings {
    /// Carries [`CartEvent`](crate::events::CartEvent)s.
    pub email_shopping_cart_queue: String,
    /// Carries [`UserRegisteredEvent`](crate::events::UserRegisteredEvent)s.
    pub registered_user_queue: String,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            email_shopping_cart_queue: "emailshoppingcart".into(),
            registered_user_queue: "registereduser".into(),
        }
    }
}

/// How the relay consumes from its queues.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsumerSettings {
    /// Maximum number of unsettled messages per queue.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub prefetch_count: u16,
    /// Declare the queues on start if they do not exist.
    pub declare_queues: bool,
    /// Declare quorum queues rather than classic ones. Only used with `declare_queues`.
    pub quorum_queues: bool,
    /// Attach a `<queue>.deadletter` queue. Only used with `declare_queues`.
    pub dead_letter: bool,
    /// Dead-letter (or drop) a message after this many delivery attempts. Requires quorum queues.
    pub delivery_limit: Option<u32>,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            prefetch_count: 50,
            declare_queues: false,
            quorum_queues: false,
            dead_letter: false,
            delivery_limit: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EmailSettings {
    /// Where registration emails are logged. The registered address is used when unset.
    pub registration_recipient: Option<String>,
}

impl Settings {
    /// Load settings from `<base_path>/configuration` and the process environment.
    ///
    /// `environment` selects the environment-specific file, falling back to `APP_ENVIRONMENT`
    /// and then to `local`.
    pub fn load(base_path: &Path, environment: Option<String>) -> Result<Self, ConfigError> {
        let environment = environment.unwrap_or_else(|| {
            std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "local".into())
        });
        let configuration_dir = base_path.join("configuration");

        let base = File::from(configuration_dir.join("base.yml")).required(false);
        let environment =
            File::from(configuration_dir.join(format!("{environment}.yml"))).required(false);

        Self::from_sources(vec![Box::new(base), Box::new(environment)], ENV_PREFIX)
    }

    /// Layer `sources`, in order, then environment variables starting with `<env_prefix>__`.
    pub fn from_sources(
        sources: Vec<Box<dyn Source + Send + Sync>>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(sources)
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
