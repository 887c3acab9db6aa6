use serde::Deserialize;
use server::connection::UriOptions;
use server::utils::EnvUtils;

/// Connection string taken from the environment when the config has none.
pub const CONNECTION_STRING_ENV_VAR: &str = "AZURE_SERVICEBUS_CONNECTION_STRING";

pub const DEFAULT_CLIENT_ID: &str = "busline";

/// One hour.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 3_600_000;

/// Service Bus connection configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ServicebusConfig {
    connection_string: Option<String>,
    client_id: Option<String>,
    idle_timeout_ms: Option<u64>,
    trace_frames: Option<bool>,
}

impl ServicebusConfig {
    /// The configured connection string, or the one from
    /// [`CONNECTION_STRING_ENV_VAR`] when the config leaves it empty.
    pub fn connection_string(&self) -> Option<String> {
        self.connection_string
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| EnvUtils::get_optional_var(CONNECTION_STRING_ENV_VAR))
    }

    pub fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or(DEFAULT_CLIENT_ID)
    }

    /// `None` when the idle timeout is disabled with `0`.
    pub fn idle_timeout_ms(&self) -> Option<u64> {
        match self.idle_timeout_ms.unwrap_or(DEFAULT_IDLE_TIMEOUT_MS) {
            0 => None,
            ms => Some(ms),
        }
    }

    pub fn trace_frames(&self) -> bool {
        self.trace_frames.unwrap_or(false)
    }

    pub fn uri_options(&self) -> UriOptions {
        UriOptions {
            idle_timeout_ms: self.idle_timeout_ms(),
            trace_frames: self.trace_frames(),
        }
    }
}

/// Where records are sent and listened for
#[derive(Debug, Deserialize, Default, Clone)]
pub struct DestinationsConfig {
    queue: Option<String>,
    topic: Option<String>,
    subscription: Option<String>,
}

impl DestinationsConfig {
    pub fn queue(&self) -> &str {
        self.queue.as_deref().unwrap_or("testqueue")
    }

    pub fn topic(&self) -> &str {
        self.topic.as_deref().unwrap_or("mytopic")
    }

    pub fn subscription(&self) -> &str {
        self.subscription.as_deref().unwrap_or("S1")
    }
}
