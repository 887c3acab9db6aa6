use super::connection_string::ServiceBusConnectionString;
use super::secret::Secret;
use crate::errors::{ServiceBusError, ServiceBusResult};

/// Scheme used for TLS-wrapped AMQP connections to Service Bus.
pub const AMQPS_SCHEME: &str = "amqps";

/// Optional query parameters appended to the derived transport URI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UriOptions {
    /// Connection idle timeout in milliseconds (`amqp.idleTimeout`)
    pub idle_timeout_ms: Option<u64>,
    /// Enables AMQP frame tracing (`amqp.traceFrames=true`)
    pub trace_frames: bool,
}

impl UriOptions {
    pub fn with_idle_timeout(idle_timeout_ms: u64) -> Self {
        Self {
            idle_timeout_ms: Some(idle_timeout_ms),
            trace_frames: false,
        }
    }

    fn query(&self) -> Option<String> {
        let mut params = Vec::new();
        if let Some(timeout) = self.idle_timeout_ms {
            params.push(format!("amqp.idleTimeout={timeout}"));
        }
        if self.trace_frames {
            params.push("amqp.traceFrames=true".to_string());
        }
        if params.is_empty() {
            None
        } else {
            Some(params.join("&"))
        }
    }
}

/// Everything a transport needs to open an authenticated AMQP connection.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub remote_uri: String,
    pub client_id: String,
    /// SAS key name; absent when the connection string carries a signature
    pub username: Option<String>,
    pub password: Secret,
    pub(crate) connection_string: Secret,
    pub(crate) host: String,
}

impl TransportSettings {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The connection string these settings were derived from.
    pub fn connection_string(&self) -> &str {
        self.connection_string.expose()
    }
}

/// Derives the `amqps://<host>[?query]` transport URI for a connection string.
///
/// # Errors
///
/// Returns [`ServiceBusError::ConnectionString`] when the connection string is
/// malformed; no URI is produced in that case.
pub fn remote_uri(connection_string: &str, options: UriOptions) -> ServiceBusResult<String> {
    let parsed = ServiceBusConnectionString::parse(connection_string)?;
    Ok(build_remote_uri(&parsed, options))
}

fn build_remote_uri(parsed: &ServiceBusConnectionString, options: UriOptions) -> String {
    let mut uri = format!("{AMQPS_SCHEME}://{}", parsed.host());
    if let Some(query) = options.query() {
        uri.push('?');
        uri.push_str(&query);
    }
    uri
}

/// Turns a connection string and client identifier into [`TransportSettings`].
///
/// Construction fails fast: a malformed connection string or an empty client
/// id is an error at startup rather than at first send.
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    settings: TransportSettings,
    namespace: String,
}

impl ConnectionFactory {
    pub fn new(
        connection_string: &str,
        client_id: &str,
        options: UriOptions,
    ) -> ServiceBusResult<Self> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(ServiceBusError::ConfigurationError(
                "Client id cannot be empty".to_string(),
            ));
        }

        let parsed = ServiceBusConnectionString::parse(connection_string)?;
        let password = match (parsed.key(), parsed.shared_access_signature()) {
            (Some(key), _) => key.clone(),
            (None, Some(signature)) => signature.clone(),
            (None, None) => {
                return Err(ServiceBusError::ConfigurationError(
                    "Connection string carries no credentials".to_string(),
                ));
            }
        };

        let settings = TransportSettings {
            remote_uri: build_remote_uri(&parsed, options),
            client_id: client_id.to_string(),
            username: parsed.key_name().map(str::to_string),
            password,
            connection_string: Secret::new(connection_string.trim()),
            host: parsed.host().to_string(),
        };

        log::debug!(
            "Derived transport settings for {} (client id: {})",
            settings.remote_uri,
            settings.client_id
        );

        Ok(Self {
            settings,
            namespace: parsed.namespace().to_string(),
        })
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn remote_uri(&self) -> &str {
        &self.settings.remote_uri
    }

    pub fn client_id(&self) -> &str {
        &self.settings.client_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionStringError;
    use claims::{assert_err, assert_ok};

    const CONN: &str =
        "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=k;SharedAccessKey=v";

    #[test]
    fn test_remote_uri_table() {
        let cases = [
            (UriOptions::default(), "amqps://ns.servicebus.windows.net"),
            (
                UriOptions::with_idle_timeout(3_600_000),
                "amqps://ns.servicebus.windows.net?amqp.idleTimeout=3600000",
            ),
            (
                UriOptions {
                    idle_timeout_ms: Some(120_000),
                    trace_frames: true,
                },
                "amqps://ns.servicebus.windows.net?amqp.idleTimeout=120000&amqp.traceFrames=true",
            ),
            (
                UriOptions {
                    idle_timeout_ms: None,
                    trace_frames: true,
                },
                "amqps://ns.servicebus.windows.net?amqp.traceFrames=true",
            ),
        ];

        for (options, expected) in cases {
            assert_eq!(assert_ok!(remote_uri(CONN, options)), expected);
        }
    }

    #[test]
    fn test_remote_uri_drops_port_and_path() {
        let uri = assert_ok!(remote_uri(
            "Endpoint=sb://ns.servicebus.windows.net:5671/some/path;SharedAccessKeyName=k;SharedAccessKey=v",
            UriOptions::default(),
        ));
        assert_eq!(uri, "amqps://ns.servicebus.windows.net");
    }

    #[test]
    fn test_malformed_connection_string_is_an_error() {
        let err = assert_err!(remote_uri(
            "Endpoint=ns.servicebus.windows.net;SharedAccessKeyName=k;SharedAccessKey=v",
            UriOptions::default(),
        ));
        assert!(matches!(
            err,
            ServiceBusError::ConnectionString(ConnectionStringError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_factory_derives_credentials() {
        let factory = assert_ok!(ConnectionFactory::new(
            CONN,
            "busline",
            UriOptions::with_idle_timeout(120_000)
        ));
        let settings = factory.settings();

        assert_eq!(
            settings.remote_uri,
            "amqps://ns.servicebus.windows.net?amqp.idleTimeout=120000"
        );
        assert_eq!(settings.client_id, "busline");
        assert_eq!(settings.username.as_deref(), Some("k"));
        assert_eq!(settings.password.expose(), "v");
        assert_eq!(settings.host(), "ns.servicebus.windows.net");
        assert_eq!(factory.namespace(), "ns");
    }

    #[test]
    fn test_factory_uses_signature_as_password() {
        let factory = assert_ok!(ConnectionFactory::new(
            "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessSignature=sig-value",
            "busline",
            UriOptions::default()
        ));
        assert!(factory.settings().username.is_none());
        assert_eq!(factory.settings().password.expose(), "sig-value");
    }

    #[test]
    fn test_factory_rejects_empty_client_id() {
        let err = assert_err!(ConnectionFactory::new(CONN, "  ", UriOptions::default()));
        assert!(matches!(err, ServiceBusError::ConfigurationError(_)));
    }

    #[test]
    fn test_settings_debug_hides_password() {
        let factory = assert_ok!(ConnectionFactory::new(
            "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=k;SharedAccessKey=super-secret",
            "busline",
            UriOptions::default()
        ));
        let debug = format!("{:?}", factory.settings());
        assert!(!debug.contains("super-secret"));
    }
}
