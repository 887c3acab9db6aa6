use super::secret::Secret;
use std::fmt;
use thiserror::Error;

const ENDPOINT: &str = "endpoint";
const SHARED_ACCESS_KEY_NAME: &str = "sharedaccesskeyname";
const SHARED_ACCESS_KEY: &str = "sharedaccesskey";
const SHARED_ACCESS_SIGNATURE: &str = "sharedaccesssignature";
const ENTITY_PATH: &str = "entitypath";

const ACCEPTED_SCHEMES: [&str; 3] = ["sb", "amqps", "https"];

/// Reasons a Service Bus connection string is rejected.
///
/// Variants never carry key material; malformed segments are reported by
/// position only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionStringError {
    #[error("connection string cannot be empty")]
    Empty,

    #[error("segment {0} is not a Key=Value pair")]
    MalformedSegment(usize),

    #[error("missing Endpoint")]
    MissingEndpoint,

    #[error("invalid Endpoint '{0}', expected sb://<host>/")]
    InvalidEndpoint(String),

    #[error("missing SharedAccessKeyName")]
    MissingKeyName,

    #[error("missing SharedAccessKey")]
    MissingKey,

    #[error("both SharedAccessKey and SharedAccessSignature are present")]
    ConflictingCredentials,
}

/// Parsed form of `Endpoint=sb://<host>/;SharedAccessKeyName=<name>;SharedAccessKey=<key>`.
///
/// Keys are matched case-insensitively and each segment is split on its first
/// `=` so base64 padding in keys survives. A string may authenticate either
/// with a shared key pair or with a pre-computed `SharedAccessSignature`.
///
/// # Examples
///
/// ```no_run
/// use server::connection::ServiceBusConnectionString;
///
/// let parsed = ServiceBusConnectionString::parse(
///     "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=k;SharedAccessKey=v",
/// )?;
/// assert_eq!(parsed.host(), "ns.servicebus.windows.net");
/// # Ok::<(), server::connection::ConnectionStringError>(())
/// ```
#[derive(Clone, PartialEq)]
pub struct ServiceBusConnectionString {
    endpoint: String,
    host: String,
    port: Option<u16>,
    key_name: Option<String>,
    key: Option<Secret>,
    shared_access_signature: Option<Secret>,
    entity_path: Option<String>,
}

impl ServiceBusConnectionString {
    pub fn parse(value: &str) -> Result<Self, ConnectionStringError> {
        if value.trim().is_empty() {
            return Err(ConnectionStringError::Empty);
        }

        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut shared_access_signature = None;
        let mut entity_path = None;

        for (index, segment) in value.split(';').enumerate() {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let Some((name, val)) = segment.split_once('=') else {
                return Err(ConnectionStringError::MalformedSegment(index));
            };
            let name = name.trim().to_ascii_lowercase();
            let val = val.trim();
            if name.is_empty() {
                return Err(ConnectionStringError::MalformedSegment(index));
            }

            match name.as_str() {
                ENDPOINT => endpoint = Some(val.to_string()),
                SHARED_ACCESS_KEY_NAME => key_name = non_empty(val).map(str::to_string),
                SHARED_ACCESS_KEY => key = non_empty(val).map(Secret::new),
                SHARED_ACCESS_SIGNATURE => {
                    shared_access_signature = non_empty(val).map(Secret::new)
                }
                ENTITY_PATH => entity_path = non_empty(val).map(str::to_string),
                other => log::debug!("Ignoring connection string segment '{other}'"),
            }
        }

        let endpoint = endpoint.ok_or(ConnectionStringError::MissingEndpoint)?;
        let (host, port) = parse_endpoint(&endpoint)?;

        if shared_access_signature.is_some() {
            if key.is_some() {
                return Err(ConnectionStringError::ConflictingCredentials);
            }
        } else {
            if key_name.is_none() {
                return Err(ConnectionStringError::MissingKeyName);
            }
            if key.is_none() {
                return Err(ConnectionStringError::MissingKey);
            }
        }

        Ok(Self {
            endpoint,
            host,
            port,
            key_name,
            key,
            shared_access_signature,
            entity_path,
        })
    }

    /// The raw `Endpoint` value, e.g. `sb://ns.servicebus.windows.net/`
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fully qualified namespace host, e.g. `ns.servicebus.windows.net`
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Namespace name: the host up to its first `.`
    pub fn namespace(&self) -> &str {
        self.host.split('.').next().unwrap_or(&self.host)
    }

    pub fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }

    pub fn key(&self) -> Option<&Secret> {
        self.key.as_ref()
    }

    pub fn shared_access_signature(&self) -> Option<&Secret> {
        self.shared_access_signature.as_ref()
    }

    pub fn entity_path(&self) -> Option<&str> {
        self.entity_path.as_deref()
    }
}

impl fmt::Debug for ServiceBusConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBusConnectionString")
            .field("endpoint", &self.endpoint)
            .field("key_name", &self.key_name)
            .field("has_key", &self.key.is_some())
            .field("has_signature", &self.shared_access_signature.is_some())
            .field("entity_path", &self.entity_path)
            .finish()
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

fn parse_endpoint(endpoint: &str) -> Result<(String, Option<u16>), ConnectionStringError> {
    let invalid = || ConnectionStringError::InvalidEndpoint(endpoint.to_string());

    let (scheme, rest) = endpoint.split_once("://").ok_or_else(invalid)?;
    if !ACCEPTED_SCHEMES
        .iter()
        .any(|accepted| scheme.eq_ignore_ascii_case(accepted))
    {
        return Err(invalid());
    }

    let authority = rest.split('/').next().unwrap_or_default();
    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| invalid())?)),
        None => (authority, None),
    };

    if host.is_empty() || host.chars().any(|c| c.is_whitespace() || c == '?' || c == '@') {
        return Err(invalid());
    }

    Ok((host.to_ascii_lowercase(), port))
}
