use crate::errors::{ServiceBusError, ServiceBusResult};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Generator for Service Bus Shared Access Signature (SAS) tokens.
///
/// Tokens are scoped to the whole namespace (`sb://<host>/`) and signed with
/// HMAC-SHA256 over the URL-encoded resource URI and the expiry timestamp.
/// The shared access key is used as-is; Service Bus signs with the key text,
/// not with its base64 decoding.
///
/// # Examples
///
/// ```no_run
/// use server::connection::SasTokenGenerator;
///
/// let generator = SasTokenGenerator::new("ns.servicebus.windows.net");
/// let token = generator.generate(
///     "RootManageSharedAccessKey",
///     "base64_encoded_key",
///     chrono::Duration::hours(24),
/// )?;
/// # Ok::<(), server::errors::ServiceBusError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SasTokenGenerator {
    host: String,
}

impl SasTokenGenerator {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn resource_uri(&self) -> String {
        format!("sb://{}/", self.host)
    }

    /// Generates a token valid for `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceBusError::ConfigurationError`] for a non-positive TTL,
    /// a TTL whose expiry overflows the calendar, or an empty key.
    pub fn generate(&self, key_name: &str, key: &str, ttl: Duration) -> ServiceBusResult<String> {
        if ttl <= Duration::zero() {
            return Err(ServiceBusError::ConfigurationError(format!(
                "SAS token lifetime must be positive, got {}s",
                ttl.num_seconds()
            )));
        }
        let expiry = Utc::now().checked_add_signed(ttl).ok_or_else(|| {
            ServiceBusError::ConfigurationError(format!(
                "SAS token lifetime of {}s is out of range",
                ttl.num_seconds()
            ))
        })?;
        self.generate_with_expiry(key_name, key, expiry)
    }

    pub fn generate_with_expiry(
        &self,
        key_name: &str,
        key: &str,
        expiry: DateTime<Utc>,
    ) -> ServiceBusResult<String> {
        if key.is_empty() {
            return Err(ServiceBusError::ConfigurationError(
                "SAS key cannot be empty".to_string(),
            ));
        }

        let expiry_timestamp = expiry.timestamp();
        let resource_uri = self.resource_uri();
        let encoded_uri = urlencoding::encode(&resource_uri);
        let string_to_sign = format!("{encoded_uri}\n{expiry_timestamp}");

        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|e| {
            ServiceBusError::ConfigurationError(format!("Failed to create HMAC: {e}"))
        })?;
        mac.update(string_to_sign.as_bytes());
        let signature = general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!(
            "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
            encoded_uri,
            urlencoding::encode(&signature),
            expiry_timestamp,
            key_name
        ))
    }
}
