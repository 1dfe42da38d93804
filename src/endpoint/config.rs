use std::fmt;

use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};

use super::auth::{AuthKind, Authenticator};
use crate::SinkError;

/// Connection configuration for a single Substreams endpoint.
///
/// ```rust
/// use substreams_sink::EndpointConfig;
///
/// let config = EndpointConfig::new("mainnet.eth.streamingfast.io:443")
///     .extra_headers(["x-sf-meter: on"])?;
/// # Ok::<(), substreams_sink::SinkError>(())
/// ```
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    endpoint: String,
    plaintext: bool,
    insecure: bool,
    authenticator: Authenticator,
    extra_headers: Vec<(String, String)>,
}

impl EndpointConfig {
    /// Creates a TLS configuration for `endpoint` (`host:port`), with
    /// credentials resolved from the default environment variables.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            plaintext: false,
            insecure: false,
            authenticator: Authenticator::default(),
            extra_headers: Vec::new(),
        }
    }

    /// Connects without TLS.
    #[must_use]
    pub fn plaintext(mut self, plaintext: bool) -> Self {
        self.plaintext = plaintext;
        self
    }

    /// Tolerates invalid TLS certificates where the transport supports it.
    #[must_use]
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Replaces the credential resolver.
    #[must_use]
    pub fn authenticator(mut self, authenticator: Authenticator) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Appends raw `"key: value"` headers sent with every request.
    ///
    /// A malformed header fails construction instead of being deferred to
    /// the first request.
    pub fn extra_headers<I, S>(mut self, headers: I) -> Result<Self, SinkError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in headers {
            self.extra_headers.push(parse_header(raw.as_ref())?);
        }
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_plaintext(&self) -> bool {
        self.plaintext
    }

    pub fn is_insecure(&self) -> bool {
        self.insecure
    }

    pub fn authenticator_ref(&self) -> &Authenticator {
        &self.authenticator
    }

    /// The currently resolvable API credential, if any.
    pub fn api_token(&self) -> Option<String> {
        self.authenticator.resolve().0
    }

    /// Full URI handed to the transport.
    pub(crate) fn uri(&self) -> String {
        if self.endpoint.contains("://") {
            return self.endpoint.clone();
        }

        let scheme = if self.plaintext { "http" } else { "https" };
        format!("{scheme}://{}", self.endpoint)
    }

    /// Builds the per-request metadata, resolving the credential anew so
    /// rotation between sessions is honored.
    pub(crate) fn metadata(&self) -> Result<MetadataMap, SinkError> {
        let mut metadata = MetadataMap::new();

        match self.authenticator.resolve() {
            (Some(key), AuthKind::ApiKey) => {
                insert(&mut metadata, "x-api-key", &key)?;
            }
            (Some(token), AuthKind::Jwt) => {
                insert(&mut metadata, "authorization", &format!("Bearer {token}"))?;
            }
            _ => {}
        }

        for (key, value) in &self.extra_headers {
            insert(&mut metadata, key, value)?;
        }

        Ok(metadata)
    }
}

fn insert(metadata: &mut MetadataMap, key: &str, value: &str) -> Result<(), SinkError> {
    let invalid = || SinkError::InvalidHeaderValue(key.to_string());

    let key = MetadataKey::from_bytes(key.as_bytes()).map_err(|_| invalid())?;
    let value = MetadataValue::try_from(value).map_err(|_| invalid())?;
    metadata.insert(key, value);
    Ok(())
}

/// Splits a raw `"key: value"` header, trimming whitespace.
fn parse_header(raw: &str) -> Result<(String, String), SinkError> {
    let Some((key, value)) = raw.split_once(':') else {
        return Err(SinkError::InvalidHeader(raw.to_string()));
    };

    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return Err(SinkError::InvalidHeader(raw.to_string()));
    }

    Ok((key.to_ascii_lowercase(), value.to_string()))
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (credential, kind) = self.authenticator.resolve();
        write!(
            f,
            "{} (plaintext: {}, insecure: {}, credential: {})",
            self.endpoint,
            self.plaintext,
            self.insecure,
            match (credential, kind) {
                (Some(_), AuthKind::ApiKey) => "api key",
                (Some(_), AuthKind::Jwt) => "jwt",
                _ => "none",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headers_with_whitespace() {
        let parsed = parse_header(" X-Custom :  some value ").unwrap();

        assert_eq!(parsed, ("x-custom".to_string(), "some value".to_string()));
    }

    #[test]
    fn rejects_malformed_headers() {
        for raw in ["no-separator", ": empty key", "empty-value: ", ""] {
            let err = parse_header(raw).unwrap_err();
            assert!(matches!(err, SinkError::InvalidHeader(_)), "header {raw:?}");
        }
    }

    #[test]
    fn malformed_header_fails_construction() {
        let result = EndpointConfig::new("localhost:9000").extra_headers(["not a header"]);

        assert!(matches!(result, Err(SinkError::InvalidHeader(_))));
    }

    #[test]
    fn uri_scheme_follows_plaintext() {
        assert_eq!(EndpointConfig::new("host:443").uri(), "https://host:443");
        assert_eq!(EndpointConfig::new("host:9000").plaintext(true).uri(), "http://host:9000");
        assert_eq!(EndpointConfig::new("http://host:9000").uri(), "http://host:9000");
    }

    #[test]
    fn extra_headers_land_in_metadata() {
        let config = EndpointConfig::new("host:443")
            .authenticator(Authenticator::new("TEST_CFG_NO_KEY", "TEST_CFG_NO_TOKEN"))
            .extra_headers(["x-custom: yes"])
            .unwrap();

        let metadata = config.metadata().unwrap();

        assert_eq!(metadata.get("x-custom").unwrap(), "yes");
        assert!(metadata.get("authorization").is_none());
    }

    #[test]
    fn display_redacts_credentials() {
        let config = EndpointConfig::new("host:443")
            .authenticator(Authenticator::new("TEST_CFG_DISPLAY_KEY", "TEST_CFG_DISPLAY_TOKEN"));

        unsafe { std::env::set_var("TEST_CFG_DISPLAY_KEY", "super-secret") };

        let rendered = config.to_string();
        assert!(!rendered.contains("super-secret"), "{rendered}");
        assert!(rendered.contains("api key"), "{rendered}");
    }
}
