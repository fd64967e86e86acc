//! Core domain types

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::EndpointError;

/// Port used when an endpoint string carries none
pub const DEFAULT_PORT: u16 = 443;

/// Network location of the remote service
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    /// Parse `host` or `host:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| EndpointError::InvalidPort(port.to_string()))?;
                (host, port)
            }
            None => (s, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(EndpointError::EmptyHost);
        }

        Ok(Self::new(host, port))
    }
}

/// Credential material presented to the service.
///
/// Two values are the same credentials when they compare equal, which is
/// what partitions the pool.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Credentials {
    /// Ambient credentials discovered from the environment
    Default,
    /// Bearer access token
    AccessToken(String),
    /// Service account key file
    KeyFile(PathBuf),
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Default => write!(f, "default"),
            Credentials::AccessToken(_) => write!(f, "token:<redacted>"),
            Credentials::KeyFile(path) => write!(f, "keyfile:{}", path.display()),
        }
    }
}

// Tokens must never reach logs, so Debug goes through Display.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials({})", self)
    }
}

/// Opaque channel options, keyed by name.
///
/// Entries are kept sorted so equality and hashing ignore insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConnectionOptions(BTreeMap<String, String>);

impl ConnectionOptions {
    /// Create an empty option set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Get an option value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterate options in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of options
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no options
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConnectionOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Parameters supplied by a caller when acquiring or releasing a client
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Service endpoint
    pub endpoint: Endpoint,
    /// Credentials to authenticate with
    pub credentials: Credentials,
    /// Channel options
    pub options: ConnectionOptions,
    /// Target database. Handles are database-agnostic, so this does not
    /// partition the pool.
    pub database: Option<String>,
}

impl ConnectionParams {
    /// Create parameters with no options and no database
    pub fn new(endpoint: Endpoint, credentials: Credentials) -> Self {
        Self {
            endpoint,
            credentials,
            options: ConnectionOptions::new(),
            database: None,
        }
    }

    /// Add a channel option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key, value);
        self
    }

    /// Set the target database
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Derive the key identifying which pool partition serves these parameters
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::from(self)
    }
}

/// Value identifying one pool partition.
///
/// Built fresh from [`ConnectionParams`] on every call and compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    credentials: Credentials,
    endpoint: Endpoint,
    options: ConnectionOptions,
}

impl IdentityKey {
    /// Create a key from its parts
    pub fn new(credentials: Credentials, endpoint: Endpoint, options: ConnectionOptions) -> Self {
        Self {
            credentials,
            endpoint,
            options,
        }
    }

    /// Credentials component
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Endpoint component
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Options component
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }
}

impl From<&ConnectionParams> for IdentityKey {
    fn from(params: &ConnectionParams) -> Self {
        Self::new(
            params.credentials.clone(),
            params.endpoint.clone(),
            params.options.clone(),
        )
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.credentials, self.endpoint)?;
        if !self.options.is_empty() {
            write!(f, " {}", self.options)?;
        }
        Ok(())
    }
}
