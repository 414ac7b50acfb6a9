use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Header carrying an Admin API access token.
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Header carrying a Storefront API access token.
const STOREFRONT_ACCESS_TOKEN_HEADER: &str = "X-Shopify-Storefront-Access-Token";

/// Final path segment of every GraphQL endpoint.
const GRAPHQL_ENDPOINT: &str = "graphql.json";

/// Environment variables read by [`CredentialsFrom::Env`].
const ENV_STORE_NAME: &str = "STORE_NAME";
const ENV_ACCESS_TOKEN: &str = "STORE_ACCESS_TOKEN";
const ENV_API_KEY: &str = "STORE_API_KEY";
const ENV_PASSWORD: &str = "STORE_PASSWORD";
const ENV_STOREFRONT_TOKEN: &str = "STORE_STOREFRONT_TOKEN";

/// Errors that can occur while building a client configuration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Failed to read credentials file from disk.
    #[error("Failed to read credentials file at {path}: {source}")]
    ReadCredentials {
        /// Path to the credentials file that failed to read.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse credentials JSON.
    #[error("Failed to parse credentials JSON: {source}")]
    ParseCredentials {
        #[source]
        source: serde_json::Error,
    },
    /// Invalid store URL.
    #[error("Invalid URL format: {source}")]
    ParseUrl {
        #[source]
        source: url::ParseError,
    },
    /// Required builder parameter was not provided.
    #[error("Missing required attribute: {}", _0)]
    MissingRequiredAttribute(String),
    /// Required environment variable is not set.
    #[error("Missing environment variable: {}", _0)]
    MissingEnvVar(String),
    /// Invalid credentials for the selected API surface.
    #[error("Invalid credentials for {surface:?}: {message}")]
    InvalidCredentials {
        /// The API surface the credentials were validated against.
        surface: ApiSurface,
        /// Description of what's missing or invalid.
        message: String,
    },
    /// Failed to build the underlying HTTP client.
    #[error("Failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },
}

/// GraphQL API surface exposed by a store.
///
/// The surface decides both the endpoint path and which credential is sent.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiSurface {
    /// Admin API at `/admin/api/<version>/graphql.json`.
    ///
    /// Requires: `access_token`, or `api_key` and `password` (private app).
    #[default]
    Admin,
    /// Storefront API at `/api/<version>/graphql.json`.
    ///
    /// Requires: `storefront_access_token`
    Storefront,
}

/// Store credentials.
///
/// Different fields are required depending on the [`ApiSurface`] used.
///
/// # Examples
///
/// ```
/// use shopify_core::client::Credentials;
///
/// let creds = Credentials {
///     store_domain: "my-store.myshopify.com".to_string(),
///     access_token: Some("shpat_...".to_string()),
///     api_key: None,
///     password: None,
///     storefront_access_token: None,
/// };
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Credentials {
    /// Store domain (e.g., `my-store.myshopify.com`).
    ///
    /// An explicit `http://` or `https://` scheme is honoured; otherwise
    /// `https://` is assumed.
    pub store_domain: String,
    /// Admin API access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Private app API key, used together with `password`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Private app password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Storefront API access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storefront_access_token: Option<String>,
}

impl Credentials {
    /// Loads credentials from `STORE_NAME`, `STORE_ACCESS_TOKEN`,
    /// `STORE_API_KEY`, `STORE_PASSWORD` and `STORE_STOREFRONT_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingEnvVar`] if `STORE_NAME` is not set.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());

        Ok(Self {
            store_domain: non_empty(ENV_STORE_NAME)
                .ok_or_else(|| Error::MissingEnvVar(ENV_STORE_NAME.to_string()))?,
            access_token: non_empty(ENV_ACCESS_TOKEN),
            api_key: non_empty(ENV_API_KEY),
            password: non_empty(ENV_PASSWORD),
            storefront_access_token: non_empty(ENV_STOREFRONT_TOKEN),
        })
    }
}

/// Source for loading credentials.
#[derive(Debug, Clone)]
pub enum CredentialsFrom {
    /// Load credentials from a JSON file.
    Path(PathBuf),
    /// Use credentials provided directly.
    Value(Credentials),
    /// Load credentials from environment variables.
    Env,
}

impl CredentialsFrom {
    fn load(&self) -> Result<Credentials, Error> {
        match self {
            CredentialsFrom::Value(creds) => Ok(creds.clone()),
            CredentialsFrom::Env => Credentials::from_env(),
            CredentialsFrom::Path(path) => {
                let credentials_string =
                    fs::read_to_string(path).map_err(|e| Error::ReadCredentials {
                        path: path.clone(),
                        source: e,
                    })?;
                serde_json::from_str(&credentials_string)
                    .map_err(|e| Error::ParseCredentials { source: e })
            }
        }
    }
}

/// Credential attached to every request.
#[derive(Clone)]
enum Auth {
    AccessToken(String),
    PrivateApp { api_key: String, password: String },
    StorefrontToken(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::AccessToken(_) => f.write_str("AccessToken(..)"),
            Auth::PrivateApp { api_key, .. } => f
                .debug_struct("PrivateApp")
                .field("api_key", api_key)
                .finish_non_exhaustive(),
            Auth::StorefrontToken(_) => f.write_str("StorefrontToken(..)"),
        }
    }
}

/// Immutable store configuration.
///
/// Use [`Builder`] to construct a client. A `Client` holds everything the
/// transport needs (endpoint, credential, timeouts) and never changes after
/// it is built, so it can be cloned freely into other components.
///
/// # Examples
///
/// ## Admin API with an access token
///
/// ```no_run
/// use shopify_core::client::{self, Credentials};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = client::Builder::new()
///     .credentials(Credentials {
///         store_domain: "my-store.myshopify.com".to_string(),
///         access_token: Some("shpat_...".to_string()),
///         ..Default::default()
///     })
///     .build()?;
/// println!("{}", client.endpoint());
/// # Ok(())
/// # }
/// ```
///
/// ## Loading credentials from file
///
/// ```no_run
/// use shopify_core::client;
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = client::Builder::new()
///     .credentials_path(PathBuf::from("credentials.json"))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    surface: ApiSurface,
    api_version: String,
    endpoint: Url,
    auth: Auth,
    connect_timeout: Duration,
    request_timeout: Duration,
    download_timeout: Option<Duration>,
}

impl Client {
    /// Returns the GraphQL endpoint requests are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the API surface this client targets.
    pub fn surface(&self) -> ApiSurface {
        self.surface
    }

    /// Returns the API version being used.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Returns the connection timeout for HTTP requests.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the overall timeout for HTTP requests.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the overall timeout for result downloads, if any.
    pub fn download_timeout(&self) -> Option<Duration> {
        self.download_timeout
    }

    /// Builds an HTTP client for API requests with the configured timeouts.
    pub(crate) fn build_http_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .map_err(|source| Error::HttpClientBuild { source })
    }

    /// Builds an HTTP client for result downloads.
    ///
    /// The API request timeout does not apply; a streamed body is only bounded
    /// by the download timeout when one is set.
    pub(crate) fn build_download_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder().connect_timeout(self.connect_timeout);
        if let Some(timeout) = self.download_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|source| Error::HttpClientBuild { source })
    }

    /// Attaches the configured credential to a request.
    pub(crate) fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::AccessToken(token) => request.header(ACCESS_TOKEN_HEADER, token),
            Auth::PrivateApp { api_key, password } => request.basic_auth(api_key, Some(password)),
            Auth::StorefrontToken(token) => request.header(STOREFRONT_ACCESS_TOKEN_HEADER, token),
        }
    }
}

/// Builds the GraphQL endpoint for a store.
fn build_endpoint(store_domain: &str, surface: ApiSurface, api_version: &str) -> Result<Url, Error> {
    let base = if store_domain.contains("://") {
        store_domain.to_string()
    } else {
        format!("https://{store_domain}")
    };
    let base = Url::parse(&base).map_err(|source| Error::ParseUrl { source })?;

    let prefix = match surface {
        ApiSurface::Admin => "admin/api",
        ApiSurface::Storefront => "api",
    };
    let path = if api_version.is_empty() || api_version == "latest" {
        format!("{prefix}/{GRAPHQL_ENDPOINT}")
    } else {
        format!("{prefix}/{api_version}/{GRAPHQL_ENDPOINT}")
    };

    base.join(&path).map_err(|source| Error::ParseUrl { source })
}

/// Picks the credential for a surface, failing if it is absent.
fn resolve_auth(credentials: &Credentials, surface: ApiSurface) -> Result<Auth, Error> {
    match surface {
        ApiSurface::Admin => {
            if let Some(token) = &credentials.access_token {
                return Ok(Auth::AccessToken(token.clone()));
            }
            match (&credentials.api_key, &credentials.password) {
                (Some(api_key), Some(password)) => Ok(Auth::PrivateApp {
                    api_key: api_key.clone(),
                    password: password.clone(),
                }),
                _ => Err(Error::InvalidCredentials {
                    surface,
                    message: "access_token, or api_key and password, is required".to_string(),
                }),
            }
        }
        ApiSurface::Storefront => credentials
            .storefront_access_token
            .clone()
            .map(Auth::StorefrontToken)
            .ok_or_else(|| Error::InvalidCredentials {
                surface,
                message: "storefront_access_token is required".to_string(),
            }),
    }
}

/// Builder for constructing a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use shopify_core::client::{self, ApiSurface};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = client::Builder::new()
///     .credentials_from_env()
///     .api_surface(ApiSurface::Admin)
///     .api_version("2024-01")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Builder {
    credentials_from: Option<CredentialsFrom>,
    surface: Option<ApiSurface>,
    api_version: Option<String>,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    download_timeout: Option<Duration>,
}

impl Builder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets credentials to load from a JSON file.
    ///
    /// The file should contain a JSON object such as:
    ///
    /// ```json
    /// {
    ///   "store_domain": "my-store.myshopify.com",
    ///   "access_token": "shpat_..."
    /// }
    /// ```
    pub fn credentials_path(mut self, path: PathBuf) -> Self {
        self.credentials_from = Some(CredentialsFrom::Path(path));
        self
    }

    /// Sets credentials directly.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials_from = Some(CredentialsFrom::Value(credentials));
        self
    }

    /// Reads credentials from environment variables at build time.
    pub fn credentials_from_env(mut self) -> Self {
        self.credentials_from = Some(CredentialsFrom::Env);
        self
    }

    /// Sets the API surface. Defaults to [`ApiSurface::Admin`].
    pub fn api_surface(mut self, surface: ApiSurface) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Sets the API version. Defaults to [`crate::DEFAULT_API_VERSION`].
    ///
    /// An empty string or `"latest"` omits the version from the endpoint path.
    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Sets the HTTP connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the overall HTTP request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Bounds the total time of a result download. Unbounded by default.
    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = Some(timeout);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No credentials source was provided ([`Error::MissingRequiredAttribute`])
    /// - Credentials cannot be read or parsed ([`Error::ReadCredentials`], [`Error::ParseCredentials`])
    /// - The credential for the chosen surface is absent ([`Error::InvalidCredentials`])
    /// - The store domain is not a valid URL host ([`Error::ParseUrl`])
    pub fn build(self) -> Result<Client, Error> {
        let credentials = self
            .credentials_from
            .ok_or_else(|| {
                Error::MissingRequiredAttribute("credentials or credentials_path".to_string())
            })?
            .load()?;

        if credentials.store_domain.is_empty() {
            return Err(Error::MissingRequiredAttribute("store_domain".to_string()));
        }

        let surface = self.surface.unwrap_or_default();
        let api_version = self
            .api_version
            .unwrap_or_else(|| crate::DEFAULT_API_VERSION.to_string());
        let auth = resolve_auth(&credentials, surface)?;
        let endpoint = build_endpoint(&credentials.store_domain, surface, &api_version)?;

        Ok(Client {
            surface,
            api_version,
            endpoint,
            auth,
            connect_timeout: self
                .connect_timeout
                .unwrap_or(Duration::from_secs(crate::DEFAULT_CONNECT_TIMEOUT_SECS)),
            request_timeout: self
                .request_timeout
                .unwrap_or(Duration::from_secs(crate::DEFAULT_REQUEST_TIMEOUT_SECS)),
            download_timeout: self.download_timeout,
        })
    }
}
