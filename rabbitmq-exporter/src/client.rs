//! Requests to the `RabbitMQ` management API

use std::path::{Path, PathBuf};
use std::time::Instant;

use rabbit_reply::{make_reply, Format, Reply};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::{debug, info};
use url::Url;

use crate::cli::Config;

/// Errors setting up the client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A credentials or certificate file could not be read
    #[error("unable to read {path}")]
    ReadFile {
        /// The file that could not be read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The CA file is not a PEM certificate
    #[error("invalid certificate in {path}")]
    Certificate {
        /// The CA file
        path: PathBuf,
        /// Why it was rejected
        #[source]
        source: reqwest::Error,
    },

    /// The client certificate and key do not make an identity
    #[error("invalid client certificate or key in {cert} and {key}")]
    Identity {
        /// The client certificate file
        cert: PathBuf,
        /// The private key file
        key: PathBuf,
        /// Why they were rejected
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client could not be built
    #[error("unable to build HTTP client")]
    Build(#[source] reqwest::Error),
}

/// Read a file, naming it in the error
fn read_file(path: &Path) -> Result<Vec<u8>, ClientError> {
    std::fs::read(path).map_err(|source| ClientError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Identity from a PEM certificate chain and its private key
fn client_identity(cert: &Path, key: &Path) -> Result<reqwest::Identity, ClientError> {
    let mut pem = read_file(cert)?;
    pem.push(b'\n');
    pem.extend(read_file(key)?);
    reqwest::Identity::from_pem(&pem).map_err(|source| ClientError::Identity {
        cert: cert.to_path_buf(),
        key: key.to_path_buf(),
        source,
    })
}

/// Errors fetching one endpoint
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The request could not be sent or the body not read
    #[error("request to {url} failed: {source}")]
    Request {
        /// Requested URL
        url: Url,
        /// Underlying HTTP error
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with something other than 200
    #[error("{url} answered {status}")]
    Status {
        /// Requested URL
        url: Url,
        /// HTTP status of the answer
        status: StatusCode,
    },

    /// The configured base URL cannot have an endpoint path appended
    #[error("{0} cannot be used as a base URL")]
    BaseUrl(Url),
}

/// Client for the management API
#[derive(Debug, Clone)]
pub struct RabbitClient {
    /// Shared HTTP connection pool
    http: reqwest::Client,
    /// Base URL of the management API
    base: Url,
    /// Login name
    username: String,
    /// Login password
    password: String,
    /// Add `sort=` to requests
    no_sort: bool,
    /// Format to ask for
    accept: Format,
}

impl RabbitClient {
    /// Build a client from the command line configuration
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let credentials = &config.credentials;
        let username = credentials
            .username()
            .map_err(|source| ClientError::ReadFile {
                path: credentials.rabbit_user_file.clone().unwrap_or_default(),
                source,
            })?;
        let password = credentials
            .password()
            .map_err(|source| ClientError::ReadFile {
                path: credentials.rabbit_password_file.clone().unwrap_or_default(),
                source,
            })?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.tls.skip_verify);
        match &config.tls.ca_file {
            Some(path) => {
                let pem = read_file(path)?;
                let cert = reqwest::Certificate::from_pem(&pem).map_err(|source| {
                    ClientError::Certificate {
                        path: path.clone(),
                        source,
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }
            None => info!("Using default certificate pool"),
        }
        if let (Some(cert), Some(key)) = (&config.tls.cert_file, &config.tls.key_file) {
            builder = builder.identity(client_identity(cert, key)?);
            debug!(cert = %cert.display(), "Presenting a client certificate");
        }
        let http = builder.build().map_err(ClientError::Build)?;

        Ok(Self {
            http,
            base: config.rabbit_url.clone(),
            username,
            password,
            no_sort: config.rabbit_capabilities.no_sort,
            accept: accepted_format(config.rabbit_capabilities.bert),
        })
    }

    /// Base URL of the management API
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// URL of `/api/<endpoint>`
    fn endpoint_url(&self, endpoint: &str) -> Result<Url, ScrapeError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ScrapeError::BaseUrl(self.base.clone()))?
            .pop_if_empty()
            .push("api")
            .push(endpoint);
        if self.no_sort {
            url.query_pairs_mut().append_pair("sort", "");
        }
        Ok(url)
    }

    /// Fetch `/api/<endpoint>` and decode the reply in whatever format
    /// the server chose
    pub async fn fetch(&self, endpoint: &str) -> Result<Box<dyn Reply>, ScrapeError> {
        let url = self.endpoint_url(endpoint)?;
        let start = Instant::now();
        let response = self
            .http
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header(ACCEPT, self.accept.content_type())
            .send()
            .await
            .map_err(|source| ScrapeError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ScrapeError::Status { url, status });
        }
        let format = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(Format::from_content_type)
            .unwrap_or(Format::Json);
        let body = response
            .bytes()
            .await
            .map_err(|source| ScrapeError::Request {
                url: url.clone(),
                source,
            })?;
        debug!(
            endpoint,
            %format,
            bytes = body.len(),
            elapsed = ?start.elapsed(),
            "Metrics loaded"
        );
        Ok(make_reply(format, &body))
    }
}

/// Format to request given whether the `bert` capability is enabled
#[cfg(feature = "bert")]
fn accepted_format(bert: bool) -> Format {
    if bert {
        Format::Bert
    } else {
        Format::Json
    }
}

/// Format to request given whether the `bert` capability is enabled
#[cfg(not(feature = "bert"))]
fn accepted_format(bert: bool) -> Format {
    if bert {
        tracing::warn!("Built without the bert feature, requesting JSON");
    }
    Format::Json
}
