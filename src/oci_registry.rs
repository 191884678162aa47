use crate::config::Config;
use crate::image_reference::ImageReference;
use crate::secret_string::SecretString;
use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Certificate, Client, Response, StatusCode};
use std::fmt;
use std::fs;
use std::time::Duration;
use tracing::{debug, info};

/// Manifest media types offered to the registry. Registries pick whichever
/// format they store, so both OCI and Docker schema2 variants (single and
/// index/list) must be acceptable.
static MANIFEST_ACCEPT_TYPES: &[&str] = &[
    "application/vnd.oci.image.manifest.v1+json",
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.oci.image.index.v1+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
];

static DIGEST_HEADER: &str = "Docker-Content-Digest";

/// Supplies a bearer token for a registry hostname, if one is configured.
/// Implemented by `Config`; the client never hardcodes an auth scheme.
pub trait CredentialProvider {
    fn token_for(&self, registry: &str) -> Option<&SecretString>;
}

/// Resolves a tagged image reference to its current content digest. The
/// reconciler is generic over this seam so decision logic can be exercised
/// without a live registry.
pub trait DigestResolver {
    fn resolve(
        &self,
        image_reference: &ImageReference,
    ) -> impl Future<Output = Result<String, RegistryError>> + Send;
}

#[derive(Debug)]
pub enum RegistryError {
    Request(reqwest::Error),
    Status { registry: String, status: StatusCode },
    MissingDigestHeader,
    InvalidDigestHeader,
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Request(e) => write!(f, "registry request failed: {}", e),
            RegistryError::Status { registry, status } => write!(
                f,
                "registry {} returned error status {} while fetching manifest",
                registry, status
            ),
            RegistryError::MissingDigestHeader => write!(
                f,
                "response does not contain HTTP header {}",
                DIGEST_HEADER
            ),
            RegistryError::InvalidDigestHeader => write!(
                f,
                "received invalid UTF-8 content in {} header",
                DIGEST_HEADER
            ),
        }
    }
}

pub fn create_client(config: &Config) -> Result<Client> {
    info!("Initializing OCI Registry HTTP client");
    // System certificates are loaded automatically with rustls-tls-native-roots
    let mut client_builder =
        Client::builder().timeout(Duration::from_secs(config.registry_timeout_seconds));

    for file_path in &config.tls.ca_certificate_paths {
        let file_content = fs::read(file_path)
            .with_context(|| format!("Failed to read file {}", file_path.display()))?;
        let cert = Certificate::from_pem(&file_content).context("Failed to parse certificate")?;
        client_builder = client_builder.add_root_certificate(cert);
    }

    client_builder.build().context("Failed to build HTTP client")
}

/// Registry digest client backed by the v2 manifest endpoint.
pub struct RegistryClient<C> {
    http: Client,
    credentials: C,
}

impl<C: CredentialProvider> RegistryClient<C> {
    pub fn new(http: Client, credentials: C) -> Self {
        Self { http, credentials }
    }

    async fn fetch_digest_from_tag(
        &self,
        image_reference: &ImageReference,
    ) -> Result<String, RegistryError> {
        let url = format!(
            "https://{}/v2/{}/manifests/{}",
            image_reference.registry, image_reference.repository, image_reference.tag
        );
        debug!("Fetching manifest from URL {}", url);

        let mut request = self
            .http
            .get(&url)
            .header(ACCEPT, MANIFEST_ACCEPT_TYPES.join(", "));
        if let Some(token) = self.credentials.token_for(&image_reference.registry) {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        }

        let response = request.send().await.map_err(RegistryError::Request)?;
        if !response.status().is_success() {
            return Err(RegistryError::Status {
                registry: image_reference.registry.clone(),
                status: response.status(),
            });
        }

        get_digest_from_response(&response)
    }
}

impl<C: CredentialProvider + Sync> DigestResolver for RegistryClient<C> {
    fn resolve(
        &self,
        image_reference: &ImageReference,
    ) -> impl Future<Output = Result<String, RegistryError>> + Send {
        self.fetch_digest_from_tag(image_reference)
    }
}

fn get_digest_from_response(response: &Response) -> Result<String, RegistryError> {
    response
        .headers()
        .get(DIGEST_HEADER)
        .ok_or(RegistryError::MissingDigestHeader)?
        .to_str()
        .map_err(|_| RegistryError::InvalidDigestHeader)
        .map(str::to_owned)
}
