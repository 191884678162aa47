use std::fmt;

static DEFAULT_REGISTRY: &str = "registry-1.docker.io";
static DEFAULT_NAMESPACE: &str = "library";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

/// Outcome of parsing a raw image string. Digest-pinned references
/// (`repo@sha256:...`) carry their digest inline and never need a registry
/// lookup, so they are kept apart from tagged references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedImage {
    Tagged(ImageReference),
    Pinned { digest: String },
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    EmptyImage,
    MissingRepository,
    MissingTag,
    AmbiguousReference(String),
    InvalidFormat(String),
}

impl std::error::Error for ParseError {}
impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::EmptyImage => write!(f, "image string is empty"),
            ParseError::MissingRepository => write!(f, "repository is missing"),
            ParseError::MissingTag => write!(f, "tag is missing"),
            ParseError::AmbiguousReference(image) => {
                write!(f, "ambiguous colon in image reference: {}", image)
            }
            ParseError::InvalidFormat(image) => write!(f, "invalid image format: {}", image),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

impl ImageReference {
    /// Parses a raw image string into its components, applying the Docker
    /// conventions for omitted parts:
    ///
    /// - `nginx` -> `registry-1.docker.io/library/nginx:latest`
    /// - `org/app:stable` -> `registry-1.docker.io/org/app:stable`
    /// - `ghcr.io/org/app:1.2.3` -> unchanged
    ///
    /// The leading path segment is a registry host only if it contains a `.`
    /// or a `:` or equals `localhost`.
    pub fn parse(s: &str) -> Result<ParsedImage, ParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError::EmptyImage);
        }

        // Pinned references are already resolved, no registry lookup needed
        if let Some((name, digest)) = s.split_once('@') {
            if name.is_empty() || digest.is_empty() {
                return Err(ParseError::InvalidFormat(s.to_string()));
            }
            return Ok(ParsedImage::Pinned {
                digest: digest.to_string(),
            });
        }

        let (registry, remainder, hub) = match s.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest, false)
            }
            _ => (DEFAULT_REGISTRY.to_string(), s, true),
        };

        if remainder.is_empty() {
            return Err(ParseError::MissingRepository);
        }

        // The tag colon must sit in the trailing path component; a colon
        // anywhere else in the repository path is ambiguous
        let (repository, tag) = match remainder.rfind(':') {
            Some(pos) if pos > remainder.rfind('/').unwrap_or(0) => {
                (&remainder[..pos], remainder[pos + 1..].to_string())
            }
            Some(_) => return Err(ParseError::AmbiguousReference(s.to_string())),
            None => (remainder, "latest".to_string()),
        };

        if repository.is_empty() {
            return Err(ParseError::MissingRepository);
        }
        if repository.contains(':') {
            return Err(ParseError::AmbiguousReference(s.to_string()));
        }
        if tag.is_empty() {
            return Err(ParseError::MissingTag);
        }

        // Docker Hub single-name convention; explicit registries keep the
        // repository path as written
        let repository = if hub && !repository.contains('/') {
            format!("{}/{}", DEFAULT_NAMESPACE, repository)
        } else {
            repository.to_string()
        };

        Ok(ParsedImage::Tagged(Self {
            registry,
            repository,
            tag,
        }))
    }
}
