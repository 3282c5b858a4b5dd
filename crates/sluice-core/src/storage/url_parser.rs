//! URL parsing for storage backends.
//!
//! Extracts backend configuration from the storage root URL of a job
//! (S3, GCS, Azure, local filesystem). Landing and routing prefixes are
//! resolved relative to the key part of the URL.

use object_store::path::Path;
use regex::Regex;
use snafu::ensure;
use std::sync::LazyLock;

use crate::error::{InvalidUrlSnafu, StorageError};

use super::{AzureConfig, GcsConfig, LocalConfig, S3Config};

const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

const GCS_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-_\.]+)\.storage\.googleapis\.com(/(?P<key>.+))?$";
const GCS_PATH: &str =
    r"^https://storage\.googleapis\.com/(?P<bucket>[a-z0-9\-_\.]+)(/(?P<key>.+))?$";
const GCS_URL: &str = r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)(/(?P<key>.+))?$";

const ABFS_URL: &str = r"^abfss?://(?P<container>[a-z0-9\-]+)@(?P<account>[a-z0-9]+)\.dfs\.core\.windows\.net(/(?P<key>.+))?$";
const AZURE_HTTPS: &str = r"^https://(?P<account>[a-z0-9]+)\.(blob|dfs)\.core\.windows\.net/(?P<container>[a-z0-9\-]+)(/(?P<key>.+))?$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Gcs,
    Azure,
    Local,
}

/// Matchers in evaluation order. Order matters: the generic `https://`
/// forms must be tried per backend before falling through to local paths.
static MATCHERS: LazyLock<Vec<(Backend, Vec<Regex>)>> = LazyLock::new(|| {
    let compile = |patterns: &[&str]| -> Vec<Regex> {
        patterns
            .iter()
            .map(|p| Regex::new(p).expect("storage URL patterns are valid regexes"))
            .collect()
    };

    vec![
        (
            Backend::S3,
            compile(&[S3_PATH, S3_VIRTUAL, S3_ENDPOINT_URL, S3_URL]),
        ),
        (Backend::Gcs, compile(&[GCS_PATH, GCS_VIRTUAL, GCS_URL])),
        (Backend::Azure, compile(&[ABFS_URL, AZURE_HTTPS])),
        (Backend::Local, compile(&[FILE_URI, FILE_URL, FILE_PATH])),
    ]
});

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Azure(AzureConfig),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a storage root URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (backend, regexes) in MATCHERS.iter() {
            if let Some(matches) = regexes.iter().find_map(|r| r.captures(url)) {
                return match backend {
                    Backend::S3 => Ok(Self::parse_s3(&matches)),
                    Backend::Gcs => Ok(Self::parse_gcs(&matches)),
                    Backend::Azure => Ok(Self::parse_azure(&matches)),
                    Backend::Local => Self::parse_local(&matches, url),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn group(matches: &regex::Captures, name: &str) -> String {
        matches
            .name(name)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    fn parse_s3(matches: &regex::Captures) -> Self {
        let bucket = Self::group(matches, "bucket");

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| matches.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            matches.name("endpoint").map(|endpoint| {
                let port = matches
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = matches
                    .name("protocol")
                    .map(|p| p.as_str())
                    .unwrap_or("https");
                format!("{protocol}://{}:{port}", endpoint.as_str())
            })
        });

        let key = matches.name("key").map(|m| m.as_str().into());

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key,
        })
    }

    fn parse_gcs(matches: &regex::Captures) -> Self {
        let bucket = Self::group(matches, "bucket");
        let key = matches.name("key").map(|r| r.as_str().into());

        BackendConfig::Gcs(GcsConfig { bucket, key })
    }

    fn parse_azure(matches: &regex::Captures) -> Self {
        let container = Self::group(matches, "container");
        let account = Self::group(matches, "account");
        let key = matches.name("key").map(|r| r.as_str().into());

        BackendConfig::Azure(AzureConfig {
            account,
            container,
            key,
        })
    }

    fn parse_local(matches: &regex::Captures, url: &str) -> Result<Self, StorageError> {
        let path = Self::group(matches, "path");
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        let path = path.trim_end_matches('/');

        ensure!(
            !path.is_empty(),
            InvalidUrlSnafu {
                url: url.to_string()
            }
        );

        Ok(BackendConfig::Local(LocalConfig {
            path: path.to_string(),
            key: None,
        }))
    }

    /// The key prefix inside the bucket/container, if any.
    pub fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Gcs(gcs) => gcs.key.as_ref(),
            BackendConfig::Azure(azure) => azure.key.as_ref(),
            BackendConfig::Local(local) => local.key.as_ref(),
        }
    }

    /// Short backend name for logging.
    pub fn scheme(&self) -> &'static str {
        match self {
            BackendConfig::S3(_) => "s3",
            BackendConfig::Gcs(_) => "gcs",
            BackendConfig::Azure(_) => "azure",
            BackendConfig::Local(_) => "file",
        }
    }
}
