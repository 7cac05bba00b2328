use std::{fmt::Display, str::FromStr};

use color_eyre::eyre::OptionExt as _;

const GLOB_CHARS: &[char] = &['*', '?', '['];

/// A parsed s3 uri, optionally pinned to a specific object version.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
}

impl S3Uri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.key.ends_with('/') || self.key.is_empty()
    }

    /// Whether the key contains glob metacharacters and therefore names a
    /// listing rather than a single object.
    pub fn has_glob(&self) -> bool {
        self.key.contains(GLOB_CHARS)
    }
}

impl FromStr for S3Uri {
    type Err = color_eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bucket, key) = s
            .strip_prefix("s3://")
            .ok_or_eyre("must be a url that starts with `s3://`")?
            .split_once('/')
            .ok_or_eyre("expected s3://<bucket>/<key>")?;
        let (key, version_id) = match key.split_once("?versionId=") {
            Some((key, version)) if !version.is_empty() => (key, Some(version.to_owned())),
            _ => (key, None),
        };
        Ok(Self {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            version_id,
        })
    }
}

impl Display for S3Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)?;
        if let Some(version) = &self.version_id {
            write!(f, "?versionId={version}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_prefix_ends_in_slash() {
        let url = "s3://my-bucket/the/prefix/";
        let parts = S3Uri::from_str(url).unwrap();
        assert_eq!(parts, S3Uri::new("my-bucket", "the/prefix/"));
        assert!(parts.is_dir());
        assert_eq!(url, parts.to_string())
    }

    #[test]
    fn test_valid_simple_s3_url() {
        let url = "s3://my-bucket/my-key";
        let parts = S3Uri::from_str(url).unwrap();
        assert_eq!(parts, S3Uri::new("my-bucket", "my-key"));
        assert!(!parts.is_dir());
        assert!(!parts.has_glob());
        assert_eq!(url, parts.to_string())
    }

    #[test]
    fn test_valid_s3_url_with_complex_key() {
        let url = "s3://my-bucket/path/to/my/object.json";
        let parts = S3Uri::from_str(url).unwrap();
        assert_eq!(parts, S3Uri::new("my-bucket", "path/to/my/object.json"));
        assert!(!parts.is_dir());
        assert_eq!(url, parts.to_string())
    }

    #[test]
    fn test_glob_key_detected() {
        let parts = S3Uri::from_str("s3://my-bucket/logs/2024-*.gz").unwrap();
        assert!(parts.has_glob());
        let parts = S3Uri::from_str("s3://my-bucket/logs/2024-08.gz").unwrap();
        assert!(!parts.has_glob());
    }

    #[test]
    fn test_version_id() {
        let url = "s3://my-bucket/my-key?versionId=abc123";
        let parts = S3Uri::from_str(url).unwrap();
        assert_eq!(parts.bucket, "my-bucket");
        assert_eq!(parts.key, "my-key");
        assert_eq!(parts.version_id.as_deref(), Some("abc123"));
        assert_eq!(url, parts.to_string())
    }

    #[test]
    fn test_empty_key() {
        let url = "s3://my-bucket/";
        let parts = S3Uri::from_str(url).unwrap();
        assert_eq!(parts, S3Uri::new("my-bucket", ""));
        assert!(parts.is_dir());
        assert_eq!(url, parts.to_string())
    }

    #[test]
    fn test_missing_s3_prefix() {
        assert!(S3Uri::from_str("my-bucket/my-key").is_err());
    }

    #[test]
    fn test_missing_slash_after_bucket() {
        assert!(S3Uri::from_str("s3://my-bucket").is_err());
    }

    #[test]
    fn test_empty_string() {
        assert!(S3Uri::from_str("").is_err());
    }

    #[test]
    fn test_only_s3_prefix() {
        assert!(S3Uri::from_str("s3://").is_err());
    }
}
