use camino::{Utf8Path, Utf8PathBuf};
use squall_s3_helpers::S3Uri;

/// A typed command argument.
///
/// `Remote` keeps the verbatim text and the parsed uri side by side; `append`
/// extends them in lock-step so error messages always show what the store
/// actually saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    Local(Utf8PathBuf),
    Remote { text: String, uri: S3Uri },
    Raw(String),
}

impl Argument {
    pub fn local(path: impl Into<Utf8PathBuf>) -> Self {
        Argument::Local(path.into())
    }

    pub fn remote(uri: S3Uri) -> Self {
        Argument::Remote {
            text: uri.to_string(),
            uri,
        }
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Argument::Raw(text.into())
    }

    pub fn text(&self) -> &str {
        match self {
            Argument::Local(path) => path.as_str(),
            Argument::Remote { text, .. } => text,
            Argument::Raw(text) => text,
        }
    }

    pub fn as_local(&self) -> Option<&Utf8Path> {
        match self {
            Argument::Local(path) => Some(path),
            _ => None,
        }
    }

    pub fn as_remote(&self) -> Option<&S3Uri> {
        match self {
            Argument::Remote { uri, .. } => Some(uri),
            _ => None,
        }
    }

    /// Returns a new argument extended by `fragment`.
    ///
    /// Separators in the appended portion follow the destination side: remote
    /// keys always use `/`, local paths the host separator. `remote_side`
    /// only disambiguates `Raw` arguments; for the typed variants the variant
    /// itself decides.
    pub fn append(&self, fragment: &str, remote_side: bool) -> Argument {
        match self {
            Argument::Local(path) => {
                let fragment = fragment
                    .trim_start_matches(['/', std::path::MAIN_SEPARATOR])
                    .replace('/', std::path::MAIN_SEPARATOR_STR);
                Argument::Local(path.join(fragment))
            }
            Argument::Remote { uri, .. } => {
                let fragment = fragment
                    .trim_start_matches(std::path::MAIN_SEPARATOR)
                    .replace(std::path::MAIN_SEPARATOR, "/");
                let key = join_key(&uri.key, &fragment);
                Argument::remote(S3Uri::new(uri.bucket.clone(), key))
            }
            Argument::Raw(text) => {
                let sep = if remote_side {
                    "/".to_string()
                } else {
                    std::path::MAIN_SEPARATOR_STR.to_string()
                };
                if text.is_empty() || text.ends_with(&sep) {
                    Argument::Raw(format!("{text}{fragment}"))
                } else {
                    Argument::Raw(format!("{text}{sep}{fragment}"))
                }
            }
        }
    }
}

fn join_key(key: &str, fragment: &str) -> String {
    if key.is_empty() || key.ends_with('/') {
        format!("{key}{fragment}")
    } else {
        format!("{key}/{fragment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn remote_append_keeps_text_and_key_in_lock_step() {
        let arg = Argument::remote(S3Uri::from_str("s3://bucket/prefix/").unwrap());
        let appended = arg.append("sub/z", true);
        assert_eq!(appended.text(), "s3://bucket/prefix/sub/z");
        assert_eq!(appended.as_remote().unwrap().key, "prefix/sub/z");

        let no_slash = Argument::remote(S3Uri::from_str("s3://bucket/prefix").unwrap());
        let appended = no_slash.append("x", true);
        assert_eq!(appended.as_remote().unwrap().key, "prefix/x");
        assert_eq!(appended.text(), "s3://bucket/prefix/x");
    }

    #[test]
    fn remote_append_to_bucket_root() {
        let arg = Argument::remote(S3Uri::new("bucket", ""));
        let appended = arg.append("key", true);
        assert_eq!(appended.text(), "s3://bucket/key");
    }

    #[test]
    fn local_append_joins_with_host_separator() {
        let arg = Argument::local("out");
        let appended = arg.append("sub/z", false);
        assert_eq!(
            appended.as_local().unwrap(),
            Utf8Path::new("out").join("sub").join("z")
        );
    }

    #[test]
    fn local_append_ignores_leading_separator() {
        let arg = Argument::local("out");
        let appended = arg.append("/abs", false);
        assert_eq!(appended.text(), Utf8Path::new("out").join("abs").as_str());
    }

    #[test]
    fn clone_is_disjoint() {
        let original = Argument::local("a");
        let appended = original.clone().append("b", false);
        assert_eq!(original.text(), "a");
        assert_ne!(original, appended);
    }

    #[test]
    fn raw_append_respects_side() {
        let arg = Argument::raw("prefix");
        assert_eq!(arg.append("x", true).text(), "prefix/x");
    }
}
