use aws_sdk_s3::Client;
use aws_smithy_types::DateTime;
use color_eyre::eyre::WrapErr as _;
use futures::TryStream;

use crate::StorageClass;

/// One result out of a paginated listing.
#[derive(Debug, Clone)]
pub enum ListEntry {
    /// A pseudo-directory derived from the delimiter.
    Prefix(String),
    Object(RemoteObject),
}

#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime>,
    pub storage_class: StorageClass,
}

/// Lists all entries under `prefix`. With a delimiter, common prefixes are
/// reported as [`ListEntry::Prefix`] and objects below them are not visited;
/// without one the listing is fully recursive.
pub fn list_objects(
    client: &Client,
    bucket: &str,
    prefix: &str,
    delimiter: Option<&str>,
) -> impl TryStream<Ok = ListEntry, Error = color_eyre::Report> + Send + Unpin {
    let mut req = client.list_objects_v2().bucket(bucket).prefix(prefix);
    if let Some(delimiter) = delimiter {
        req = req.delimiter(delimiter);
    }
    let mut paginator = req.into_paginator().send();

    // Pin it here just to make people's lives easier elsewhere
    Box::pin(async_stream::try_stream! {
        while let Some(page) = paginator.next().await {
            let page = page.wrap_err("error while listing s3 objects")?;
            for common in page.common_prefixes() {
                if let Some(prefix) = common.prefix() {
                    yield ListEntry::Prefix(prefix.to_owned());
                }
            }
            for obj in page.contents() {
                yield ListEntry::Object(RemoteObject {
                    key: obj.key().unwrap_or_default().to_owned(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj.last_modified().cloned(),
                    storage_class: obj
                        .storage_class()
                        .map(StorageClass::from_object_class)
                        .unwrap_or_default(),
                });
            }
        }
    })
}
