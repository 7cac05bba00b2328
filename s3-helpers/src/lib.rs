mod client;
mod download;
mod list;
mod storage_class;
mod upload;
mod uri;

pub use crate::client::client;
pub use crate::download::download_file;
pub use crate::list::{list_objects, ListEntry, RemoteObject};
pub use crate::storage_class::StorageClass;
pub use crate::upload::{pick_part_size, upload_file, MAX_UPLOAD_PARTS};
pub use crate::uri::S3Uri;
