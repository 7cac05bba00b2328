use aws_sdk_s3::types as s3_types;

/// Object durability/cost tier.
///
/// `Other` covers tiers this tool never writes (deep archive, intelligent
/// tiering, ...) but may still encounter in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageClass {
    #[default]
    Standard,
    ReducedRedundancy,
    StandardIa,
    Glacier,
    Other,
}

impl StorageClass {
    /// Single-character code used in listing output.
    pub fn code(self) -> char {
        match self {
            StorageClass::Standard => ' ',
            StorageClass::ReducedRedundancy => 'R',
            StorageClass::StandardIa => 'I',
            StorageClass::Glacier => 'G',
            StorageClass::Other => '?',
        }
    }

    /// The class to request on writes. `Other` is never selected for writes
    /// and falls back to standard.
    pub fn to_aws(self) -> s3_types::StorageClass {
        match self {
            StorageClass::Standard | StorageClass::Other => {
                s3_types::StorageClass::Standard
            }
            StorageClass::ReducedRedundancy => s3_types::StorageClass::ReducedRedundancy,
            StorageClass::StandardIa => s3_types::StorageClass::StandardIa,
            StorageClass::Glacier => s3_types::StorageClass::Glacier,
        }
    }

    pub fn from_object_class(class: &s3_types::ObjectStorageClass) -> Self {
        match class {
            s3_types::ObjectStorageClass::Standard => StorageClass::Standard,
            s3_types::ObjectStorageClass::ReducedRedundancy => {
                StorageClass::ReducedRedundancy
            }
            s3_types::ObjectStorageClass::StandardIa => StorageClass::StandardIa,
            s3_types::ObjectStorageClass::Glacier => StorageClass::Glacier,
            _ => StorageClass::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_codes() {
        assert_eq!(StorageClass::Standard.code(), ' ');
        assert_eq!(StorageClass::ReducedRedundancy.code(), 'R');
        assert_eq!(StorageClass::StandardIa.code(), 'I');
        assert_eq!(StorageClass::Glacier.code(), 'G');
        assert_eq!(StorageClass::Other.code(), '?');
    }

    #[test]
    fn write_class_never_other() {
        assert_eq!(
            StorageClass::Other.to_aws(),
            s3_types::StorageClass::Standard
        );
        assert_eq!(
            StorageClass::ReducedRedundancy.to_aws(),
            s3_types::StorageClass::ReducedRedundancy
        );
    }
}
