use std::fmt;

use squall_s3_helpers::StorageClass;

/// The closed set of flags an operation may consult.
///
/// `delete_source` is carried by the command itself (`mv` vs `cp`) and is
/// therefore not part of the serialized suffix.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Skip (with an acceptable error) if the destination already exists.
    pub if_not_exists: bool,
    /// Remove the source after a successful copy/upload/download.
    pub delete_source: bool,
    /// Preserve the source sub-path relative to the glob's fixed prefix.
    pub parents: bool,
    /// Descend into directories in batch local copies.
    pub recursive: bool,
    /// Write with the reduced-redundancy storage class.
    pub rr: bool,
    /// Write with the standard-IA storage class.
    pub ia: bool,
}

impl Options {
    /// The class remote writes are tagged with. `rr` wins over `ia`.
    pub fn storage_class(&self) -> StorageClass {
        if self.rr {
            StorageClass::ReducedRedundancy
        } else if self.ia {
            StorageClass::StandardIa
        } else {
            StorageClass::Standard
        }
    }

    /// Consumes one command token. Returns false if it is not a recognized
    /// flag.
    pub fn parse_flag(&mut self, token: &str) -> bool {
        match token {
            "-n" => self.if_not_exists = true,
            "--parents" => self.parents = true,
            "-R" => self.recursive = true,
            "--rr" => self.rr = true,
            "--ia" => self.ia = true,
            _ => return false,
        }
        true
    }

    /// Stable rendering appended to batch sub-command names, e.g. ` -n --rr`.
    /// Empty when no serializable flag is set.
    pub fn suffix(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.if_not_exists {
            write!(f, " -n")?;
        }
        if self.parents {
            write!(f, " --parents")?;
        }
        if self.recursive {
            write!(f, " -R")?;
        }
        if self.rr {
            write!(f, " --rr")?;
        }
        if self.ia {
            write!(f, " --ia")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn suffix_is_stable() {
        let opts = Options {
            if_not_exists: true,
            rr: true,
            ..Default::default()
        };
        assert_eq!(opts.suffix(), " -n --rr");
        assert_eq!(Options::default().suffix(), "");
    }

    #[test]
    fn rr_wins_over_ia() {
        let opts = Options {
            rr: true,
            ia: true,
            ..Default::default()
        };
        assert_eq!(opts.storage_class(), StorageClass::ReducedRedundancy);
        let opts = Options {
            ia: true,
            ..Default::default()
        };
        assert_eq!(opts.storage_class(), StorageClass::StandardIa);
    }

    #[test]
    fn unknown_flag_rejected() {
        let mut opts = Options::default();
        assert!(!opts.parse_flag("--frobnicate"));
        assert_eq!(opts, Options::default());
    }

    proptest! {
        // Parsing a printed suffix reproduces the original set.
        #[test]
        fn suffix_round_trips(
            if_not_exists: bool,
            parents: bool,
            recursive: bool,
            rr: bool,
            ia: bool,
        ) {
            let opts = Options {
                if_not_exists,
                delete_source: false,
                parents,
                recursive,
                rr,
                ia,
            };
            let mut reparsed = Options::default();
            for token in opts.suffix().split_whitespace() {
                prop_assert!(reparsed.parse_flag(token));
            }
            prop_assert_eq!(opts, reparsed);
        }
    }
}
