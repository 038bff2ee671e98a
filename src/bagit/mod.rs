pub use crate::bagit::bag::{create_bag, open_bag, Bag, BagItVersion, BagUpdater, Mode};
pub use crate::bagit::digest::DigestAlgorithm;
pub use crate::bagit::error::*;
pub use crate::bagit::fetch::{FetchEntry, FetchTable};
pub use crate::bagit::manifest::{Manifest, ManifestStore};
pub use crate::bagit::tag::{BagDeclaration, BagInfo};
pub use crate::bagit::validate::{validate_bag, ValidateOptions, ValidationDetail, ValidationResult, ValidationVerdict};

mod bag;
mod consts;
mod digest;
mod encoding;
mod error;
mod fetch;
mod io;
mod manifest;
mod path;
mod tag;
mod validate;
