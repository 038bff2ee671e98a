use crate::bagit::bag::BagItVersion;
use crate::bagit::validate::ValidationDetail;
use snafu::prelude::*;
use std::path::PathBuf;
use std::string::FromUtf8Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("IO error: {}", source))]
    IoGeneral { source: std::io::Error },
    #[snafu(display("Error creating file {}: {}", path.display(), source))]
    IoCreate {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error writing to file {}: {}", path.display(), source))]
    IoWrite {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error reading file {}: {}", path.display(), source))]
    IoRead {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error reading directory {}: {}", path.display(), source))]
    IoReadDir {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Failed to move {} to {}: {}", from.display(), to.display(), source))]
    IoMove {
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
    #[snafu(display("Failed to copy {} to {}: {}", from.display(), to.display(), source))]
    IoCopy {
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
    #[snafu(display("Failed to delete {}: {}", path.display(), source))]
    IoDelete {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Failed to stat {}: {}", path.display(), source))]
    IoStat {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error walking files: {}", source))]
    WalkFile { source: walkdir::Error },
    #[snafu(display("Encountered an unsupported file type at {}", path.display()))]
    UnsupportedFile { path: PathBuf },
    #[snafu(display("Invalid tag line: {details}"))]
    InvalidTagLine { details: String },
    #[snafu(display("Tag number {num} in file {} is invalid: {details}", path.display()))]
    InvalidTagLineWithRef {
        path: PathBuf,
        num: u32,
        details: String,
    },
    #[snafu(display("Invalid tag with label '{label}': {details}"))]
    InvalidTag { label: String, details: String },
    #[snafu(display("Invalid BagIt version: {value}"))]
    InvalidBagItVersion { value: String },
    #[snafu(display("Missing required tag {tag}"))]
    MissingTag { tag: String },
    #[snafu(display("Unsupported BagIt version {version}"))]
    UnsupportedVersion { version: BagItVersion },
    #[snafu(display("Unsupported file encoding {encoding}"))]
    UnsupportedEncoding { encoding: String },
    #[snafu(display("{} contains a byte-order mark, which is not permitted", path.display()))]
    UnexpectedByteOrderMark { path: PathBuf },
    #[snafu(display("Failed to decode string: {source}"))]
    InvalidString { source: FromUtf8Error },
    #[snafu(display("Path {} is not valid UTF-8", path.display()))]
    InvalidUtf8Path { path: PathBuf },
    #[snafu(display(
        "Manifest entry '{path}' is unsafe: it escapes the bag's payload directory"
    ))]
    UnsafePath { path: String },
    #[snafu(display("No such bag directory: {}", path.display()))]
    NotFound { path: PathBuf },
    #[snafu(display("Insufficient permissions to operate on {}: {}", path.display(), reason))]
    InsufficientPermissions { path: PathBuf, reason: String },
    #[snafu(display("Bag at {} is not writable: {}", path.display(), reason))]
    InaccessibleBag { path: PathBuf, reason: String },
    #[snafu(display(
        "Fast validation requires a Payload-Oxum, but bag-info.txt does not declare one"
    ))]
    OxumMissing,
    #[snafu(display(
        "Payload-Oxum mismatch: expected {expected_bytes} bytes across {expected_files} files, \
         found {actual_bytes} bytes across {actual_files} files"
    ))]
    OxumMismatch {
        expected_bytes: u64,
        expected_files: u64,
        actual_bytes: u64,
        actual_files: u64,
    },
    #[snafu(display("Bag validation failed with {} issue(s)", details.len()))]
    BagValidationError { details: Vec<ValidationDetail> },
    #[snafu(display("Invalid fetch.txt entry: {details}"))]
    InvalidFetchEntry { details: String },
    #[snafu(display("Operation was cancelled"))]
    Cancelled,
}
