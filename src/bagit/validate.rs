//! Bag validation against the RFC 8493 "complete" and "valid" checklists:
//! structural checks (required tag files, at least one payload manifest),
//! manifest/filesystem correspondence, and, when asked for, fixity (actually
//! re-hashing every file).

use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use regex::{Captures, Regex};
use snafu::ResultExt;
use walkdir::WalkDir;

use crate::bagit::bag::BagItVersion;
use crate::bagit::consts::*;
use crate::bagit::digest::pool::{hash_files, CancellationToken};
use crate::bagit::digest::DigestAlgorithm;
use crate::bagit::error::Error::*;
use crate::bagit::error::*;
use crate::bagit::fetch::FetchTable;
use crate::bagit::manifest::{parse_manifest_file, ManifestStore};
use crate::bagit::tag::{read_bag_declaration, read_bag_info, BagInfo};

/// One discrepancy found while validating a bag. A `ValidationResult`
/// accumulates these rather than failing fast, so a single call reports
/// everything wrong with a bag instead of just the first problem found.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ValidationDetail {
    /// A file a manifest or tagmanifest lists is not present on disk.
    FileMissing { path: PathBuf },
    /// A file is present under `data/` but not listed in any payload manifest
    /// (or, for BagIt 1.0, not listed in *every* payload manifest).
    UnexpectedFile { path: PathBuf },
    /// A file's recorded digest does not match what was actually computed.
    ChecksumMismatch {
        path: PathBuf,
        algorithm: DigestAlgorithm,
        expected: String,
        found: String,
    },
    /// A problem with the bag's shape that isn't about one specific file:
    /// a missing `data/` directory, no payload manifest, manifests that
    /// disagree about the set of files they cover, and so on.
    StructuralError { message: String },
    /// The declared `Payload-Oxum` doesn't match the payload actually on
    /// disk (this is a soft finding here; `fast` validation treats the same
    /// disagreement as a hard failure instead).
    OxumMismatch {
        expected_bytes: u64,
        expected_files: u64,
        actual_bytes: u64,
        actual_files: u64,
    },
}

impl Display for ValidationDetail {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValidationDetail::FileMissing { path } => {
                write!(f, "{} is listed but does not exist", path.display())
            }
            ValidationDetail::UnexpectedFile { path } => write!(
                f,
                "{} exists but is not listed in every payload manifest",
                path.display()
            ),
            ValidationDetail::ChecksumMismatch {
                path,
                algorithm,
                expected,
                found,
            } => write!(
                f,
                "{} failed {} verification: expected {}, found {}",
                path.display(),
                algorithm,
                expected,
                found
            ),
            ValidationDetail::StructuralError { message } => write!(f, "{message}"),
            ValidationDetail::OxumMismatch {
                expected_bytes,
                expected_files,
                actual_bytes,
                actual_files,
            } => write!(
                f,
                "Payload-Oxum mismatch: expected {expected_bytes} bytes across {expected_files} \
                 files, found {actual_bytes} bytes across {actual_files} files"
            ),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ValidationVerdict {
    /// Complete, and every checksum was verified.
    Valid,
    /// Every required element is present and conforms, but checksums were
    /// not re-verified against file contents.
    Complete,
    /// At least one `ValidationDetail` was recorded.
    Invalid,
}

/// The outcome of validating a bag: a verdict plus the full list of
/// discrepancies found, if any.
#[derive(Debug)]
pub struct ValidationResult {
    verdict: ValidationVerdict,
    details: Vec<ValidationDetail>,
}

/// Tuning knobs for `validate_bag`.
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    integrity_check: bool,
    fast: bool,
    processes: usize,
}

impl ValidateOptions {
    pub fn new() -> Self {
        Self {
            integrity_check: true,
            fast: false,
            processes: 1,
        }
    }

    /// When `false`, checksums are not recomputed and the best achievable
    /// verdict is `Complete` rather than `Valid`.
    pub fn with_integrity_check(mut self, integrity_check: bool) -> Self {
        self.integrity_check = integrity_check;
        self
    }

    /// When `true`, skip every other check and only compare the declared
    /// `Payload-Oxum` against the payload actually on disk. Fails with
    /// `OxumMissing` if the bag doesn't declare one, and never hashes
    /// anything, so it won't catch a file whose content changed but whose
    /// size didn't.
    pub fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    /// Number of OS threads used to recompute checksums during fixity
    /// checking. Values <= 1 hash inline.
    pub fn with_processes(mut self, processes: usize) -> Self {
        self.processes = processes.max(1);
        self
    }
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    fn new(verdict: ValidationVerdict) -> Self {
        Self {
            verdict,
            details: Vec::new(),
        }
    }

    fn push(&mut self, detail: ValidationDetail) {
        self.details.push(detail);
    }

    pub fn verdict(&self) -> ValidationVerdict {
        self.verdict
    }

    pub fn details(&self) -> &[ValidationDetail] {
        &self.details
    }

    pub fn is_valid(&self) -> bool {
        self.details.is_empty()
    }

    /// Turns a non-empty result into `Err(Error::BagValidationError)`, for
    /// callers that would rather propagate with `?` than inspect `details()`.
    pub fn into_result(self) -> Result<()> {
        if self.details.is_empty() {
            Ok(())
        } else {
            Err(BagValidationError {
                details: self.details,
            })
        }
    }
}

/// Validates the bag rooted at `base_dir` per `options`, returning a total
/// `ValidationResult` for structural and content problems. Only conditions
/// that prevent validation from running at all (the directory doesn't
/// exist, an I/O error, a byte-order mark) are surfaced as `Err`.
pub fn validate_bag<P: AsRef<Path>>(base_dir: P, options: ValidateOptions) -> Result<ValidationResult> {
    let base_dir = base_dir.as_ref();

    if !base_dir.is_dir() {
        return Err(NotFound {
            path: base_dir.to_path_buf(),
        });
    }

    let mut result = ValidationResult::new(if options.integrity_check && !options.fast {
        ValidationVerdict::Valid
    } else {
        ValidationVerdict::Complete
    });

    let declaration = match read_bag_declaration(base_dir) {
        Ok(declaration) => declaration,
        Err(e) => {
            return match declaration_error_message(&e) {
                Some(message) => {
                    result.push(ValidationDetail::StructuralError { message });
                    result.verdict = ValidationVerdict::Invalid;
                    Ok(result)
                }
                None => Err(e),
            };
        }
    };

    let bag_info = read_bag_info(base_dir)?;

    if options.fast {
        check_payload_oxum_fast(base_dir, &bag_info)?;
        return Ok(result);
    }

    check_payload_oxum(base_dir, &bag_info, &mut result)?;

    let data_dir = base_dir.join(DATA);
    if !data_dir.is_dir() {
        result.push(ValidationDetail::StructuralError {
            message: format!("required payload directory '{DATA}' is missing"),
        });
    }

    let payload_manifests = load_manifest_store(base_dir, &PAYLOAD_MANIFEST_MATCHER)?;
    if payload_manifests.is_empty() {
        result.push(ValidationDetail::StructuralError {
            message: "bag has no payload manifest".to_string(),
        });
    }
    check_manifest_agreement(&payload_manifests, "payload", &mut result);

    let tag_manifests = load_manifest_store(base_dir, &TAG_MANIFEST_MATCHER)?;
    check_manifest_agreement(&tag_manifests, "tag", &mut result);

    let fetch_path = base_dir.join(FETCH_TXT);
    let fetch_table = if fetch_path.is_file() {
        crate::bagit::fetch::parse_fetch_file(&fetch_path)?
    } else {
        FetchTable::new()
    };

    check_payload_correspondence(
        &payload_manifests,
        base_dir,
        &fetch_table,
        declaration.version(),
        &mut result,
    )?;
    check_tag_manifest_presence(&tag_manifests, base_dir, &mut result);

    if options.integrity_check {
        verify_fixity(&payload_manifests, base_dir, options.processes, &mut result)?;
        verify_fixity(&tag_manifests, base_dir, options.processes, &mut result)?;
    }

    if !result.details.is_empty() {
        result.verdict = ValidationVerdict::Invalid;
    }

    Ok(result)
}

/// Classifies an error from `read_bag_declaration` as either a structural
/// validation finding (the bag is simply malformed) or a hard failure that
/// should abort validation outright (an I/O error unrelated to the bag's
/// shape, a byte-order mark making the file's very content suspect).
fn declaration_error_message(error: &Error) -> Option<String> {
    match error {
        IoRead { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
            Some(format!("{BAGIT_TXT} does not exist"))
        }
        MissingTag { tag } => Some(format!("{BAGIT_TXT} is missing required tag '{tag}'")),
        InvalidBagItVersion { value } => {
            Some(format!("{BAGIT_TXT} declares an invalid BagIt-Version: {value}"))
        }
        UnsupportedEncoding { encoding } => {
            Some(format!("{BAGIT_TXT} declares an unsupported encoding: {encoding}"))
        }
        InvalidTagLine { details } => Some(format!("{BAGIT_TXT} is malformed: {details}")),
        _ => None,
    }
}

/// The `fast` validation mode: compares a bag's declared `Payload-Oxum`
/// against the payload actually on disk (total byte count and file count, no
/// hashing involved) and fails hard on any disagreement, matching
/// `bagit-python`'s `validate(fast=True)`. A bag with no `Payload-Oxum` fails
/// with `OxumMissing` rather than being treated as vacuously fast-valid.
fn check_payload_oxum_fast(base_dir: &Path, bag_info: &BagInfo) -> Result<()> {
    let oxum = bag_info.payload_oxum().ok_or(OxumMissing)?;
    let (expected_bytes, expected_files) = parse_oxum(oxum)?;
    let (actual_bytes, actual_files) = sum_payload(base_dir)?;

    if expected_bytes != actual_bytes || expected_files != actual_files {
        return Err(OxumMismatch {
            expected_bytes,
            expected_files,
            actual_bytes,
            actual_files,
        });
    }

    Ok(())
}

/// The default/completeness path's Oxum check: `Payload-Oxum` is an optional
/// tag, so its absence is not reported, but when present its disagreement
/// with the payload on disk is recorded as a soft `ValidationDetail` rather
/// than aborting validation, consistent with every other check in this path.
fn check_payload_oxum(base_dir: &Path, bag_info: &BagInfo, result: &mut ValidationResult) -> Result<()> {
    let Some(oxum) = bag_info.payload_oxum() else {
        return Ok(());
    };

    let (expected_bytes, expected_files) = match parse_oxum(oxum) {
        Ok(parsed) => parsed,
        Err(_) => {
            result.push(ValidationDetail::StructuralError {
                message: format!("{LABEL_PAYLOAD_OXUM} is malformed: {oxum}"),
            });
            return Ok(());
        }
    };
    let (actual_bytes, actual_files) = sum_payload(base_dir)?;

    if expected_bytes != actual_bytes || expected_files != actual_files {
        result.push(ValidationDetail::OxumMismatch {
            expected_bytes,
            expected_files,
            actual_bytes,
            actual_files,
        });
    }

    Ok(())
}

fn parse_oxum(value: &str) -> Result<(u64, u64)> {
    let malformed = || InvalidTag {
        label: LABEL_PAYLOAD_OXUM.to_string(),
        details: format!("expected '<byte count>.<file count>', found '{value}'"),
    };

    let (bytes, files) = value.split_once('.').ok_or_else(malformed)?;
    let bytes = bytes.parse::<u64>().map_err(|_| malformed())?;
    let files = files.parse::<u64>().map_err(|_| malformed())?;
    Ok((bytes, files))
}

/// Total byte count and file count of everything under `data/`, without
/// touching file contents.
fn sum_payload(base_dir: &Path) -> Result<(u64, u64)> {
    let data_dir = base_dir.join(DATA);
    if !data_dir.is_dir() {
        return Ok((0, 0));
    }

    let mut bytes = 0u64;
    let mut files = 0u64;
    for entry in WalkDir::new(&data_dir) {
        let entry = entry.context(WalkFileSnafu {})?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata().context(WalkFileSnafu {})?;
        bytes += metadata.len();
        files += 1;
    }

    Ok((bytes, files))
}

fn load_manifest_store(base_dir: &Path, matcher: &Regex) -> Result<ManifestStore> {
    let mut store = ManifestStore::new();

    for entry in fs::read_dir(base_dir).context(IoReadDirSnafu { path: base_dir })? {
        let entry = entry.context(IoReadDirSnafu { path: base_dir })?;
        if !entry
            .file_type()
            .context(IoStatSnafu { path: entry.path() })?
            .is_file()
        {
            continue;
        }

        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let Some(captures) = matcher.captures(&file_name) else {
            continue;
        };

        match capture_algorithm(&captures) {
            Some(algorithm) => {
                let manifest = parse_manifest_file(&entry.path())?;
                store.insert(algorithm, manifest);
            }
            None => warn!("Skipping manifest with unsupported algorithm: {file_name}"),
        }
    }

    Ok(store)
}

fn capture_algorithm(captures: &Captures) -> Option<DigestAlgorithm> {
    captures.get(1)?.as_str().try_into().ok()
}

/// A well-formed bag has every algorithm's manifest agree on the set of
/// files it covers (Open Question 3: disagreement is reported, never
/// silently reconciled).
fn check_manifest_agreement(store: &ManifestStore, role: &str, result: &mut ValidationResult) {
    let mut algorithms = store.algorithms();
    let Some(first) = algorithms.next() else {
        return;
    };
    let baseline: Vec<_> = store.get(first).unwrap().paths().cloned().collect();

    for algorithm in algorithms {
        let entries: Vec<_> = store.get(algorithm).unwrap().paths().cloned().collect();
        if entries != baseline {
            result.push(ValidationDetail::StructuralError {
                message: format!(
                    "{role} manifests disagree about the set of files covered ({first} vs {algorithm})"
                ),
            });
            return;
        }
    }
}

fn check_payload_correspondence(
    manifests: &ManifestStore,
    base_dir: &Path,
    fetch_table: &FetchTable,
    version: BagItVersion,
    result: &mut ValidationResult,
) -> Result<()> {
    let listed = manifests.all_paths();
    let require_all_manifests = version >= BAGIT_1_0;

    for path in &listed {
        if !base_dir.join(path).is_file() && !fetch_table.declares(path) {
            result.push(ValidationDetail::FileMissing { path: path.clone() });
        }

        if require_all_manifests {
            for algorithm in manifests.algorithms() {
                if manifests.get(algorithm).unwrap().get(path).is_none() {
                    result.push(ValidationDetail::StructuralError {
                        message: format!(
                            "{} is not listed in the {} manifest",
                            path.display(),
                            algorithm
                        ),
                    });
                }
            }
        }
    }

    let data_dir = base_dir.join(DATA);
    if data_dir.is_dir() {
        for entry in WalkDir::new(&data_dir) {
            let entry = entry.context(WalkFileSnafu {})?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(base_dir)
                .unwrap_or(entry.path())
                .to_path_buf();

            if !listed.contains(&relative) {
                result.push(ValidationDetail::UnexpectedFile { path: relative });
            }
        }
    }

    Ok(())
}

/// Every file a tagmanifest lists must exist; a missing one is only a soft
/// finding once v0.97 made tagmanifests a recommendation rather than a
/// strict requirement for every tag file to appear in one.
fn check_tag_manifest_presence(manifests: &ManifestStore, base_dir: &Path, result: &mut ValidationResult) {
    for path in manifests.all_paths() {
        if !base_dir.join(&path).is_file() {
            result.push(ValidationDetail::FileMissing { path });
        }
    }
}

fn verify_fixity(
    manifests: &ManifestStore,
    root: &Path,
    processes: usize,
    result: &mut ValidationResult,
) -> Result<()> {
    for algorithm in manifests.algorithms() {
        let manifest = manifests.get(algorithm).unwrap();

        let files: Vec<_> = manifest
            .paths()
            .filter(|p| root.join(p).is_file())
            .map(|p| (root.join(p), p.clone()))
            .collect();

        let token = CancellationToken::new();
        let digests = hash_files(files, &[algorithm], processes, &token)?;

        for (path, expected) in manifest.iter() {
            match digests.get(path).and_then(|d| d.get(&algorithm)) {
                Some(found) if found == expected => {}
                Some(found) => result.push(ValidationDetail::ChecksumMismatch {
                    path: path.clone(),
                    algorithm,
                    expected: expected.as_str().to_string(),
                    found: found.as_str().to_string(),
                }),
                None => {
                    // Already reported by `check_payload_correspondence`/
                    // `check_tag_manifest_presence` as a `FileMissing`.
                }
            }
        }
    }

    Ok(())
}
