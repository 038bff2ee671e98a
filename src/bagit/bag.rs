use chrono::Local;
use std::ffi::OsStr;
use std::fmt::{Display, Formatter};
use std::fs;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{error, info, warn};
use regex::{Captures, Regex};
use snafu::ResultExt;
use walkdir::{DirEntry, WalkDir};

use crate::bagit::consts::*;
use crate::bagit::digest::pool::{hash_files, CancellationToken, DigestResults};
use crate::bagit::digest::DigestAlgorithm;
use crate::bagit::error::Error::*;
use crate::bagit::error::*;
use crate::bagit::fetch::{self, FetchTable};
use crate::bagit::manifest;
use crate::bagit::tag::{
    read_bag_declaration, read_bag_info, write_bag_declaration, write_bag_info, BagDeclaration,
    BagInfo,
};
use crate::bagit::validate;
use crate::bagit::validate::{ValidateOptions, ValidationResult};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct BagItVersion {
    major: u8,
    minor: u8,
}

/// Whether `create_bag` is forming a brand new bag out of loose files, or
/// refreshing an existing bag's tag files and manifests while keeping its
/// payload bytes untouched. Replaces the re-bagging heuristic ("does
/// bagit.txt already exist?") with an explicit choice.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Mode {
    Create,
    Rebag,
}

#[derive(Debug)]
pub struct Bag {
    base_dir: PathBuf,
    declaration: BagDeclaration,
    bag_info: BagInfo,
    algorithms: Vec<DigestAlgorithm>,
    fetch_table: FetchTable,
}

#[derive(Debug)]
pub struct BagUpdater {
    bag: Bag,
    recalculate_payload_manifests: bool,
    algorithms: Vec<DigestAlgorithm>,
    bagging_date: Option<String>,
    software_agent: Option<String>,
    processes: usize,
}

struct FileMeta {
    path: PathBuf,
    size_bytes: u64,
}

/// Creates a new bag in place by moving (or, if `dst_dir != src_dir`, copying) the contents of
/// `src_dir` into the bag's payload directory, then writing all of the tag files and manifests.
/// `processes` controls how many OS threads the digest pool uses; `mode` distinguishes a fresh
/// bag from refreshing an existing one's fixity without moving its payload a second time.
pub fn create_bag<S: AsRef<Path>, D: AsRef<Path>>(
    src_dir: S,
    dst_dir: D,
    mut bag_info: BagInfo,
    algorithms: &[DigestAlgorithm],
    include_hidden_files: bool,
    processes: usize,
    mode: Mode,
) -> Result<Bag> {
    let src_dir = src_dir.as_ref();
    let dst_dir = dst_dir.as_ref();
    let processes = processes.max(1);
    let algorithms = defaulted_algorithms(algorithms);

    info!("Creating bag in {}", dst_dir.display());

    check_permissions(src_dir, dst_dir, mode)?;

    let payload_files = match mode {
        Mode::Create => {
            let in_place = src_dir == dst_dir;

            if !in_place {
                fs::create_dir_all(dst_dir).context(IoCreateSnafu { path: dst_dir })?;
            }

            let temp_name = format!("temp-{}", epoch_seconds());
            let temp_dir = dst_dir.join(&temp_name);
            fs::create_dir(&temp_dir).context(IoCreateSnafu { path: &temp_dir })?;

            let mut moved = move_into_dir(!in_place, src_dir, &temp_dir, |f| {
                f.file_name() != temp_name.as_str()
                    && !(!include_hidden_files && !in_place && is_hidden_file(f.file_name()))
            })?;

            let data_dir = dst_dir.join(DATA);
            rename(temp_dir, &data_dir)?;
            add_data_prefix(&mut moved);
            moved
        }
        Mode::Rebag => {
            if src_dir != dst_dir {
                return Err(InaccessibleBag {
                    path: dst_dir.to_path_buf(),
                    reason: "rebagging requires src_dir and dst_dir to be the same".to_string(),
                });
            }

            delete_payload_manifests(dst_dir)?;
            delete_tag_manifests(dst_dir)?;
            remove_if_present(&dst_dir.join(BAGIT_TXT))?;
            remove_if_present(&dst_dir.join(BAG_INFO_TXT))?;
            remove_if_present(&dst_dir.join(FETCH_TXT))?;

            let mut existing = list_files(dst_dir.join(DATA))?;
            add_data_prefix(&mut existing);
            existing
        }
    };

    let payload_digests = hash_meta(dst_dir, &payload_files, &algorithms, processes)?;
    write_payload_manifests(&algorithms, &payload_files, &payload_digests, dst_dir)?;

    let declaration = BagDeclaration::new();
    write_bag_declaration(&declaration, dst_dir)?;

    if bag_info.bagging_date().is_none() {
        bag_info.add_bagging_date(current_date_str())?;
    }
    if bag_info.software_agent().is_none() {
        bag_info.add_software_agent(bagit_software_agent())?;
    }
    bag_info.add_payload_oxum(build_payload_oxum(&payload_files))?;
    write_bag_info(&bag_info, dst_dir)?;

    update_tag_manifests(dst_dir, &algorithms, processes)?;

    Ok(Bag::new(dst_dir, declaration, bag_info, algorithms))
}

/// Opens a BagIt bag that already exists in the specified directory
pub fn open_bag<P: AsRef<Path>>(base_dir: P) -> Result<Bag> {
    let base_dir = base_dir.as_ref();
    info!("Opening bag at {}", base_dir.display());

    if !base_dir.is_dir() {
        return Err(NotFound {
            path: base_dir.to_path_buf(),
        });
    }

    let declaration = read_bag_declaration(base_dir)?;
    let algorithms = detect_digest_algorithms(base_dir)?;
    let bag_info = read_bag_info(base_dir)?;

    let fetch_path = base_dir.join(FETCH_TXT);
    let fetch_table = if fetch_path.is_file() {
        fetch::parse_fetch_file(&fetch_path)?
    } else {
        FetchTable::new()
    };

    Ok(Bag::with_fetch_table(
        base_dir,
        declaration,
        bag_info,
        algorithms,
        fetch_table,
    ))
}

/// Validates the bag at the specified path. See [`crate::bagit::validate::validate_bag`] for the
/// full checklist this runs.
pub fn validate_bag<P: AsRef<Path>>(
    base_dir: P,
    options: ValidateOptions,
) -> Result<ValidationResult> {
    validate::validate_bag(base_dir, options)
}

impl BagItVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl Display for BagItVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl TryFrom<String> for BagItVersion {
    type Error = Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        TryFrom::try_from(&value)
    }
}

impl TryFrom<&String> for BagItVersion {
    type Error = Error;

    fn try_from(value: &String) -> std::result::Result<Self, Self::Error> {
        if let Some((major, minor)) = value.split_once('.') {
            let major = major.parse::<u8>().map_err(|_| InvalidBagItVersion {
                value: value.into(),
            })?;
            let minor = minor.parse::<u8>().map_err(|_| InvalidBagItVersion {
                value: value.into(),
            })?;
            Ok(BagItVersion::new(major, minor))
        } else {
            Err(InvalidBagItVersion {
                value: value.into(),
            })
        }
    }
}

impl Bag {
    pub fn new<P: AsRef<Path>>(
        base_dir: P,
        declaration: BagDeclaration,
        bag_info: BagInfo,
        algorithms: Vec<DigestAlgorithm>,
    ) -> Self {
        Self::with_fetch_table(base_dir, declaration, bag_info, algorithms, FetchTable::new())
    }

    pub fn with_fetch_table<P: AsRef<Path>>(
        base_dir: P,
        declaration: BagDeclaration,
        bag_info: BagInfo,
        algorithms: Vec<DigestAlgorithm>,
        fetch_table: FetchTable,
    ) -> Self {
        Self {
            base_dir: base_dir.as_ref().into(),
            declaration,
            bag_info,
            algorithms,
            fetch_table,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn declaration(&self) -> &BagDeclaration {
        &self.declaration
    }

    pub fn bag_info(&self) -> &BagInfo {
        &self.bag_info
    }

    pub fn algorithms(&self) -> &[DigestAlgorithm] {
        &self.algorithms
    }

    pub fn fetch_table(&self) -> &FetchTable {
        &self.fetch_table
    }

    /// Creates a `BagUpdater` that's used to update an existing bag
    pub fn update(self) -> BagUpdater {
        BagUpdater::new(self)
    }
}

impl BagUpdater {
    pub fn new(bag: Bag) -> Self {
        Self {
            bag,
            recalculate_payload_manifests: true,
            algorithms: Vec::new(),
            bagging_date: None,
            software_agent: None,
            processes: 1,
        }
    }

    /// Adds a digest algorithm to use for calculating manifests
    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithms.push(algorithm);
        self
    }

    /// Adds or replaces a bag-info.txt tag, subject to the same repeatability
    /// rules as `BagInfo::add`.
    pub fn with_tag<L: AsRef<str>, V: AsRef<str>>(mut self, label: L, value: V) -> Result<Self> {
        self.bag.bag_info.add(label, value)?;
        Ok(self)
    }

    /// Sets the algorithms to use when calculating manifests. An empty slice will result in
    /// the algorithms that were used to calculate the existing manifests to be used.
    pub fn with_algorithms(mut self, algorithms: &[DigestAlgorithm]) -> Self {
        self.algorithms.clear();
        self.algorithms.extend_from_slice(algorithms);
        self
    }

    /// Sets the Bagging-Date to add to bag-info.txt. None for the default value.
    pub fn with_bagging_date(mut self, bagging_date: Option<String>) -> Self {
        self.bagging_date = bagging_date;
        self
    }

    /// Sets the Bag-Software-Agent to add to bag-info.txt. None for the default value.
    pub fn with_software_agent(mut self, software_agent: Option<String>) -> Self {
        self.software_agent = software_agent;
        self
    }

    /// Number of OS threads the digest pool uses while recalculating manifests.
    pub fn with_processes(mut self, processes: usize) -> Self {
        self.processes = processes.max(1);
        self
    }

    /// Enables/disables payload manifest recalculation on `finalize()`. This is enabled by default,
    /// but can be disabled if the digest algorithms in use have not changed and there were no
    /// changes to the payload.
    pub fn recalculate_payload_manifests(mut self, recalculate: bool) -> Self {
        self.recalculate_payload_manifests = recalculate;
        self
    }

    /// Writes the changes to disk and recalculates manifests.
    pub fn finalize(mut self) -> Result<Bag> {
        let base_dir = self.bag.base_dir.clone();

        if !is_writable(&base_dir) {
            return Err(InaccessibleBag {
                path: base_dir,
                reason: "directory is not writable".to_string(),
            });
        }

        let algorithms = if !self.recalculate_payload_manifests || self.algorithms.is_empty() {
            self.bag.algorithms.clone()
        } else {
            self.algorithms.sort();
            self.algorithms.dedup();
            self.algorithms.clone()
        };

        self.bag
            .bag_info
            .add_bagging_date(self.bagging_date.unwrap_or_else(current_date_str))?;
        self.bag
            .bag_info
            .add_software_agent(self.software_agent.unwrap_or_else(bagit_software_agent))?;

        if self.recalculate_payload_manifests {
            delete_payload_manifests(&base_dir)?;
            let mut payload_files = list_files(base_dir.join(DATA))?;
            add_data_prefix(&mut payload_files);
            let digests = hash_meta(&base_dir, &payload_files, &algorithms, self.processes)?;
            write_payload_manifests(&algorithms, &payload_files, &digests, &base_dir)?;
            self.bag
                .bag_info
                .add_payload_oxum(build_payload_oxum(&payload_files))?;
        }

        write_bag_info(&self.bag.bag_info, &base_dir)?;

        delete_tag_manifests(&base_dir)?;
        update_tag_manifests(&base_dir, &algorithms, self.processes)?;

        self.bag.algorithms = algorithms;

        Ok(self.bag)
    }
}

/// Copies/moves the contents of the `src_dir` into the `dst_dir` and returns meta about all of the
/// moved files, relative to `dst_dir`. If `copy_op` is true the files are copied, otherwise moved.
fn move_into_dir<S, D, P>(
    copy_op: bool,
    src_dir: S,
    dst_dir: D,
    predicate: P,
) -> Result<Vec<FileMeta>>
where
    S: AsRef<Path>,
    D: AsRef<Path>,
    P: FnMut(&DirEntry) -> bool,
{
    let src_dir = src_dir.as_ref();
    let dst_dir = dst_dir.as_ref();

    let mut file_meta = Vec::new();
    let mut dirs = Vec::new();

    for file in WalkDir::new(src_dir).into_iter().filter_entry(predicate) {
        let file = file.context(WalkFileSnafu {})?;

        if file.file_type().is_file() {
            let metadata = file.metadata().context(WalkFileSnafu {})?;
            let relative = file.path().strip_prefix(src_dir).unwrap();

            file_meta.push(FileMeta {
                path: relative.to_path_buf(),
                size_bytes: metadata.len(),
            });

            let file_dst = dst_dir.join(relative);
            fs::create_dir_all(file_dst.parent().unwrap())
                .context(IoCreateSnafu { path: &file_dst })?;

            if copy_op {
                copy(file.path(), file_dst)?;
            } else {
                rename(file.path(), file_dst)?;
            }
        } else if file.file_type().is_dir() {
            if !copy_op {
                dirs.push(file.path().to_path_buf());
            }
        } else {
            return Err(UnsupportedFile {
                path: file.path().to_path_buf(),
            });
        }
    }

    // Delete any dangling directories left after moving out all of the files
    for dir in dirs {
        if dir == src_dir {
            continue;
        }
        if let Err(e) = fs::remove_dir_all(&dir) {
            if e.kind() != ErrorKind::NotFound {
                return Err(IoDelete {
                    path: dir,
                    source: e,
                });
            }
        }
    }

    Ok(file_meta)
}

/// Lists the files already present under `dir`, relative to `dir`, without moving anything.
/// Used when rebagging, where the payload is already where it needs to be.
fn list_files<P: AsRef<Path>>(dir: P) -> Result<Vec<FileMeta>> {
    let dir = dir.as_ref();
    let mut file_meta = Vec::new();

    if !dir.is_dir() {
        return Ok(file_meta);
    }

    for file in WalkDir::new(dir) {
        let file = file.context(WalkFileSnafu {})?;
        if file.file_type().is_file() {
            let metadata = file.metadata().context(WalkFileSnafu {})?;
            file_meta.push(FileMeta {
                path: file.path().strip_prefix(dir).unwrap().to_path_buf(),
                size_bytes: metadata.len(),
            });
        }
    }

    Ok(file_meta)
}

/// Prefixes all payload files with `data/`
fn add_data_prefix(file_meta: &mut [FileMeta]) {
    let relative_data_dir = PathBuf::from(DATA);
    for meta in file_meta {
        meta.path = relative_data_dir.join(&meta.path);
    }
}

/// Runs the hasher pool over every file in `file_meta`, whose `path` is relative to `base_dir`.
fn hash_meta(
    base_dir: &Path,
    file_meta: &[FileMeta],
    algorithms: &[DigestAlgorithm],
    processes: usize,
) -> Result<DigestResults> {
    let pairs = file_meta
        .iter()
        .map(|meta| (base_dir.join(&meta.path), meta.path.clone()));
    let token = CancellationToken::new();
    hash_files(pairs, algorithms, processes, &token)
}

/// Calculates the digests for all of the tag files in the bag and writes the tag manifests
fn update_tag_manifests(base_dir: &Path, algorithms: &[DigestAlgorithm], processes: usize) -> Result<()> {
    let mut meta = list_files(base_dir)?;
    meta.retain(|m| {
        let top_level = m.path.components().next();
        let is_data_dir = top_level
            .map(|c| c.as_os_str() == DATA)
            .unwrap_or(false);
        let is_tag_manifest = m
            .path
            .file_name()
            .and_then(OsStr::to_str)
            .map(|n| TAG_MANIFEST_MATCHER.is_match(n))
            .unwrap_or(false);
        !is_data_dir && !is_tag_manifest
    });

    let digests = hash_meta(base_dir, &meta, algorithms, processes)?;
    write_manifests(algorithms, &meta, &digests, TAG_MANIFEST_PREFIX, base_dir, true)
}

fn write_payload_manifests(
    algorithms: &[DigestAlgorithm],
    file_meta: &[FileMeta],
    digests: &DigestResults,
    base_dir: &Path,
) -> Result<()> {
    write_manifests(algorithms, file_meta, digests, PAYLOAD_MANIFEST_PREFIX, base_dir, false)
}

fn write_manifests(
    algorithms: &[DigestAlgorithm],
    file_meta: &[FileMeta],
    digests: &DigestResults,
    prefix: &str,
    base_dir: &Path,
    is_tag_manifest: bool,
) -> Result<()> {
    let mut sorted: Vec<&FileMeta> = file_meta.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    for algorithm in algorithms {
        let manifest_path = base_dir.join(format!("{prefix}-{algorithm}.txt"));
        info!("Writing manifest {}", manifest_path.display());
        let file = File::create(&manifest_path).context(IoCreateSnafu { path: &manifest_path })?;
        let mut writer = std::io::BufWriter::new(file);

        for meta in &sorted {
            let encoded = crate::bagit::path::to_manifest_path(&meta.path)?;
            let digest = digests
                .get(&meta.path)
                .and_then(|by_alg| by_alg.get(algorithm))
                .expect("missing expected file digest");
            manifest::write_manifest_line(&mut writer, digest, &encoded, is_tag_manifest)?;
        }
    }

    Ok(())
}

fn rename<F: AsRef<Path>, T: AsRef<Path>>(from: F, to: T) -> Result<()> {
    let from = from.as_ref();
    let to = to.as_ref();
    info!("Moving {} to {}", from.display(), to.display());
    fs::rename(from, to).context(IoMoveSnafu { from, to })
}

fn copy<F: AsRef<Path>, T: AsRef<Path>>(from: F, to: T) -> Result<()> {
    let from = from.as_ref();
    let to = to.as_ref();
    info!("Copying {} to {}", from.display(), to.display());
    fs::copy(from, to).map(|_| ()).context(IoCopySnafu { from, to })
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IoDelete {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Deletes all payload manifests in the base directory
fn delete_payload_manifests(base_dir: &Path) -> Result<()> {
    delete_matching_files(base_dir, &PAYLOAD_MANIFEST_MATCHER)
}

/// Deletes all tag manifests in the base directory
fn delete_tag_manifests(base_dir: &Path) -> Result<()> {
    delete_matching_files(base_dir, &TAG_MANIFEST_MATCHER)
}

fn delete_matching_files(base_dir: &Path, file_regex: &Regex) -> Result<()> {
    for_matching_files(base_dir, file_regex, |path, _| {
        info!("Deleting file {}", path.display());
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != ErrorKind::NotFound {
                error!("Failed to delete file {}", path.display())
            }
        }
    })
}

fn detect_digest_algorithms(base_dir: &Path) -> Result<Vec<DigestAlgorithm>> {
    let mut algorithms = Vec::new();

    for_matching_files(base_dir, &PAYLOAD_MANIFEST_MATCHER, |_, captures| {
        let algorithm_str = captures.get(1).unwrap().as_str();
        match algorithm_str.try_into() {
            Ok(algorithm) => algorithms.push(algorithm),
            Err(_) => warn!("Detected unsupported digest algorithm: {algorithm_str}"),
        }
    })?;

    Ok(algorithms)
}

/// Iterates the files in a directory and applies `on_match` to the ones with file names that match
/// `file_regex`. `on_match` receives the path to the matched file as well as the captures from the
/// match.
fn for_matching_files<M>(base_dir: &Path, file_regex: &Regex, mut on_match: M) -> Result<()>
where
    M: FnMut(&Path, &Captures),
{
    for file in fs::read_dir(base_dir).context(IoReadDirSnafu { path: base_dir })? {
        let file = file.context(IoReadDirSnafu { path: base_dir })?;
        if file
            .file_type()
            .context(IoStatSnafu { path: file.path() })?
            .is_file()
        {
            if let Some(file_name) = file.file_name().to_str() {
                if let Some(captures) = file_regex.captures(file_name) {
                    on_match(&file.path(), &captures);
                }
            }
        }
    }

    Ok(())
}

/// If the input is empty a new vec with the default algorithm is returned. Otherwise, the input
/// is deduped and a new vec is returned.
fn defaulted_algorithms(algorithms: &[DigestAlgorithm]) -> Vec<DigestAlgorithm> {
    if algorithms.is_empty() {
        vec![DEFAULT_ALGORITHM]
    } else {
        let mut new = Vec::from(algorithms);
        new.sort();
        new.dedup();
        new
    }
}

fn build_payload_oxum(file_meta: &[FileMeta]) -> String {
    let count = file_meta.len();
    let sum: u64 = file_meta.iter().map(|m| m.size_bytes).sum();
    format!("{sum}.{count}")
}

fn bagit_software_agent() -> String {
    format!("bagit v{} <{}>", BAGR_VERSION, BAGR_SRC_URL)
}

fn current_date_str() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Failed to get system time")
        .as_secs()
}

fn is_hidden_file(name: &OsStr) -> bool {
    name.to_str()
        .map(|name| name.starts_with('.') && name != "." && name != "..")
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o200 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| !meta.permissions().readonly())
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_readable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o400 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_readable(path: &Path) -> bool {
    fs::metadata(path).is_ok()
}

/// Fails fast with `InsufficientPermissions` before anything under `src_dir`/`dst_dir` has been
/// moved, deleted, or rewritten: every entry below `src_dir` must be readable, and `dst_dir` (or
/// its nearest existing ancestor, if it doesn't exist yet) must be writable. `Mode::Rebag` also
/// walks `dst_dir` itself, since rebagging deletes and rewrites everything outside `data/` in
/// place.
fn check_permissions(src_dir: &Path, dst_dir: &Path, mode: Mode) -> Result<()> {
    for entry in WalkDir::new(src_dir) {
        let entry = entry.context(WalkFileSnafu {})?;
        if !is_readable(entry.path()) {
            return Err(InsufficientPermissions {
                path: entry.path().to_path_buf(),
                reason: "not readable".to_string(),
            });
        }
    }

    let writable_root = dst_dir
        .ancestors()
        .find(|p| p.is_dir())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dst_dir.to_path_buf());

    if !is_writable(&writable_root) {
        return Err(InsufficientPermissions {
            path: writable_root,
            reason: "not writable".to_string(),
        });
    }

    if mode == Mode::Rebag {
        for entry in WalkDir::new(dst_dir) {
            let entry = entry.context(WalkFileSnafu {})?;
            if !is_writable(entry.path()) {
                return Err(InsufficientPermissions {
                    path: entry.path().to_path_buf(),
                    reason: "not writable".to_string(),
                });
            }
        }
    }

    Ok(())
}
