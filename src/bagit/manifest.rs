//! Parsing and serialization of `manifest-<algorithm>.txt` and
//! `tagmanifest-<algorithm>.txt` files: `<hex digest><SP(s)><path>` lines,
//! one per file, sorted by path within a file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::bagit::digest::{DigestAlgorithm, HexDigest};
use crate::bagit::error::*;
use crate::bagit::io::LineReader;
use crate::bagit::path::from_manifest_path;

/// Number of spaces written between the digest and the path when emitting a
/// payload manifest line.
const PAYLOAD_SEPARATOR: &str = "  ";
/// Number of spaces written between the digest and the path when emitting a
/// tag manifest line. Older bags in the wild use a single space here.
const TAG_SEPARATOR: &str = " ";

/// One manifest file's worth of entries: the relative path it declares a
/// digest for, paired with that digest.
#[derive(Debug, Default, Clone)]
pub struct Manifest {
    entries: BTreeMap<PathBuf, HexDigest>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: PathBuf, digest: HexDigest) {
        self.entries.insert(path, digest);
    }

    pub fn get(&self, path: &Path) -> Option<&HexDigest> {
        self.entries.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &HexDigest)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All of the manifests declared for one checksum role (payload or tag),
/// keyed by the algorithm named in the manifest's file name.
#[derive(Debug, Default, Clone)]
pub struct ManifestStore {
    manifests: BTreeMap<DigestAlgorithm, Manifest>,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, algorithm: DigestAlgorithm, manifest: Manifest) {
        self.manifests.insert(algorithm, manifest);
    }

    pub fn algorithms(&self) -> impl Iterator<Item = DigestAlgorithm> + '_ {
        self.manifests.keys().copied()
    }

    pub fn get(&self, algorithm: DigestAlgorithm) -> Option<&Manifest> {
        self.manifests.get(&algorithm)
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// All of the distinct paths named across every algorithm's manifest.
    /// A well-formed bag has every algorithm agree on this set; disagreement
    /// is a validation detail, not something this type resolves on its own.
    pub fn all_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .manifests
            .values()
            .flat_map(|m| m.paths().cloned())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}

/// Parses a manifest file's lines into a `Manifest`. Accepts one or two
/// spaces between the digest and the path, since both appear in bags found
/// in the wild; `check_safety` controls whether each decoded path is run
/// through the payload-safety check (callers reading a tagmanifest still
/// want relative paths resolved, but the check is the same either way).
pub fn parse_manifest_file(path: &Path) -> Result<Manifest> {
    let file = File::open(path).context(IoReadSnafu { path })?;
    let reader = LineReader::new(BufReader::new(file));

    let mut manifest = Manifest::new();

    for line in reader {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let (digest, manifest_path) = split_manifest_line(path, &line)?;
        let relative = from_manifest_path(manifest_path)?;
        manifest.insert(relative, HexDigest::from(digest));
    }

    Ok(manifest)
}

/// Splits a manifest line of the form `<digest><SP(s)><path>` into its two
/// halves. The digest is whitespace-free and the separator is one or two
/// spaces, so the first space run delimits them.
fn split_manifest_line<'a>(file: &Path, line: &'a str) -> Result<(&'a str, &'a str)> {
    let digest_end = line.find(' ').ok_or_else(|| Error::InvalidTagLine {
        details: format!(
            "manifest line in {} is missing the digest/path separator: {line}",
            file.display()
        ),
    })?;

    let (digest, rest) = line.split_at(digest_end);
    let manifest_path = rest.trim_start_matches(' ');

    if digest.is_empty() || manifest_path.is_empty() {
        return Err(Error::InvalidTagLine {
            details: format!("malformed manifest line in {}: {line}", file.display()),
        });
    }

    Ok((digest, manifest_path))
}

/// Writes a manifest (or tagmanifest) line for one entry. `is_tag_manifest`
/// selects the narrower one-space separator that tagmanifests use.
pub fn write_manifest_line<W: Write>(
    writer: &mut W,
    digest: &HexDigest,
    manifest_path: &str,
    is_tag_manifest: bool,
) -> Result<()> {
    let separator = if is_tag_manifest {
        TAG_SEPARATOR
    } else {
        PAYLOAD_SEPARATOR
    };
    writeln!(writer, "{digest}{separator}{manifest_path}").context(IoGeneralSnafu {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;

    #[test]
    fn parses_manifest_accepting_one_or_two_space_separators() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest-md5.txt");
        let mut f = File::create(&path).unwrap();
        writeln!(
            f,
            "b1946ac92492d2347c6235b4d2611184  data/one.txt\n\
             d41d8cd98f00b204e9800998ecf8427e data/two.txt"
        )
        .unwrap();

        let manifest = parse_manifest_file(&path).unwrap();
        assert_eq!(2, manifest.len());
        assert_eq!(
            "b1946ac92492d2347c6235b4d2611184",
            manifest.get(Path::new("data/one.txt")).unwrap().as_str()
        );
        assert_eq!(
            "d41d8cd98f00b204e9800998ecf8427e",
            manifest.get(Path::new("data/two.txt")).unwrap().as_str()
        );
    }

    #[test]
    fn rejects_line_missing_separator() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest-md5.txt");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "notadigestorpath").unwrap();

        assert!(parse_manifest_file(&path).is_err());
    }

    #[test]
    fn emits_two_spaces_for_payload_and_one_for_tag() {
        let digest = HexDigest::from("abc123");
        let mut payload_line = Vec::new();
        write_manifest_line(&mut payload_line, &digest, "data/a.txt", false).unwrap();
        assert_eq!(b"abc123  data/a.txt\n".to_vec(), payload_line);

        let mut tag_line = Vec::new();
        write_manifest_line(&mut tag_line, &digest, "bag-info.txt", true).unwrap();
        assert_eq!(b"abc123 bag-info.txt\n".to_vec(), tag_line);
    }

    #[test]
    fn tracks_union_of_paths_across_algorithms() {
        let mut md5 = Manifest::new();
        md5.insert(PathBuf::from("data/a.txt"), HexDigest::from("aaa"));
        let mut sha256 = Manifest::new();
        sha256.insert(PathBuf::from("data/a.txt"), HexDigest::from("bbb"));
        sha256.insert(PathBuf::from("data/b.txt"), HexDigest::from("ccc"));

        let mut store = ManifestStore::new();
        store.insert(DigestAlgorithm::Md5, md5);
        store.insert(DigestAlgorithm::Sha256, sha256);

        assert_eq!(
            vec![PathBuf::from("data/a.txt"), PathBuf::from("data/b.txt")],
            store.all_paths()
        );
    }
}
