//! Parsing for `fetch.txt`: `<url> <length-or-"-"> <path>` lines naming
//! payload files that a bag declares but does not carry, deferring their
//! retrieval to some other collaborator. This module never opens a socket.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use snafu::ResultExt;
use url::Url;

use crate::bagit::error::*;
use crate::bagit::io::LineReader;
use crate::bagit::path::from_manifest_path;

/// One `fetch.txt` entry: where to get a payload file from, how large it is
/// expected to be (when declared), and where it belongs in the bag.
#[derive(Debug, Clone)]
pub struct FetchEntry {
    url: Url,
    length: Option<u64>,
    path: PathBuf,
}

impl FetchEntry {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The full set of entries declared by a bag's `fetch.txt`.
#[derive(Debug, Default, Clone)]
pub struct FetchTable {
    entries: Vec<FetchEntry>,
}

impl FetchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[FetchEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entries whose declared path does not exist under
    /// `payload_root`. Used by the validator to tell "not yet fetched" apart
    /// from "genuinely missing".
    pub fn missing_from(&self, payload_root: &Path) -> Vec<&FetchEntry> {
        self.entries
            .iter()
            .filter(|e| !payload_root.join(&e.path).is_file())
            .collect()
    }

    /// `true` if some entry declares `path`.
    pub fn declares(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }
}

/// Parses a `fetch.txt` file. Each line is `<url> <length-or-"-"> <path>`,
/// whitespace-separated; the URL must declare a scheme and host, and the
/// path must pass the same payload-safety check as a manifest entry.
pub fn parse_fetch_file(path: &Path) -> Result<FetchTable> {
    let file = File::open(path).context(IoReadSnafu { path })?;
    let reader = LineReader::new(BufReader::new(file));

    let mut table = FetchTable::new();

    for line in reader {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        table.entries.push(parse_fetch_line(&line)?);
    }

    Ok(table)
}

fn parse_fetch_line(line: &str) -> Result<FetchEntry> {
    let mut fields = line.splitn(3, char::is_whitespace).filter(|f| !f.is_empty());

    let url_str = fields.next().ok_or_else(|| Error::InvalidFetchEntry {
        details: format!("missing url: {line}"),
    })?;
    let length_str = fields.next().ok_or_else(|| Error::InvalidFetchEntry {
        details: format!("missing length field: {line}"),
    })?;
    let manifest_path = fields
        .next()
        .map(str::trim_start)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::InvalidFetchEntry {
            details: format!("missing path: {line}"),
        })?;

    let url = Url::parse(url_str).map_err(|e| Error::InvalidFetchEntry {
        details: format!("invalid url '{url_str}': {e}"),
    })?;
    if url.host_str().is_none() {
        return Err(Error::InvalidFetchEntry {
            details: format!("url '{url_str}' has no host"),
        });
    }

    let length = if length_str == "-" {
        None
    } else {
        Some(length_str.parse::<u64>().map_err(|_| Error::InvalidFetchEntry {
            details: format!("invalid length '{length_str}'"),
        })?)
    };

    let path = from_manifest_path(manifest_path)?;

    Ok(FetchEntry { url, length, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_fetch(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("fetch.txt");
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_well_formed_entries() {
        let dir = tempdir().unwrap();
        let path = write_fetch(
            &dir.path().to_path_buf(),
            "https://example.org/one.txt 100 data/one.txt\n\
             https://example.org/two.txt - data/two.txt\n",
        );

        let table = parse_fetch_file(&path).unwrap();
        assert_eq!(2, table.entries().len());
        assert_eq!(Some(100), table.entries()[0].length());
        assert_eq!(None, table.entries()[1].length());
        assert_eq!(Path::new("data/two.txt"), table.entries()[1].path());
    }

    #[test]
    fn rejects_url_with_no_host() {
        let dir = tempdir().unwrap();
        let path = write_fetch(&dir.path().to_path_buf(), "file:///etc/passwd 10 data/a.txt\n");
        assert!(parse_fetch_file(&path).is_err());
    }

    #[test]
    fn rejects_unsafe_path() {
        let dir = tempdir().unwrap();
        let path = write_fetch(
            &dir.path().to_path_buf(),
            "https://example.org/a.txt 10 ../escape.txt\n",
        );
        assert!(parse_fetch_file(&path).is_err());
    }

    #[test]
    fn missing_from_reports_unfetched_entries() {
        let dir = tempdir().unwrap();
        let path = write_fetch(
            &dir.path().to_path_buf(),
            "https://example.org/a.txt 10 data/a.txt\n",
        );
        let table = parse_fetch_file(&path).unwrap();

        let missing = table.missing_from(dir.path());
        assert_eq!(1, missing.len());

        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        File::create(dir.path().join("data/a.txt")).unwrap();
        assert!(table.missing_from(dir.path()).is_empty());
    }
}
