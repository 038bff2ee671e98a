//! A fixed-size worker pool that computes file digests in parallel using
//! plain OS threads, with cooperative cancellation.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use snafu::ResultExt;

use crate::bagit::digest::{DigestAlgorithm, HexDigest, MultiDigestWriter};
use crate::bagit::error::Error::Cancelled;
use crate::bagit::error::*;

/// A cooperative cancellation flag. Cloning shares the same underlying flag;
/// setting it on any clone is observed by all of them.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Digests computed for one file, keyed by the relative path that was
/// submitted for hashing.
pub type DigestResults = HashMap<PathBuf, HashMap<DigestAlgorithm, HexDigest>>;

/// Computes digests for every file in `files` against every algorithm in
/// `algorithms`, in a single read pass per file. Files are distributed across
/// `processes` worker threads; `processes <= 1` hashes in-line with no pool.
///
/// `files` pairs an absolute path to read from with the relative path under
/// which the result should be keyed.
pub fn hash_files<I>(
    files: I,
    algorithms: &[DigestAlgorithm],
    processes: usize,
    cancellation: &CancellationToken,
) -> Result<DigestResults>
where
    I: IntoIterator<Item = (PathBuf, PathBuf)>,
{
    let files: Vec<_> = files.into_iter().collect();

    if processes <= 1 {
        return hash_inline(files, algorithms, cancellation);
    }

    hash_parallel(files, algorithms, processes, cancellation)
}

fn hash_one(
    absolute: &Path,
    algorithms: &[DigestAlgorithm],
) -> Result<HashMap<DigestAlgorithm, HexDigest>> {
    let mut writer = MultiDigestWriter::new(algorithms, io::sink());
    let mut reader = File::open(absolute).context(IoReadSnafu { path: absolute })?;
    io::copy(&mut reader, &mut writer).context(IoReadSnafu { path: absolute })?;
    Ok(writer.finalize_hex())
}

fn hash_inline(
    files: Vec<(PathBuf, PathBuf)>,
    algorithms: &[DigestAlgorithm],
    cancellation: &CancellationToken,
) -> Result<DigestResults> {
    let mut results = DigestResults::with_capacity(files.len());

    for (absolute, relative) in files {
        if cancellation.is_cancelled() {
            return Err(Cancelled);
        }
        let digests = hash_one(&absolute, algorithms)?;
        results.insert(relative, digests);
    }

    Ok(results)
}

fn hash_parallel(
    files: Vec<(PathBuf, PathBuf)>,
    algorithms: &[DigestAlgorithm],
    processes: usize,
    cancellation: &CancellationToken,
) -> Result<DigestResults> {
    let (work_tx, work_rx) = mpsc::channel::<(PathBuf, PathBuf)>();
    let (result_tx, result_rx) = mpsc::channel::<Result<(PathBuf, HashMap<DigestAlgorithm, HexDigest>)>>();

    let work_rx = Arc::new(std::sync::Mutex::new(work_rx));
    let total = files.len();

    thread::scope(|scope| {
        for _ in 0..processes.min(total.max(1)) {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let cancellation = cancellation.clone();

            scope.spawn(move || loop {
                if cancellation.is_cancelled() {
                    return;
                }

                let next = {
                    let rx = work_rx.lock().expect("work queue mutex poisoned");
                    rx.recv()
                };

                match next {
                    Ok((absolute, relative)) => {
                        if cancellation.is_cancelled() {
                            return;
                        }
                        let outcome = hash_one(&absolute, algorithms).map(|d| (relative, d));
                        if result_tx.send(outcome).is_err() {
                            return;
                        }
                    }
                    Err(_) => return,
                }
            });
        }

        for file in files {
            if work_tx.send(file).is_err() {
                break;
            }
        }
        drop(work_tx);
        drop(result_tx);

        let mut results = DigestResults::with_capacity(total);
        for _ in 0..total {
            match result_rx.recv() {
                Ok(Ok((relative, digests))) => {
                    results.insert(relative, digests);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => break,
            }
        }

        if cancellation.is_cancelled() {
            return Err(Cancelled);
        }

        Ok(results)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(path: &Path, content: &str) {
        let mut f = File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn hashes_files_inline_and_in_parallel_identically() {
        let dir = tempdir().unwrap();
        let mut files = Vec::new();
        for i in 0..16 {
            let name = format!("file-{i}.txt");
            let path = dir.path().join(&name);
            write_file(&path, &format!("payload {i}\n"));
            files.push((path, PathBuf::from(name)));
        }

        let algorithms = [DigestAlgorithm::Md5, DigestAlgorithm::Sha256];
        let token = CancellationToken::new();

        let inline = hash_files(files.clone(), &algorithms, 1, &token).unwrap();
        let parallel = hash_files(files, &algorithms, 8, &token).unwrap();

        assert_eq!(inline, parallel);
        assert_eq!(16, inline.len());
    }

    #[test]
    fn cancellation_is_observed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.txt");
        write_file(&path, "content\n");

        let token = CancellationToken::new();
        token.cancel();

        let result = hash_files(
            vec![(path, PathBuf::from("file.txt"))],
            &[DigestAlgorithm::Md5],
            1,
            &token,
        );

        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
