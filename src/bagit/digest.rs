//! Digest algorithms and the single-pass, multi-algorithm hashing writer used
//! by both bag creation and validation.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::io::{self, Write};
use std::str::FromStr;

use blake2::{Blake2b512, Blake2s256};
use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use strum_macros::EnumIter;

pub mod pool;

/// A digest algorithm that can appear in a manifest file name,
/// `manifest-<algorithm>.txt`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, EnumIter)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Blake2b,
    Blake2s,
}

/// A lowercase hex-encoded digest, as it appears in a manifest line.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct HexDigest(String);

impl DigestAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
            DigestAlgorithm::Blake2b => "blake2b",
            DigestAlgorithm::Blake2s => "blake2s",
        }
    }
}

impl Display for DigestAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha1" | "sha-1" => Ok(DigestAlgorithm::Sha1),
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            "sha512" | "sha-512" => Ok(DigestAlgorithm::Sha512),
            "blake2b" | "blake2b512" => Ok(DigestAlgorithm::Blake2b),
            "blake2s" | "blake2s256" => Ok(DigestAlgorithm::Blake2s),
            _ => Err(()),
        }
    }
}

impl TryFrom<&str> for DigestAlgorithm {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        FromStr::from_str(value)
    }
}

impl Display for HexDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for HexDigest {
    fn from(value: String) -> Self {
        Self(value.to_lowercase())
    }
}

impl From<&str> for HexDigest {
    fn from(value: &str) -> Self {
        Self(value.to_lowercase())
    }
}

impl HexDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The concrete per-algorithm hasher state. Kept as an enum, rather than a
/// trait object, since each variant needs a different concrete RustCrypto
/// type and we want to move it by value into the finalization step.
enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Blake2b(Blake2b512),
    Blake2s(Blake2s256),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            DigestAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            DigestAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            DigestAlgorithm::Blake2b => Hasher::Blake2b(Blake2b512::new()),
            DigestAlgorithm::Blake2s => Hasher::Blake2s(Blake2s256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => Digest::update(h, data),
            Hasher::Sha1(h) => Digest::update(h, data),
            Hasher::Sha256(h) => Digest::update(h, data),
            Hasher::Sha512(h) => Digest::update(h, data),
            Hasher::Blake2b(h) => Digest::update(h, data),
            Hasher::Blake2s(h) => Digest::update(h, data),
        }
    }

    fn finalize_hex(self) -> HexDigest {
        let hex = match self {
            Hasher::Md5(h) => hex::encode(h.finalize()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
            Hasher::Blake2b(h) => hex::encode(h.finalize()),
            Hasher::Blake2s(h) => hex::encode(h.finalize()),
        };
        HexDigest::from(hex)
    }
}

/// An `io::Write` sink that feeds every byte written to it into one hasher
/// per requested algorithm, computing all of a file's digests in a single
/// read pass. Typically paired with `io::copy` and `io::sink()` as the
/// ultimate destination, since the bytes themselves aren't needed afterward.
pub struct MultiDigestWriter<W> {
    hashers: Vec<(DigestAlgorithm, Hasher)>,
    inner: W,
}

impl<W: Write> MultiDigestWriter<W> {
    pub fn new(algorithms: &[DigestAlgorithm], inner: W) -> Self {
        Self {
            hashers: algorithms
                .iter()
                .map(|alg| (*alg, Hasher::new(*alg)))
                .collect(),
            inner,
        }
    }

    /// Consumes the writer, returning the hex digest computed for each
    /// requested algorithm.
    pub fn finalize_hex(self) -> HashMap<DigestAlgorithm, HexDigest> {
        self.hashers
            .into_iter()
            .map(|(alg, hasher)| (alg, hasher.finalize_hex()))
            .collect()
    }
}

impl<W: Write> Write for MultiDigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for (_, hasher) in &mut self.hashers {
            hasher.update(buf);
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::copy;

    #[test]
    fn digest_algorithm_round_trips_through_name() {
        for alg in [
            DigestAlgorithm::Md5,
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha512,
            DigestAlgorithm::Blake2b,
            DigestAlgorithm::Blake2s,
        ] {
            assert_eq!(Ok(alg), DigestAlgorithm::from_str(alg.name()));
        }
    }

    #[test]
    fn unknown_algorithm_name_is_rejected() {
        assert!(DigestAlgorithm::from_str("crc32").is_err());
    }

    #[test]
    fn multi_digest_writer_computes_all_algorithms_in_one_pass() {
        let algorithms = [DigestAlgorithm::Md5, DigestAlgorithm::Sha256];
        let mut writer = MultiDigestWriter::new(&algorithms, io::sink());
        copy(&mut "hello\n".as_bytes(), &mut writer).unwrap();
        let digests = writer.finalize_hex();

        assert_eq!(
            "b1946ac92492d2347c6235b4d2611184",
            digests[&DigestAlgorithm::Md5].as_str()
        );
        assert_eq!(
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03",
            digests[&DigestAlgorithm::Sha256].as_str()
        );
    }
}
