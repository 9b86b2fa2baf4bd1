use core::{cmp, fmt};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::io;
use std::io::{Read, Write};

use blake2::digest::consts::U20;
use blake2::{Blake2b, Blake2b512};
use digest::{Digest, DynDigest};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use strum_macros::{Display as EnumDisplay, EnumString};

use crate::ocfl::error::{OcflError, Result};

type Blake2b160 = Blake2b<U20>;

/// Enum of all valid digest algorithms.
///
/// `Size` is not a hash; it renders the byte count in decimal and is only
/// meaningful inside fixity blocks.
#[derive(
    Deserialize, Serialize, Debug, Hash, Eq, PartialEq, Copy, Clone, EnumString, EnumDisplay,
)]
pub enum DigestAlgorithm {
    #[serde(rename = "md5")]
    #[strum(serialize = "md5")]
    Md5,
    #[serde(rename = "sha1")]
    #[strum(serialize = "sha1")]
    Sha1,
    #[serde(rename = "sha256")]
    #[strum(serialize = "sha256")]
    Sha256,
    #[serde(rename = "sha512")]
    #[strum(serialize = "sha512")]
    Sha512,
    #[serde(rename = "blake2b-512")]
    #[strum(serialize = "blake2b-512")]
    Blake2b512,
    #[serde(rename = "blake2b-160")]
    #[strum(serialize = "blake2b-160")]
    Blake2b160,
    #[serde(rename = "size")]
    #[strum(serialize = "size")]
    Size,
}

/// Streaming sink that accumulates input and produces a final string value
trait DigestSink: Send {
    fn update(&mut self, bytes: &[u8]);

    fn finalize_str(self: Box<Self>) -> String;
}

struct HashSink(Box<dyn DynDigest + Send>);

struct SizeSink(u64);

impl DigestSink for HashSink {
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize_str(self: Box<Self>) -> String {
        hex::encode(self.0.finalize())
    }
}

impl DigestSink for SizeSink {
    fn update(&mut self, bytes: &[u8]) {
        self.0 += bytes.len() as u64;
    }

    fn finalize_str(self: Box<Self>) -> String {
        self.0.to_string()
    }
}

/// Reader wrapper that calculates a digest while reading
pub struct DigestReader<R: Read> {
    sink: Box<dyn DigestSink>,
    inner: R,
}

/// Writer wrapper that calculates a digest while writing
pub struct DigestWriter<W: Write> {
    sink: Box<dyn DigestSink>,
    inner: W,
}

/// Writer wrapper that calculates multiple digests in one pass
pub struct MultiDigestWriter<W: Write> {
    sinks: HashMap<DigestAlgorithm, Box<dyn DigestSink>>,
    inner: W,
}

/// A digest encoded as a hex string. Comparisons are case insensitive.
#[derive(Deserialize, Serialize, Debug, Eq, Clone)]
pub struct HexDigest(String);

/// A set of digests of one stream, keyed by algorithm
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct DigestSet(HashMap<DigestAlgorithm, HexDigest>);

impl DigestAlgorithm {
    /// True for the algorithms an inventory may use as its primary `digestAlgorithm`
    pub fn is_inventory_algorithm(self) -> bool {
        self == DigestAlgorithm::Sha512 || self == DigestAlgorithm::Sha256
    }

    /// Hashes the input and returns its hex encoded digest
    pub fn hash_hex(self, data: &mut impl Read) -> Result<HexDigest> {
        let mut hasher = self.reader(data);
        io::copy(&mut hasher, &mut io::sink())?;
        Ok(hasher.finalize_hex())
    }

    /// Wraps the specified reader in a `DigestReader`
    pub fn reader<R: Read>(self, reader: R) -> DigestReader<R> {
        DigestReader::new(self.new_sink(), reader)
    }

    /// Wraps the specified writer in a `DigestWriter`
    pub fn writer<W: Write>(self, writer: W) -> DigestWriter<W> {
        DigestWriter::new(self.new_sink(), writer)
    }

    fn new_sink(self) -> Box<dyn DigestSink> {
        match self {
            DigestAlgorithm::Md5 => Box::new(HashSink(Box::new(Md5::new()))),
            DigestAlgorithm::Sha1 => Box::new(HashSink(Box::new(Sha1::new()))),
            DigestAlgorithm::Sha256 => Box::new(HashSink(Box::new(Sha256::new()))),
            DigestAlgorithm::Sha512 => Box::new(HashSink(Box::new(Sha512::new()))),
            DigestAlgorithm::Blake2b512 => Box::new(HashSink(Box::new(Blake2b512::new()))),
            DigestAlgorithm::Blake2b160 => Box::new(HashSink(Box::new(Blake2b160::new()))),
            DigestAlgorithm::Size => Box::new(SizeSink(0)),
        }
    }
}

impl<R: Read> DigestReader<R> {
    fn new(sink: Box<dyn DigestSink>, reader: R) -> Self {
        Self {
            sink,
            inner: reader,
        }
    }

    pub fn finalize_hex(self) -> HexDigest {
        HexDigest(self.sink.finalize_str())
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.inner.read(buf)?;

        if result > 0 {
            self.sink.update(&buf[0..result]);
        }

        Ok(result)
    }
}

impl<W: Write> DigestWriter<W> {
    fn new(sink: Box<dyn DigestSink>, writer: W) -> Self {
        Self {
            sink,
            inner: writer,
        }
    }

    pub fn finalize_hex(self) -> HexDigest {
        HexDigest(self.sink.finalize_str())
    }

    pub fn into_inner(self) -> (W, HexDigest) {
        (self.inner, HexDigest(self.sink.finalize_str()))
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf)?;

        if result > 0 {
            self.sink.update(&buf[0..result]);
        }

        Ok(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> MultiDigestWriter<W> {
    pub fn new(algorithms: &[DigestAlgorithm], writer: W) -> Self {
        let mut sinks = HashMap::with_capacity(algorithms.len());
        for algorithm in algorithms {
            sinks.insert(*algorithm, algorithm.new_sink());
        }

        Self {
            sinks,
            inner: writer,
        }
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }

    pub fn finalize_hex(self) -> DigestSet {
        let mut results = DigestSet::new();
        for (algorithm, sink) in self.sinks {
            results.insert(algorithm, HexDigest(sink.finalize_str()));
        }
        results
    }
}

impl<W: Write> Write for MultiDigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf)?;

        if result > 0 {
            let part = &buf[0..result];
            self.sinks.values_mut().for_each(|sink| sink.update(part));
        }

        Ok(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl DigestSet {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, algorithm: DigestAlgorithm, digest: HexDigest) {
        self.0.insert(algorithm, digest);
    }

    pub fn get(&self, algorithm: DigestAlgorithm) -> Option<&HexDigest> {
        self.0.get(&algorithm)
    }

    pub fn remove(&mut self, algorithm: DigestAlgorithm) -> Option<HexDigest> {
        self.0.remove(&algorithm)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DigestAlgorithm, &HexDigest)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an error if the set's entry for `algorithm` does not equal `expected`
    pub fn expect(
        &self,
        algorithm: DigestAlgorithm,
        path: &str,
        expected: &HexDigest,
    ) -> Result<()> {
        match self.get(algorithm) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(OcflError::DigestMismatch {
                algorithm,
                path: path.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            }),
            None => Err(OcflError::IllegalState(format!(
                "No {} digest was computed for {}",
                algorithm, path
            ))),
        }
    }
}

impl FromIterator<(DigestAlgorithm, HexDigest)> for DigestSet {
    fn from_iter<T: IntoIterator<Item = (DigestAlgorithm, HexDigest)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl HexDigest {
    /// Returns a copy of the digest with all hex characters lowercased
    pub fn to_lower(&self) -> HexDigest {
        HexDigest(self.0.to_ascii_lowercase())
    }

    /// True if every character is an ASCII hex digit
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl From<Vec<u8>> for HexDigest {
    fn from(bytes: Vec<u8>) -> Self {
        Self(hex::encode(bytes))
    }
}

impl From<&str> for HexDigest {
    fn from(digest: &str) -> Self {
        Self(digest.to_string())
    }
}

impl From<String> for HexDigest {
    fn from(digest: String) -> Self {
        Self(digest)
    }
}

impl From<HexDigest> for String {
    fn from(digest: HexDigest) -> Self {
        digest.0
    }
}

impl AsRef<str> for HexDigest {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl Ord for HexDigest {
    /// Case insensitive string comparison
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.0.as_bytes();
        let right = other.0.as_bytes();

        let l = cmp::min(left.len(), right.len());

        let lhs = &left[..l];
        let rhs = &right[..l];

        for i in 0..l {
            match lhs[i]
                .to_ascii_lowercase()
                .cmp(&rhs[i].to_ascii_lowercase())
            {
                Ordering::Equal => (),
                non_eq => return non_eq,
            }
        }

        left.len().cmp(&right.len())
    }
}

impl PartialOrd for HexDigest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HexDigest {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for HexDigest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

impl Display for HexDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
