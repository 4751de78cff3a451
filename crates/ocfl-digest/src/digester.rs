use std::io::{self, Read, Write};
use std::path::Path;

use digest::DynDigest;
use ocfl_types::{DigestAlgorithm, HexDigest};

use crate::error::DigestResult;

/// Incremental digest computation over any recognized algorithm.
///
/// The algorithm is chosen at runtime, so all hashing goes through a
/// [`DynDigest`] trait object. `Digester` implements [`Write`], which lets
/// `io::copy` feed it while content streams somewhere else.
pub struct Digester {
    algorithm: DigestAlgorithm,
    inner: Box<dyn DynDigest + Send>,
}

impl Digester {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        let inner: Box<dyn DynDigest + Send> = match algorithm {
            DigestAlgorithm::Md5 => Box::new(md5::Md5::default()),
            DigestAlgorithm::Sha1 => Box::new(sha1::Sha1::default()),
            DigestAlgorithm::Sha256 => Box::new(sha2::Sha256::default()),
            DigestAlgorithm::Sha512 => Box::new(sha2::Sha512::default()),
            DigestAlgorithm::Blake2b512 => Box::new(blake2::Blake2b512::default()),
        };
        Self { algorithm, inner }
    }

    /// The algorithm this digester computes.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Feed bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finish and return the lowercase hex digest.
    pub fn finalize(mut self) -> HexDigest {
        HexDigest::from_bytes(&self.inner.finalize_reset())
    }

    /// Digest a byte slice in one call.
    pub fn hash(algorithm: DigestAlgorithm, data: &[u8]) -> HexDigest {
        let mut digester = Self::new(algorithm);
        digester.update(data);
        digester.finalize()
    }
}

impl std::fmt::Debug for Digester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Digester")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl Write for Digester {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Digest the contents of a reader, streaming.
pub fn digest_reader(
    algorithm: DigestAlgorithm,
    reader: &mut dyn Read,
) -> DigestResult<HexDigest> {
    let mut digester = Digester::new(algorithm);
    io::copy(reader, &mut digester)?;
    Ok(digester.finalize())
}

/// Digest a file on disk, streaming.
pub fn digest_file(algorithm: DigestAlgorithm, path: &Path) -> DigestResult<HexDigest> {
    let mut file = std::fs::File::open(path)?;
    digest_reader(algorithm, &mut file)
}
