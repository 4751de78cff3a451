use std::io::{self, Read};

use ocfl_types::{DigestAlgorithm, HexDigest};

use crate::digester::Digester;
use crate::error::{DigestError, DigestResult};

/// A pass-through reader that digests everything read through it.
///
/// Every byte handed to the consumer is also fed to an internal digester.
/// When the consumer reaches end-of-stream the accumulated digest is
/// compared to the expected value and a mismatch surfaces as an
/// `InvalidData` I/O error wrapping [`DigestError::FixityMismatch`].
/// Consumers that stop early can call [`FixityReader::check_fixity`]
/// explicitly (after draining) or simply never trigger the check.
pub struct FixityReader<R> {
    inner: R,
    digester: Option<Digester>,
    expected: HexDigest,
    algorithm: DigestAlgorithm,
}

impl<R: Read> FixityReader<R> {
    pub fn new(inner: R, algorithm: DigestAlgorithm, expected: HexDigest) -> Self {
        Self {
            inner,
            digester: Some(Digester::new(algorithm)),
            expected,
            algorithm,
        }
    }

    /// The expected digest value.
    pub fn expected(&self) -> &HexDigest {
        &self.expected
    }

    /// Finish the digest and compare it to the expected value.
    ///
    /// Returns the actual digest on success so callers can reuse it. After
    /// the end-of-stream check has already run, returns the expected value.
    pub fn check_fixity(mut self) -> DigestResult<HexDigest> {
        match self.run_check() {
            Ok(()) => Ok(self.expected),
            Err(e) => Err(e),
        }
    }

    /// Drain the rest of the stream, then check fixity.
    pub fn drain_and_check(mut self) -> DigestResult<HexDigest> {
        let mut buf = [0u8; 8192];
        loop {
            match self.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => return Err(unwrap_fixity_error(e)),
            }
        }
        self.check_fixity()
    }

    fn run_check(&mut self) -> DigestResult<()> {
        let Some(digester) = self.digester.take() else {
            return Ok(());
        };
        let actual = digester.finalize();
        if actual == self.expected {
            Ok(())
        } else {
            Err(DigestError::FixityMismatch {
                algorithm: self.algorithm,
                expected: self.expected.clone(),
                actual,
            })
        }
    }
}

/// Recover the `FixityMismatch` a failed read wrapped, or keep the I/O
/// error as-is.
pub fn unwrap_fixity_error(err: io::Error) -> DigestError {
    if err.get_ref().is_some_and(|inner| inner.is::<DigestError>()) {
        match err.into_inner().map(|inner| inner.downcast::<DigestError>()) {
            Some(Ok(digest_err)) => *digest_err,
            _ => DigestError::Io(io::Error::new(io::ErrorKind::InvalidData, "fixity check failed")),
        }
    } else {
        DigestError::Io(err)
    }
}

impl<R> std::fmt::Debug for FixityReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixityReader")
            .field("algorithm", &self.algorithm)
            .field("expected", &self.expected.value())
            .finish()
    }
}

impl<R: Read> Read for FixityReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if let Err(e) = self.run_check() {
                return Err(io::Error::new(io::ErrorKind::InvalidData, e));
            }
        } else if let Some(digester) = self.digester.as_mut() {
            digester.update(&buf[..n]);
        }
        Ok(n)
    }
}
