//! Checksums for downloaded files, computed while the bytes stream to disk.

use std::io::{self, Write};

/// Checksum algorithms a download may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Every supported algorithm, in the order the project file checks for them.
    pub const ALL: [HashAlgorithm; 5] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
    ];

    /// The project file key naming this algorithm.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Look up an algorithm by its project file key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|algorithm| algorithm.key() == key)
    }

    fn hasher(&self) -> Hasher {
        match self {
            Self::Md5 => Hasher::Md5(<md5::Md5 as md5::Digest>::new()),
            Self::Sha224 => Hasher::Sha224(<sha2::Sha224 as sha2::Digest>::new()),
            Self::Sha256 => Hasher::Sha256(<sha2::Sha256 as sha2::Digest>::new()),
            Self::Sha384 => Hasher::Sha384(<sha2::Sha384 as sha2::Digest>::new()),
            Self::Sha512 => Hasher::Sha512(<sha2::Sha512 as sha2::Digest>::new()),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// md-5 and sha2 sit on different `digest` releases, so each arm names its own trait.
enum Hasher {
    Md5(md5::Md5),
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl Hasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => md5::Digest::update(h, data),
            Self::Sha224(h) => sha2::Digest::update(h, data),
            Self::Sha256(h) => sha2::Digest::update(h, data),
            Self::Sha384(h) => sha2::Digest::update(h, data),
            Self::Sha512(h) => sha2::Digest::update(h, data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => hex::encode(md5::Digest::finalize(h)),
            Self::Sha224(h) => hex::encode(sha2::Digest::finalize(h)),
            Self::Sha256(h) => hex::encode(sha2::Digest::finalize(h)),
            Self::Sha384(h) => hex::encode(sha2::Digest::finalize(h)),
            Self::Sha512(h) => hex::encode(sha2::Digest::finalize(h)),
        }
    }
}

/// Writer that hashes everything passing through to the inner writer.
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Option<Hasher>,
}

impl<W: Write> HashingWriter<W> {
    /// Wrap `inner`; with no algorithm nothing is hashed.
    pub fn new(inner: W, algorithm: Option<HashAlgorithm>) -> Self {
        Self {
            inner,
            hasher: algorithm.map(|a| a.hasher()),
        }
    }

    /// Finish, returning the inner writer and the lowercase hex digest.
    pub fn finish(self) -> (W, Option<String>) {
        (self.inner, self.hasher.map(Hasher::finalize_hex))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        if let Some(hasher) = &mut self.hasher {
            hasher.update(&buf[..written]);
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Hex digest of `data`.
pub fn digest_hex(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut hasher = algorithm.hasher();
    hasher.update(data);
    hasher.finalize_hex()
}
