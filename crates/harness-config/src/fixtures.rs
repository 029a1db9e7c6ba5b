//! Scratch state for scenarios: temp dirs, payload files, digests.

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

/// Allocate a scratch directory for one scenario. Removed from disk when
/// the returned guard drops.
pub fn allocate_temp_dir() -> io::Result<TempDir> {
    tempfile::Builder::new().prefix("harness-").tempdir()
}

/// SHA-256 digest of a file's contents as lowercase hex.
///
/// Used to verify byte-for-byte integrity of files relayed through the
/// system under test.
pub async fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether two files have identical contents, by digest.
pub async fn compare_files(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(hash_file(a).await? == hash_file(b).await?)
}

/// Write `len` bytes of a deterministic, non-trivial pattern to `path`.
///
/// Upload-integrity scenarios hash this before sending and compare against
/// the digest of what the backend stored.
pub async fn write_pattern_file(path: &Path, len: usize) -> io::Result<()> {
    let mut data = Vec::with_capacity(len + 4);
    // xorshift32 keeps the payload incompressible enough to be a meaningful
    // relay test without pulling in a randomness dependency.
    let mut x: u32 = 0x2545_f491;
    while data.len() < len {
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        data.extend_from_slice(&x.to_le_bytes());
    }
    data.truncate(len);
    tokio::fs::write(path, data).await
}
