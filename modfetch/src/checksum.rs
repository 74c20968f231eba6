//! SHA-256 digests for artifact verification and change detection.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Buffer size for reading files during digest calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Calculate the lowercase hexadecimal SHA-256 digest of a file.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Digest of an in-memory buffer.
pub fn bytes_digest(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Parse the digest out of a checksum file: its first whitespace-separated
/// token, lowercased.
pub fn parse_checksum_file(contents: &str) -> Option<String> {
    contents
        .split_whitespace()
        .next()
        .map(|token| token.to_ascii_lowercase())
}
