use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Read buffer for streaming a file through the digest
const READ_BUFFER: usize = 1024 * 1024;

/// Content fingerprint of a file: hex SHA-256 of its full bytes.
/// Used as the feature cache key, so byte-identical copies share an entry.
pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER, file);
    let mut hasher = Sha256::new();

    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Content fingerprint of bytes already in memory (archive members)
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
