//! Streaming content hashing and pin-file parsing for the core dataset.

use std::fs;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};

const CHUNK_BYTES: usize = 1024 * 1024;

/// SHA-256 of a file's content as lowercase hex, streamed in fixed-size
/// chunks so output is identical from empty files up through multi-chunk
/// inputs.
pub fn sha256_file(path: &Path) -> CoreResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_BYTES];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Reads the pinned digest from a sidecar file: the first
/// whitespace-delimited token, so both `<hex>` and the
/// `<hex>  <filename>` form emitted by common checksum tools parse.
pub fn read_pinned_digest(path: &Path) -> CoreResult<String> {
    let text = fs::read_to_string(path)?;
    let Some(token) = text.split_whitespace().next() else {
        return Err(CoreError::Integrity(format!(
            "pin file {} is empty",
            path.display()
        )));
    };
    Ok(token.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    // SHA-256 of the empty string.
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn empty_file_digest_matches_known_vector() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty");
        File::create(&path).unwrap();
        assert_eq!(sha256_file(&path).unwrap(), EMPTY_SHA256);
    }

    #[test]
    fn digest_is_stable_across_chunk_boundaries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big");
        let payload = vec![0xabu8; CHUNK_BYTES + 17];
        fs::write(&path, &payload).unwrap();

        let streamed = sha256_file(&path).unwrap();
        let whole = hex::encode(Sha256::digest(&payload));
        assert_eq!(streamed, whole);
    }

    #[test]
    fn pin_file_with_filename_suffix_parses() {
        let tmp = TempDir::new().unwrap();
        let pin = tmp.path().join("core.sha256");
        let mut file = File::create(&pin).unwrap();
        writeln!(file, "{EMPTY_SHA256}  core.jsonl").unwrap();
        assert_eq!(read_pinned_digest(&pin).unwrap(), EMPTY_SHA256);
    }

    #[test]
    fn uppercase_pin_is_lowercased() {
        let tmp = TempDir::new().unwrap();
        let pin = tmp.path().join("core.sha256");
        fs::write(&pin, EMPTY_SHA256.to_ascii_uppercase()).unwrap();
        assert_eq!(read_pinned_digest(&pin).unwrap(), EMPTY_SHA256);
    }

    #[test]
    fn empty_pin_file_is_an_integrity_error() {
        let tmp = TempDir::new().unwrap();
        let pin = tmp.path().join("core.sha256");
        fs::write(&pin, "\n").unwrap();
        assert!(matches!(
            read_pinned_digest(&pin).unwrap_err(),
            CoreError::Integrity(_)
        ));
    }
}
