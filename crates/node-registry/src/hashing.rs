//! Model file hashing
//!
//! Content hashes are the only model identity guaranteed unique, so lookups
//! prefer them over filenames. Files are streamed through SHA-256 since
//! checkpoints routinely exceed several gigabytes.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::Result;

/// File extensions treated as model artifacts.
pub const MODEL_EXTENSIONS: &[&str] = &[
    "safetensors",
    "ckpt",
    "pt",
    "pth",
    "bin",
    "gguf",
    "onnx",
    "sft",
];

const CHUNK_SIZE: usize = 1 << 20;

/// Whether `name` ends in a model file extension (case-insensitive).
pub fn is_model_filename(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(stem, ext)| {
            !stem.is_empty() && MODEL_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Whether `path` names a model file.
pub fn is_model_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| is_model_filename(&n.to_string_lossy()))
        .unwrap_or(false)
}

/// SHA-256 hex digest of a model file.
pub fn hash_model_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total: u64 = 0;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    let hash = hex::encode(hasher.finalize());
    debug!(path = %path.display(), bytes = total, "Model hash: {}", &hash[..12]);
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_is_model_filename() {
        assert!(is_model_filename("v1-5-pruned-emaonly.safetensors"));
        assert!(is_model_filename("upscaler.PTH"));
        assert!(is_model_filename("loras/detail.sft"));
        assert!(!is_model_filename("prompt.txt"));
        assert!(!is_model_filename("safetensors"));
        assert!(!is_model_filename(".safetensors"));
    }

    #[test]
    fn test_hash_matches_known_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.safetensors");
        std::fs::write(&path, b"").unwrap();

        assert_eq!(
            hash_model_file(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_spans_multiple_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![0xABu8; CHUNK_SIZE + 17];
        std::fs::write(&path, &data).unwrap();

        let expected = hex::encode(Sha256::digest(&data));
        assert_eq!(hash_model_file(&path).unwrap(), expected);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(hash_model_file(&dir.path().join("missing.ckpt")).is_err());
    }
}
