//! SHA-256 파일 해시 검증

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::UpdaterError;

const READ_CHUNK: usize = 8192;

/// 파일을 스트리밍으로 읽어 소문자 hex SHA-256 반환
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// 기대 해시와 비교 (대소문자 무시, 앞뒤 공백 무시). 다르면 `HashMismatch`
pub fn verify_sha256_file(path: &Path, filename: &str, expected: &str) -> Result<(), UpdaterError> {
    let actual = sha256_file(path).map_err(|e| UpdaterError::io("hash", path, e))?;
    let expected = expected.trim();
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(UpdaterError::HashMismatch {
            filename: filename.to_string(),
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // echo -n "hello" | sha256sum
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn digest_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn verify_ignores_case_and_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();
        let upper = format!("  {}\n", HELLO_SHA256.to_uppercase());
        verify_sha256_file(&path, "hello.txt", &upper).unwrap();

        match verify_sha256_file(&path, "hello.txt", "DEADBEEF") {
            Err(UpdaterError::HashMismatch {
                filename,
                expected,
                actual,
            }) => {
                assert_eq!(filename, "hello.txt");
                assert_eq!(expected, "deadbeef");
                assert_eq!(actual, HELLO_SHA256);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(sha256_file(&dir.path().join("nope")).is_err());
        assert!(matches!(
            verify_sha256_file(&dir.path().join("nope"), "nope", HELLO_SHA256),
            Err(UpdaterError::Io { .. })
        ));
    }
}
