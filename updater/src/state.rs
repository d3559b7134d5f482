//! 설치 버전 마커 (`installed_version.txt`)
//!
//! 팩 루트에 버전 문자열 하나만 저장한다. 파일이 없거나 비어 있으면 미설치.
//! 유일한 진행 체크포인트이므로 항상 임시 파일 → rename 으로 기록한다.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::UpdaterError;

pub const MARKER_FILE_NAME: &str = "installed_version.txt";

#[derive(Debug, Clone)]
pub struct InstalledState {
    marker_path: PathBuf,
}

impl InstalledState {
    pub fn in_pack_root(pack_root: &Path) -> Self {
        Self {
            marker_path: pack_root.join(MARKER_FILE_NAME),
        }
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// 설치된 버전 조회. 없거나 빈 파일이면 `None`
    pub fn read(&self) -> Result<Option<String>, UpdaterError> {
        match std::fs::read_to_string(&self.marker_path) {
            Ok(content) => {
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(trimmed.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(UpdaterError::io("read marker", &self.marker_path, e)),
        }
    }

    pub fn write(&self, version: &str) -> Result<(), UpdaterError> {
        write_atomic(&self.marker_path, version.trim().as_bytes())?;
        tracing::info!("[State] Installed version set to {}", version.trim());
        Ok(())
    }
}

/// 같은 디렉터리에 임시 파일을 쓰고 대상 경로로 rename
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), UpdaterError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| UpdaterError::io("create dir", &parent, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)
        .map_err(|e| UpdaterError::io("create temp file", &parent, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| UpdaterError::io("write temp file", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| UpdaterError::io("replace", path, e.error))?;
    Ok(())
}
