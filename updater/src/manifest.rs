//! 원격 매니페스트: 최신 버전, 풀 팩, 패치 목록
//!
//! ```json
//! {
//!   "latestVersion": "0.31.2",
//!   "full":   { "version": "0.31",   "url": "https://…/full.zip",   "filename": "full.zip",   "hash": "…" },
//!   "patch1": { "version": "0.31.1", "url": "https://…/p1.zip", "filename": "p1.zip",
//!               "filesToRemove": ["mods/old.jar"], "dirToRemove": ["config/legacy"] },
//!   "patch2": { "version": "0.31.2", "url": "https://…/p2.zip", "filename": "p2.zip" }
//! }
//! ```
//!
//! 매니페스트는 신뢰할 수 없는 입력이므로 구조가 어긋나면 즉시 `ManifestInvalid`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UpdaterError;

/// 패치 항목을 식별하는 최상위 키 접두사
pub const PATCH_KEY_PREFIX: &str = "patch";

/// 풀 팩 / 패치 공통 패키지 기술자
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PackageDescriptor {
    pub version: String,
    pub url: String,
    pub filename: String,
    /// 선택: 패키지 SHA256 (hex)
    #[serde(default)]
    pub hash: Option<String>,
    /// 팩 루트 기준 상대 경로
    #[serde(default)]
    pub files_to_remove: Vec<String>,
    #[serde(default)]
    pub dir_to_remove: Vec<String>,
}

impl PackageDescriptor {
    /// 비어 있지 않은 기대 해시
    pub fn expected_hash(&self) -> Option<&str> {
        self.hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }
}

/// 매니페스트 키와 함께 보관하는 패치
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchEntry {
    pub key: String,
    pub package: PackageDescriptor,
}

/// 파싱/검증이 끝난 매니페스트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub latest_version: String,
    pub full: PackageDescriptor,
    /// 키의 사전순으로 정렬됨
    pub patches: Vec<PatchEntry>,
}

impl Manifest {
    pub fn from_json_str(input: &str) -> Result<Self, UpdaterError> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| UpdaterError::ManifestInvalid(format!("not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, UpdaterError> {
        let Value::Object(map) = value else {
            return Err(UpdaterError::ManifestInvalid(
                "top-level value must be an object".to_string(),
            ));
        };

        let latest_version = map
            .get("latestVersion")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| UpdaterError::ManifestInvalid("missing 'latestVersion'".to_string()))?
            .to_string();

        let full_value = map
            .get("full")
            .ok_or_else(|| UpdaterError::ManifestInvalid("missing 'full' section".to_string()))?;
        if full_value.get("version").and_then(Value::as_str).is_none() {
            return Err(UpdaterError::ManifestInvalid(
                "missing 'full.version'".to_string(),
            ));
        }
        let full = parse_descriptor("full", full_value)?;

        // BTreeMap 순회 = 키 사전순 ("patch10" < "patch2")
        let mut patches = Vec::new();
        let sorted: BTreeMap<&String, &Value> = map
            .iter()
            .filter(|(key, _)| key.starts_with(PATCH_KEY_PREFIX))
            .collect();
        for (key, value) in sorted {
            patches.push(PatchEntry {
                key: key.clone(),
                package: parse_descriptor(key, value)?,
            });
        }

        Ok(Self {
            latest_version,
            full,
            patches,
        })
    }
}

fn parse_descriptor(key: &str, value: &Value) -> Result<PackageDescriptor, UpdaterError> {
    if !value.is_object() {
        return Err(UpdaterError::ManifestInvalid(format!(
            "'{}' must be an object",
            key
        )));
    }
    let descriptor: PackageDescriptor = serde_json::from_value(value.clone())
        .map_err(|e| UpdaterError::ManifestInvalid(format!("'{}': {}", key, e)))?;

    validate_filename(&descriptor.filename)
        .map_err(|msg| UpdaterError::ManifestInvalid(format!("'{}': {}", key, msg)))?;
    if descriptor.url.trim().is_empty() {
        return Err(UpdaterError::ManifestInvalid(format!(
            "'{}': url must not be empty",
            key
        )));
    }

    Ok(descriptor)
}

/// 다운로드 파일명은 스크래치 디렉터리 안에 머물러야 함
fn validate_filename(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("filename must not be empty".to_string());
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(format!("filename '{}' must be a bare file name", name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn package(version: &str) -> Value {
        json!({ "version": version, "url": format!("https://example.test/{version}.zip"), "filename": format!("{version}.zip") })
    }

    #[test]
    fn parse_full_and_patches() {
        let manifest = Manifest::from_value(json!({
            "latestVersion": "0.31.2",
            "full": { "version": "0.31", "url": "https://example.test/full.zip", "filename": "full.zip", "hash": "ABCD" },
            "patch2": package("0.31.2"),
            "patch1": {
                "version": "0.31.1", "url": "https://example.test/p1.zip", "filename": "p1.zip",
                "filesToRemove": ["mods/old.jar"], "dirToRemove": ["config/legacy"]
            },
            "notes": "ignored"
        }))
        .unwrap();

        assert_eq!(manifest.latest_version, "0.31.2");
        assert_eq!(manifest.full.version, "0.31");
        assert_eq!(manifest.full.expected_hash(), Some("ABCD"));
        let keys: Vec<&str> = manifest.patches.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["patch1", "patch2"]);
        assert_eq!(manifest.patches[0].package.files_to_remove, vec!["mods/old.jar"]);
        assert_eq!(manifest.patches[0].package.dir_to_remove, vec!["config/legacy"]);
        assert!(manifest.patches[1].package.files_to_remove.is_empty());
    }

    #[test]
    fn patch_keys_sort_lexicographically() {
        let manifest = Manifest::from_value(json!({
            "latestVersion": "1.10",
            "full": package("1.0"),
            "patch2": package("1.2"),
            "patch10": package("1.10"),
            "patch1": package("1.1"),
        }))
        .unwrap();
        let keys: Vec<&str> = manifest.patches.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["patch1", "patch10", "patch2"]);
    }

    #[test]
    fn missing_latest_version_is_invalid() {
        let err = Manifest::from_value(json!({ "full": package("1.0") })).unwrap_err();
        assert!(matches!(err, UpdaterError::ManifestInvalid(_)));
    }

    #[test]
    fn missing_full_version_is_invalid() {
        let err = Manifest::from_value(json!({
            "latestVersion": "1.0",
            "full": { "url": "https://example.test/f.zip", "filename": "f.zip" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("full.version"));
    }

    #[test]
    fn empty_hash_counts_as_absent() {
        let mut full = package("1.0");
        full["hash"] = json!("  ");
        let manifest = Manifest::from_value(json!({ "latestVersion": "1.0", "full": full })).unwrap();
        assert_eq!(manifest.full.expected_hash(), None);
    }

    #[test]
    fn filename_with_separator_is_rejected() {
        let err = Manifest::from_value(json!({
            "latestVersion": "1.0",
            "full": { "version": "1.0", "url": "https://example.test/f.zip", "filename": "../f.zip" }
        }))
        .unwrap_err();
        assert!(matches!(err, UpdaterError::ManifestInvalid(_)));
    }

    #[test]
    fn non_object_patch_is_invalid() {
        let err = Manifest::from_value(json!({
            "latestVersion": "1.0",
            "full": package("1.0"),
            "patch1": "1.1"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("patch1"));
    }

    #[test]
    fn not_json_is_invalid() {
        assert!(matches!(
            Manifest::from_json_str("<html>").unwrap_err(),
            UpdaterError::ManifestInvalid(_)
        ));
    }
}
