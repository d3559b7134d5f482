//! 엔진 설정: 경로, 매니페스트 URL, 프로필, 메모리, 재시도 예산
//!
//! 모든 값은 호출자가 주입한다. TOML 직렬화 시 값 필드가 테이블보다 먼저 와야 하므로
//! 필드 순서를 바꾸지 말 것.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::download::{DownloadSettings, DOWNLOAD_SCRATCH_DIR};
use crate::installer::{ArchiveLayout, InstallRoots};
use crate::planner::PatchOrdering;
use crate::profile::ProfileSettings;

pub const DEFAULT_MANIFEST_URL: &str = "https://pastebin.com/raw/mPKas0Ci";
pub const DEFAULT_MEMORY_GB: u32 = 4;
pub const PROFILE_STORE_FILE: &str = "launcher_profiles.json";

/// 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub manifest_url: String,
    /// 팩 루트
    pub pack_dir: PathBuf,
    /// 런처 게임 디렉터리
    pub game_dir: PathBuf,
    /// 기본값 `<game_dir>/versions`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions_dir: Option<PathBuf>,
    /// 기본값 `<game_dir>/libraries`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libraries_dir: Option<PathBuf>,
    /// 기본값 `<game_dir>/launcher_profiles.json`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_store: Option<PathBuf>,
    /// `-Xmx` 값 (GB). 허용 범위 검사는 호출자 책임
    pub memory_gb: u32,
    pub patch_ordering: PatchOrdering,
    pub download: DownloadSettings,
    pub profile: ProfileSettings,
    pub layout: ArchiveLayout,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_root = default_data_root();
        Self {
            manifest_url: DEFAULT_MANIFEST_URL.to_string(),
            pack_dir: data_root.join(".mxd02modpack"),
            game_dir: data_root.join(".minecraft"),
            versions_dir: None,
            libraries_dir: None,
            profile_store: None,
            memory_gb: DEFAULT_MEMORY_GB,
            patch_ordering: PatchOrdering::default(),
            download: DownloadSettings::default(),
            profile: ProfileSettings::default(),
            layout: ArchiveLayout::default(),
        }
    }
}

impl EngineConfig {
    /// 팩 루트와 게임 디렉터리만 지정한 설정 (나머지는 기본값)
    pub fn with_dirs(pack_dir: impl Into<PathBuf>, game_dir: impl Into<PathBuf>) -> Self {
        Self {
            pack_dir: pack_dir.into(),
            game_dir: game_dir.into(),
            ..Self::default()
        }
    }

    pub fn install_roots(&self) -> InstallRoots {
        InstallRoots {
            pack_root: self.pack_dir.clone(),
            version_store_root: self
                .versions_dir
                .clone()
                .unwrap_or_else(|| self.game_dir.join("versions")),
            libraries_root: self
                .libraries_dir
                .clone()
                .unwrap_or_else(|| self.game_dir.join("libraries")),
        }
    }

    pub fn profile_store_path(&self) -> PathBuf {
        self.profile_store
            .clone()
            .unwrap_or_else(|| self.game_dir.join(PROFILE_STORE_FILE))
    }

    pub fn download_scratch_dir(&self) -> PathBuf {
        self.pack_dir.join(DOWNLOAD_SCRATCH_DIR)
    }
}

/// Windows는 `%APPDATA%`, 그 외는 `$HOME`
pub fn default_data_root() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home);
        }
    }
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_follow_game_dir() {
        let config = EngineConfig::with_dirs("/data/pack", "/data/game");
        let roots = config.install_roots();
        assert_eq!(roots.pack_root, PathBuf::from("/data/pack"));
        assert_eq!(roots.version_store_root, PathBuf::from("/data/game/versions"));
        assert_eq!(roots.libraries_root, PathBuf::from("/data/game/libraries"));
        assert_eq!(
            config.profile_store_path(),
            PathBuf::from("/data/game/launcher_profiles.json")
        );
        assert_eq!(
            config.download_scratch_dir(),
            PathBuf::from("/data/pack/_temp_down_")
        );
    }

    #[test]
    fn overrides_win() {
        let mut config = EngineConfig::with_dirs("/p", "/g");
        config.versions_dir = Some("/custom/versions".into());
        config.libraries_dir = Some("/custom/libs".into());
        config.profile_store = Some("/custom/profiles.json".into());
        let roots = config.install_roots();
        assert_eq!(roots.version_store_root, PathBuf::from("/custom/versions"));
        assert_eq!(roots.libraries_root, PathBuf::from("/custom/libs"));
        assert_eq!(config.profile_store_path(), PathBuf::from("/custom/profiles.json"));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "memory_gb": 8, "download": { "max_attempts": 2 } }"#).unwrap();
        assert_eq!(config.memory_gb, 8);
        assert_eq!(config.download.max_attempts, 2);
        assert_eq!(config.download.timeout_secs, 15);
        assert_eq!(config.manifest_url, DEFAULT_MANIFEST_URL);
        assert_eq!(config.patch_ordering, PatchOrdering::ManifestKey);
    }
}
