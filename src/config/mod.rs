//! modpack-sync 설정 파일 관리
//!
//! `config/modpack.toml`에서 엔진 설정을 로드합니다. 파일이 없으면 기본값.
//! `MODPACK_SYNC_CONFIG` 환경 변수로 경로를 직접 지정할 수 있습니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use modpack_updater_lib::{EngineConfig, PatchOrdering};

pub const CONFIG_ENV_VAR: &str = "MODPACK_SYNC_CONFIG";
pub const CONFIG_FILE_NAME: &str = "modpack.toml";

/// 허용되는 `-Xmx` 값 (GB)
pub const ALLOWED_MEMORY_GB: [u32; 9] = [2, 3, 4, 6, 8, 12, 16, 24, 32];

/// `config set`으로 바꿀 수 있는 키
pub const SETTABLE_KEYS: &[&str] = &[
    "manifest_url",
    "pack_dir",
    "game_dir",
    "versions_dir",
    "libraries_dir",
    "profile_store",
    "memory_gb",
    "patch_ordering",
    "download.max_attempts",
    "download.timeout_secs",
    "download.retry_delay_ms",
    "profile.id",
    "profile.name",
    "profile.icon",
    "profile.last_version_id",
    "profile.jvm_flags",
    "layout.pack_content",
    "layout.version_store",
    "layout.libraries",
    "layout.additional_files",
];

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("unknown config key '{0}'")]
    UnknownKey(String),

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// 설정 파일 경로 결정
pub fn config_file_path() -> PathBuf {
    // 0. 환경 변수
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // 1. 실행 파일 옆 config/modpack.toml
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let cfg = dir.join("config").join(CONFIG_FILE_NAME);
            if cfg.exists() {
                return cfg;
            }
        }
    }

    // 2. 기본: CWD의 config/modpack.toml (생성용)
    PathBuf::from("config").join(CONFIG_FILE_NAME)
}

/// 기본 경로에서 설정 로드
pub fn load_config() -> Result<EngineConfig> {
    load_config_from(&config_file_path())
}

/// TOML 파일에서 설정 로드 (없으면 기본값)
pub fn load_config_from(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        tracing::debug!("[Config] {} not found, using defaults", path.display());
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: EngineConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    validate_memory(cfg.memory_gb).with_context(|| format!("in {}", path.display()))?;

    tracing::debug!("[Config] Loaded {}", path.display());
    Ok(cfg)
}

pub fn save_config_to(path: &Path, cfg: &EngineConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let content = toml::to_string_pretty(cfg).context("failed to serialize config")?;
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!("[Config] Saved {}", path.display());
    Ok(())
}

/// 키 하나를 바꾸고 저장. 저장한 파일 경로 반환
pub fn set_config_value(key: &str, value: &str) -> Result<PathBuf> {
    let path = config_file_path();
    let mut cfg = load_config_from(&path)?;
    apply_setting(&mut cfg, key, value)?;
    save_config_to(&path, &cfg)?;
    Ok(path)
}

pub fn validate_memory(memory_gb: u32) -> Result<(), ConfigError> {
    if ALLOWED_MEMORY_GB.contains(&memory_gb) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: "memory_gb".to_string(),
            value: memory_gb.to_string(),
            reason: format!("must be one of {:?}", ALLOWED_MEMORY_GB),
        })
    }
}

/// 문자열 값을 타입에 맞게 검증하여 적용
pub fn apply_setting(cfg: &mut EngineConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    match key {
        "manifest_url" => {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(invalid(key, value, "must be an http(s) URL"));
            }
            cfg.manifest_url = value.to_string();
        }
        "pack_dir" => cfg.pack_dir = required_path(key, value)?,
        "game_dir" => cfg.game_dir = required_path(key, value)?,
        "versions_dir" => cfg.versions_dir = optional_path(value),
        "libraries_dir" => cfg.libraries_dir = optional_path(value),
        "profile_store" => cfg.profile_store = optional_path(value),
        "memory_gb" => {
            let gb = value
                .trim_end_matches(|c| c == 'G' || c == 'g')
                .parse::<u32>()
                .map_err(|_| invalid(key, value, "not a number"))?;
            validate_memory(gb)?;
            cfg.memory_gb = gb;
        }
        "patch_ordering" => {
            cfg.patch_ordering = match value {
                "manifest_key" => PatchOrdering::ManifestKey,
                "version" => PatchOrdering::Version,
                _ => return Err(invalid(key, value, "expected 'manifest_key' or 'version'")),
            }
        }
        "download.max_attempts" => {
            let n = parse_number::<u32>(key, value)?;
            if n == 0 {
                return Err(invalid(key, value, "must be at least 1"));
            }
            cfg.download.max_attempts = n;
        }
        "download.timeout_secs" => {
            let n = parse_number::<u64>(key, value)?;
            if n == 0 {
                return Err(invalid(key, value, "must be at least 1"));
            }
            cfg.download.timeout_secs = n;
        }
        "download.retry_delay_ms" => cfg.download.retry_delay_ms = parse_number(key, value)?,
        "profile.id" => cfg.profile.id = required_text(key, value)?,
        "profile.name" => cfg.profile.name = required_text(key, value)?,
        "profile.icon" => cfg.profile.icon = required_text(key, value)?,
        "profile.last_version_id" => cfg.profile.last_version_id = required_text(key, value)?,
        "profile.jvm_flags" => cfg.profile.jvm_flags = value.to_string(),
        "layout.pack_content" => cfg.layout.pack_content = required_text(key, value)?,
        "layout.version_store" => cfg.layout.version_store = required_text(key, value)?,
        "layout.libraries" => cfg.layout.libraries = required_text(key, value)?,
        "layout.additional_files" => cfg.layout.additional_files = required_text(key, value)?,
        other => return Err(ConfigError::UnknownKey(other.to_string())),
    }
    Ok(())
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .map_err(|_| invalid(key, value, "not a number"))
}

fn required_text(key: &str, value: &str) -> Result<String, ConfigError> {
    if value.is_empty() {
        Err(invalid(key, value, "must not be empty"))
    } else {
        Ok(value.to_string())
    }
}

fn required_path(key: &str, value: &str) -> Result<PathBuf, ConfigError> {
    required_text(key, value).map(PathBuf::from)
}

/// 빈 값은 기본 경로로 되돌림
fn optional_path(value: &str) -> Option<PathBuf> {
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join(CONFIG_FILE_NAME);

        let mut cfg = EngineConfig::with_dirs(dir.path().join("pack"), dir.path().join("game"));
        cfg.memory_gb = 8;
        cfg.versions_dir = Some(dir.path().join("versions"));
        cfg.patch_ordering = PatchOrdering::Version;
        cfg.download.max_attempts = 3;
        save_config_to(&path, &cfg).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "manifest_url = \"http://localhost/m.json\"\n\n[download]\nmax_attempts = 2\n",
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.manifest_url, "http://localhost/m.json");
        assert_eq!(cfg.download.max_attempts, 2);
        assert_eq!(cfg.download.timeout_secs, 15);
        assert_eq!(cfg.memory_gb, 4);
    }

    #[test]
    fn invalid_memory_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "memory_gb = 5\n").unwrap();
        assert!(load_config_from(&path).is_err());
    }

    #[test]
    fn apply_setting_validates() {
        let mut cfg = EngineConfig::default();

        apply_setting(&mut cfg, "memory_gb", "12G").unwrap();
        assert_eq!(cfg.memory_gb, 12);
        assert!(apply_setting(&mut cfg, "memory_gb", "5").is_err());
        assert!(apply_setting(&mut cfg, "memory_gb", "lots").is_err());

        apply_setting(&mut cfg, "patch_ordering", "version").unwrap();
        assert_eq!(cfg.patch_ordering, PatchOrdering::Version);
        assert!(apply_setting(&mut cfg, "patch_ordering", "random").is_err());

        apply_setting(&mut cfg, "versions_dir", "/opt/versions").unwrap();
        assert_eq!(cfg.versions_dir, Some(PathBuf::from("/opt/versions")));
        apply_setting(&mut cfg, "versions_dir", "").unwrap();
        assert_eq!(cfg.versions_dir, None);

        assert!(apply_setting(&mut cfg, "download.max_attempts", "0").is_err());
        assert!(apply_setting(&mut cfg, "manifest_url", "ftp://x").is_err());
        assert!(matches!(
            apply_setting(&mut cfg, "nope", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn every_settable_key_is_known() {
        let mut cfg = EngineConfig::default();
        for key in SETTABLE_KEYS {
            let result = apply_setting(&mut cfg, key, "");
            assert!(
                !matches!(result, Err(ConfigError::UnknownKey(_))),
                "{key} is listed but not handled"
            );
        }
    }
}
