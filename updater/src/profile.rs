//! 런처 프로필 등록 (`launcher_profiles.json`)
//!
//! 프로필 저장소는 외부 런처 소유이며 사람이 직접 편집하기도 한다.
//! 레코드 하나의 지정된 키만 덮어쓰고 나머지 키/레코드/최상위 필드는 그대로 둔다.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::UpdaterError;
use crate::state::write_atomic;

pub const DEFAULT_PROFILE_ID: &str = "23fc205a599a1340b3cb7ee096b9760d";
pub const DEFAULT_PROFILE_NAME: &str = "mxd02modpack";
pub const DEFAULT_PROFILE_ICON: &str = "Furnace_On";
pub const DEFAULT_LAST_VERSION_ID: &str = "1.19.2-forge-43.4.0";
pub const DEFAULT_JVM_FLAGS: &str = "-XX:+UnlockExperimentalVMOptions -XX:+UseG1GC \
-XX:G1NewSizePercent=20 -XX:G1ReservePercent=20 -XX:MaxGCPauseMillis=50 -XX:G1HeapRegionSize=32M";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// 프로필 식별/내용 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProfileSettings {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub last_version_id: String,
    pub jvm_flags: String,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            id: DEFAULT_PROFILE_ID.to_string(),
            name: DEFAULT_PROFILE_NAME.to_string(),
            icon: DEFAULT_PROFILE_ICON.to_string(),
            last_version_id: DEFAULT_LAST_VERSION_ID.to_string(),
            jvm_flags: DEFAULT_JVM_FLAGS.to_string(),
        }
    }
}

impl ProfileSettings {
    /// `-Xmx<memory>G <jvm_flags>`
    pub fn java_args(&self, memory_gb: u32) -> String {
        let flags = self.jvm_flags.trim();
        if flags.is_empty() {
            format!("-Xmx{}G", memory_gb)
        } else {
            format!("-Xmx{}G {}", memory_gb, flags)
        }
    }

    /// 풀 설치 시 기록하는 전체 필드
    pub fn full_payload(&self, game_dir: &Path, memory_gb: u32) -> Map<String, Value> {
        let now = timestamp_now();
        let mut fields = Map::new();
        fields.insert("created".into(), Value::String(now.clone()));
        fields.insert(
            "gameDir".into(),
            Value::String(game_dir.display().to_string()),
        );
        fields.insert("icon".into(), Value::String(self.icon.clone()));
        fields.insert("javaArgs".into(), Value::String(self.java_args(memory_gb)));
        fields.insert("lastUsed".into(), Value::String(now));
        fields.insert(
            "lastVersionId".into(),
            Value::String(self.last_version_id.clone()),
        );
        fields.insert("name".into(), Value::String(self.name.clone()));
        fields.insert("type".into(), Value::String("custom".into()));
        fields
    }

    /// 패치 시에는 `lastUsed`, `javaArgs` 만 갱신
    pub fn patch_payload(&self, memory_gb: u32) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("lastUsed".into(), Value::String(timestamp_now()));
        fields.insert("javaArgs".into(), Value::String(self.java_args(memory_gb)));
        fields
    }
}

/// UTC ISO-8601, 밀리초 + `Z`
pub fn timestamp_now() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// 프로필 저장소 갱신기
#[derive(Debug, Clone)]
pub struct ProfileRegistrar {
    store_path: PathBuf,
}

impl ProfileRegistrar {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
        }
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// 레코드에 `fields`의 키만 덮어쓰고 저장소 전체를 다시 기록
    pub fn upsert(&self, record_id: &str, fields: &Map<String, Value>) -> Result<(), UpdaterError> {
        let mut root = self.load_root();

        if !matches!(root.get("profiles"), Some(Value::Object(_))) {
            if root.contains_key("profiles") {
                self.report_corrupt("'profiles' is not an object");
            }
            root.insert("profiles".into(), Value::Object(Map::new()));
        }
        let Some(Value::Object(profiles)) = root.get_mut("profiles") else {
            return Err(UpdaterError::Internal(anyhow::anyhow!(
                "profiles table missing after initialization"
            )));
        };

        let record = profiles
            .entry(record_id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !record.is_object() {
            tracing::warn!(
                "[Profile] Record '{}' is not an object, replacing it",
                record_id
            );
            *record = Value::Object(Map::new());
        }
        if let Value::Object(record) = record {
            for (key, value) in fields {
                record.insert(key.clone(), value.clone());
            }
        }

        let bytes = serialize_store(&Value::Object(root))?;
        write_atomic(&self.store_path, &bytes)?;
        tracing::info!(
            "[Profile] Updated record '{}' in {}",
            record_id,
            self.store_path.display()
        );
        Ok(())
    }

    /// 읽기 전용 조회. 저장소가 없거나 손상됐거나 레코드가 없으면 `None`
    pub fn read_record(&self, record_id: &str) -> Option<Map<String, Value>> {
        let content = std::fs::read_to_string(&self.store_path).ok()?;
        let root: Value = serde_json::from_str(&content).ok()?;
        match root.get("profiles")?.get(record_id)? {
            Value::Object(map) => Some(map.clone()),
            _ => None,
        }
    }

    /// 저장소 루트 객체 로드. 손상 시 빈 저장소부터 시작
    fn load_root(&self) -> Map<String, Value> {
        let content = match std::fs::read_to_string(&self.store_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                self.report_corrupt(&format!("unreadable: {}", e));
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                self.report_corrupt("root is not an object");
                Map::new()
            }
            Err(e) => {
                self.report_corrupt(&e.to_string());
                Map::new()
            }
        }
    }

    fn report_corrupt(&self, message: &str) {
        let err = UpdaterError::ProfileStoreCorrupt {
            path: self.store_path.display().to_string(),
            message: message.to_string(),
        };
        tracing::warn!("[Profile] {} (starting from an empty store)", err);
    }
}

/// 4칸 들여쓰기, 키 정렬, 끝 줄바꿈
fn serialize_store(value: &Value) -> Result<Vec<u8>, UpdaterError> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| UpdaterError::Internal(anyhow::anyhow!("profile serialization: {}", e)))?;
    out.push(b'\n');
    Ok(out)
}
