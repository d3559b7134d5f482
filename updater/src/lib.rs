//! # 모드팩 업데이트 엔진
//!
//! 로컬에 설치된 모드팩을 원격 매니페스트 기준으로 최신 상태로 맞춥니다.
//! 풀 팩 재설치 또는 증분 패치 적용 중 하나를 계획하여 순서대로 실행합니다.
//!
//! ## 동작 원리
//! 1. 매니페스트 조회 (`download::DownloadManager::fetch_json`)
//! 2. 설치 버전(`installed_version.txt`)과 비교하여 계획 산출 (`planner`)
//! 3. 단계마다 다운로드 → 해시 검증 → 압축 해제 → 병합 → 마커 기록 → 런처 프로필 갱신
//! 4. 종료 이벤트 한 번 (`events::EngineEvent::Finished`)
//!
//! ## 아키텍처
//! - **엔진(engine.rs)**: 상태 머신, 계획 실행, 취소
//! - **워커(worker.rs)**: 엔진을 백그라운드 태스크로 실행, 이벤트 채널 제공
//! - **설치(installer.rs)**: 하위 트리 병합, 삭제 목록 처리
//! - **에러(error.rs)**: 치명/비치명 구분, 재시도 정책
//!
//! ## 매니페스트 형식
//! ```json
//! {
//!   "latestVersion": "0.31.2",
//!   "full":   { "version": "0.31",   "url": "https://example.com/full.zip", "filename": "full.zip", "hash": "<sha256>" },
//!   "patch1": { "version": "0.31.1", "url": "https://example.com/p1.zip",   "filename": "p1.zip",
//!               "filesToRemove": ["mods/old.jar"], "dirToRemove": ["config/legacy"] },
//!   "patch2": { "version": "0.31.2", "url": "https://example.com/p2.zip",   "filename": "p2.zip" }
//! }
//! ```

// ══════════════════════════════════════════════════════
// 모듈
// ══════════════════════════════════════════════════════

pub mod archive;
pub mod checksum;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod events;
pub mod installer;
pub mod manifest;
pub mod planner;
pub mod profile;
pub mod state;
pub mod version;
pub mod worker;


// Re-exports for convenience
pub use config::EngineConfig;
pub use download::{DownloadManager, DownloadSettings};
pub use engine::{CheckReport, EngineState, RunOutcome, TransitionError, UpdateEngine};
pub use error::{RetryPolicy, UpdaterError};
pub use events::{CancellationFlag, EngineEvent, EventSink};
pub use installer::{ArchiveInstaller, ArchiveLayout, InstallRoots};
pub use manifest::{Manifest, PackageDescriptor, PatchEntry};
pub use planner::{plan_updates, InstallPlan, InstallStep, PatchOrdering};
pub use profile::{ProfileRegistrar, ProfileSettings};
pub use state::InstalledState;
pub use version::PackVersion;
pub use worker::UpdateWorker;
