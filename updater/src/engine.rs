//! 업데이트 엔진: 매니페스트 조회부터 마지막 설치 단계까지 오케스트레이션
//!
//! ## 상태 전이
//! ```text
//! Idle → CheckingManifest → Planning → { UpToDate | Executing(1/n) → … → Executing(n/n) → Completed }
//!                     ↘ Failed / Cancelled (어느 진행 상태에서든)
//! ```
//! `run()`은 실행당 정확히 한 번 `EngineEvent::Finished`를 보낸다.

use std::fmt;

use thiserror::Error;

use crate::config::EngineConfig;
use crate::download::DownloadManager;
use crate::error::UpdaterError;
use crate::events::{CancellationFlag, EventSink};
use crate::installer::ArchiveInstaller;
use crate::manifest::Manifest;
use crate::planner::{plan_updates, InstallPlan, InstallStep};
use crate::profile::ProfileRegistrar;
use crate::state::InstalledState;
use crate::version;

// ══════════════════════════════════════════════════════
// 상태 머신
// ══════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    CheckingManifest,
    Planning,
    UpToDate,
    Executing { step: usize, total: usize },
    Completed,
    Failed,
    Cancelled,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineState::UpToDate
                | EngineState::Completed
                | EngineState::Failed
                | EngineState::Cancelled
        )
    }
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(EngineState, EngineState),
}

#[derive(Debug)]
pub struct EngineStateMachine {
    state: EngineState,
}

impl Default for EngineStateMachine {
    fn default() -> Self {
        Self {
            state: EngineState::Idle,
        }
    }
}

impl EngineStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn can_transition(&self, to: &EngineState) -> bool {
        use EngineState::*;
        match (&self.state, to) {
            (Idle, CheckingManifest) => true,
            (CheckingManifest, Planning) => true,
            (Planning, UpToDate) => true,
            (Planning, Executing { step: 1, total }) => *total >= 1,
            (Executing { step, total }, Executing { step: next, total: next_total }) => {
                total == next_total && *next == step + 1 && next <= next_total
            }
            (Executing { step, total }, Completed) => step == total,
            (CheckingManifest | Planning | Executing { .. }, Failed | Cancelled) => true,
            _ => false,
        }
    }

    pub fn transition(&mut self, to: EngineState) -> Result<(), TransitionError> {
        if self.can_transition(&to) {
            tracing::debug!("[Engine] State transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state.clone(), to))
        }
    }
}

// ══════════════════════════════════════════════════════
// 실행 결과
// ══════════════════════════════════════════════════════

/// 실행 종료 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// 설치 버전이 이미 최신
    UpToDate { version: String },
    /// 모든 단계 완료. `version`은 마지막 단계의 버전
    Completed { version: String },
    Failed { reason: String },
    /// 취소됨. `installed`는 취소 시점의 마커 버전
    Cancelled { installed: Option<String> },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::UpToDate { .. } | RunOutcome::Completed { .. })
    }

    /// 사람이 읽을 한 줄 요약
    pub fn summary(&self) -> String {
        match self {
            RunOutcome::UpToDate { version } => format!("Already up to date ({})", version),
            RunOutcome::Completed { version } => format!("Updated to {}", version),
            RunOutcome::Failed { reason } => format!("Update failed: {}", reason),
            RunOutcome::Cancelled { installed } => format!(
                "Update cancelled (installed: {})",
                installed.as_deref().unwrap_or("none")
            ),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// `check()` 결과: 아무것도 변경하지 않은 상태의 계획
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub installed: Option<String>,
    pub latest: String,
    pub plan: InstallPlan,
}

impl CheckReport {
    pub fn updates_available(&self) -> bool {
        !self.plan.is_empty()
    }
}

// ══════════════════════════════════════════════════════
// UpdateEngine
// ══════════════════════════════════════════════════════

pub struct UpdateEngine {
    config: EngineConfig,
    events: EventSink,
    cancel: CancellationFlag,
    machine: EngineStateMachine,
}

impl UpdateEngine {
    pub fn new(config: EngineConfig, events: EventSink, cancel: CancellationFlag) -> Self {
        Self {
            config,
            events,
            cancel,
            machine: EngineStateMachine::new(),
        }
    }

    pub fn state(&self) -> &EngineState {
        self.machine.state()
    }

    pub fn cancel_handle(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// 계획 전체 실행. 결과는 반환과 동시에 `Finished` 이벤트로도 전달된다
    pub async fn run(&mut self) -> RunOutcome {
        let outcome = match self.execute().await {
            Ok(outcome) => outcome,
            Err(UpdaterError::Cancelled) => {
                self.enter(EngineState::Cancelled);
                let installed = self.installed_state().read().ok().flatten();
                self.events.warn("[Engine] Update cancelled");
                RunOutcome::Cancelled { installed }
            }
            Err(e) => {
                self.enter(EngineState::Failed);
                self.events
                    .warn(format!("[Engine] Update failed ({}): {}", e.error_code(), e));
                RunOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        self.events.log(format!("[Engine] {}", outcome.summary()));
        self.events.finished(outcome.clone());
        outcome
    }

    /// 매니페스트 조회와 계획만 수행 (파일 시스템 변경 없음)
    pub async fn check(&self) -> Result<CheckReport, UpdaterError> {
        let downloader = self.downloader()?;
        let manifest = Manifest::from_value(downloader.fetch_json(&self.config.manifest_url).await?)?;
        let installed = self.installed_state().read()?;
        let plan = plan_updates(&manifest, installed.as_deref(), self.config.patch_ordering)?;
        Ok(CheckReport {
            installed,
            latest: manifest.latest_version,
            plan,
        })
    }

    async fn execute(&mut self) -> Result<RunOutcome, UpdaterError> {
        self.enter(EngineState::CheckingManifest);
        self.cancel.check()?;

        let downloader = self.downloader()?;
        self.events.log(format!(
            "[Engine] Fetching manifest from {}",
            self.config.manifest_url
        ));
        let manifest = Manifest::from_value(downloader.fetch_json(&self.config.manifest_url).await?)?;

        let installed = self.installed_state().read()?;
        self.events.log(format!(
            "[Engine] Installed version: {}, latest: {}",
            installed.as_deref().unwrap_or("none"),
            manifest.latest_version
        ));

        self.enter(EngineState::Planning);
        let plan = plan_updates(&manifest, installed.as_deref(), self.config.patch_ordering)?;

        if plan.is_empty() {
            self.enter(EngineState::UpToDate);
            let version = installed.unwrap_or_else(|| manifest.latest_version.clone());
            if version::is_newer(&manifest.latest_version, &version)? {
                self.events.warn(format!(
                    "[Engine] No package brings {} up to {}",
                    version, manifest.latest_version
                ));
            }
            return Ok(RunOutcome::UpToDate { version });
        }

        let installer = ArchiveInstaller::new(
            self.config.install_roots(),
            self.config.layout.clone(),
            ProfileRegistrar::new(self.config.profile_store_path()),
            self.config.profile.clone(),
            self.config.memory_gb,
            self.events.clone(),
            self.cancel.clone(),
        );

        let total = plan.len();
        for (idx, step) in plan.steps.iter().enumerate() {
            self.cancel.check()?;
            self.enter(EngineState::Executing {
                step: idx + 1,
                total,
            });
            self.events.log(format!(
                "[Engine] Step {}/{}: {}",
                idx + 1,
                total,
                step.label()
            ));

            match step {
                InstallStep::InstallFull(package) => {
                    installer.install_full(package, &downloader).await?
                }
                InstallStep::ApplyPatch { key, package } => {
                    installer.install_patch(key, package, &downloader).await?
                }
            }
        }

        self.enter(EngineState::Completed);
        let version = plan
            .final_version()
            .unwrap_or(&manifest.latest_version)
            .to_string();
        Ok(RunOutcome::Completed { version })
    }

    fn downloader(&self) -> Result<DownloadManager, UpdaterError> {
        DownloadManager::new(
            self.config.download.clone(),
            self.config.download_scratch_dir(),
            self.events.clone(),
            self.cancel.clone(),
        )
    }

    fn installed_state(&self) -> InstalledState {
        InstalledState::in_pack_root(&self.config.pack_dir)
    }

    /// 잘못된 전이는 프로그래밍 오류: 기록만 하고 상태는 유지
    fn enter(&mut self, to: EngineState) {
        if let Err(e) = self.machine.transition(to) {
            tracing::error!("[Engine] {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut sm = EngineStateMachine::new();
        assert!(sm.transition(EngineState::CheckingManifest).is_ok());
        assert!(sm.transition(EngineState::Planning).is_ok());
        assert!(sm.transition(EngineState::Executing { step: 1, total: 2 }).is_ok());
        assert!(sm.transition(EngineState::Executing { step: 2, total: 2 }).is_ok());
        assert!(sm.transition(EngineState::Completed).is_ok());
        assert!(sm.state().is_terminal());
    }

    #[test]
    fn cannot_complete_early_or_skip_steps() {
        let mut sm = EngineStateMachine::new();
        sm.transition(EngineState::CheckingManifest).unwrap();
        sm.transition(EngineState::Planning).unwrap();
        sm.transition(EngineState::Executing { step: 1, total: 3 }).unwrap();
        assert!(sm.transition(EngineState::Completed).is_err());
        assert!(sm.transition(EngineState::Executing { step: 3, total: 3 }).is_err());
        assert_eq!(sm.state(), &EngineState::Executing { step: 1, total: 3 });
    }

    #[test]
    fn terminal_states_are_final() {
        let mut sm = EngineStateMachine::new();
        sm.transition(EngineState::CheckingManifest).unwrap();
        sm.transition(EngineState::Failed).unwrap();
        assert!(sm.transition(EngineState::CheckingManifest).is_err());
        assert!(sm.transition(EngineState::Cancelled).is_err());
    }

    #[test]
    fn outcome_success_and_summary() {
        assert!(RunOutcome::UpToDate { version: "1.0".into() }.is_success());
        assert!(RunOutcome::Completed { version: "1.1".into() }.is_success());
        assert!(!RunOutcome::Failed { reason: "x".into() }.is_success());
        let cancelled = RunOutcome::Cancelled { installed: None };
        assert!(!cancelled.is_success());
        assert_eq!(cancelled.summary(), "Update cancelled (installed: none)");
    }
}
