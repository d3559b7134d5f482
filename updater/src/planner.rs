//! 업데이트 계획: 설치 버전과 매니페스트로부터 설치 단계 목록 산출
//!
//! 1. 설치 버전 == 최신 버전 → 빈 계획 (최신 상태)
//! 2. 미설치 또는 풀 팩 버전이 더 높음 → `InstallFull`, 기준 버전 = 풀 팩 버전
//! 3. 패치를 순서대로 보며 기준 버전보다 높은 것만 `ApplyPatch`, 기준 버전 갱신
//!
//! 계획은 실행 전에 한 번만 계산되며 실행 도중 다시 평가하지 않는다.

use serde::{Deserialize, Serialize};

use crate::error::UpdaterError;
use crate::manifest::{Manifest, PackageDescriptor, PatchEntry};
use crate::version::PackVersion;

/// 패치 적용 순서
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOrdering {
    /// 매니페스트 키 사전순 ("patch10"이 "patch2"보다 앞섬). 기존 배포본과의 호환 모드
    #[default]
    ManifestKey,
    /// 패치 버전 순, 같은 버전이면 키 순
    Version,
}

/// 설치 단계
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStep {
    InstallFull(PackageDescriptor),
    ApplyPatch {
        key: String,
        package: PackageDescriptor,
    },
}

impl InstallStep {
    pub fn package(&self) -> &PackageDescriptor {
        match self {
            InstallStep::InstallFull(package) => package,
            InstallStep::ApplyPatch { package, .. } => package,
        }
    }

    /// 이 단계가 끝나면 기록될 버전
    pub fn target_version(&self) -> &str {
        &self.package().version
    }

    pub fn label(&self) -> String {
        match self {
            InstallStep::InstallFull(p) => format!("full pack {}", p.version),
            InstallStep::ApplyPatch { key, package } => {
                format!("{} ({})", key, package.version)
            }
        }
    }
}

/// 순서가 정해진 설치 계획
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallPlan {
    pub steps: Vec<InstallStep>,
}

impl InstallPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// 마지막 단계의 버전 (계획이 모두 끝났을 때의 설치 버전)
    pub fn final_version(&self) -> Option<&str> {
        self.steps.last().map(InstallStep::target_version)
    }
}

/// 설치 계획 산출
pub fn plan_updates(
    manifest: &Manifest,
    current: Option<&str>,
    ordering: PatchOrdering,
) -> Result<InstallPlan, UpdaterError> {
    let latest = PackVersion::parse(&manifest.latest_version)?;
    let current = current.map(PackVersion::parse).transpose()?;

    if current.as_ref() == Some(&latest) {
        return Ok(InstallPlan::default());
    }

    let mut steps = Vec::new();
    let full_version = PackVersion::parse(&manifest.full.version)?;

    let mut baseline = match current {
        Some(installed) if installed >= full_version => installed,
        _ => {
            steps.push(InstallStep::InstallFull(manifest.full.clone()));
            full_version
        }
    };

    for entry in ordered_patches(&manifest.patches, ordering)? {
        let patch_version = PackVersion::parse(&entry.package.version)?;
        if patch_version > baseline {
            steps.push(InstallStep::ApplyPatch {
                key: entry.key.clone(),
                package: entry.package.clone(),
            });
            baseline = patch_version;
        }
    }

    Ok(InstallPlan { steps })
}

fn ordered_patches(
    patches: &[PatchEntry],
    ordering: PatchOrdering,
) -> Result<Vec<&PatchEntry>, UpdaterError> {
    match ordering {
        PatchOrdering::ManifestKey => {
            let mut sorted: Vec<&PatchEntry> = patches.iter().collect();
            sorted.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(sorted)
        }
        PatchOrdering::Version => {
            let mut keyed = patches
                .iter()
                .map(|p| Ok((PackVersion::parse(&p.package.version)?, p)))
                .collect::<Result<Vec<_>, UpdaterError>>()?;
            keyed.sort_by(|(va, a), (vb, b)| va.cmp(vb).then_with(|| a.key.cmp(&b.key)));
            Ok(keyed.into_iter().map(|(_, p)| p).collect())
        }
    }
}
