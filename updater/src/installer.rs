//! 패키지 설치: 다운로드, 압축 해제, 하위 트리 병합, 삭제 목록 처리
//!
//! ## 아카이브 레이아웃 (최상위 디렉터리 이름은 `ArchiveLayout`으로 변경 가능)
//! - `.mxd02modpack/`     → 팩 루트에 재귀 병합
//! - `forgeVersion/`      → 각 자식을 버전 저장소 루트에 병합
//! - `libraries/`         → 각 자식을 공유 라이브러리 루트에 병합
//! - `additional_files/`  → 팩 루트에 병합 (없으면 로그만)
//!
//! 병합 규칙: 디렉터리는 필요 시 생성, 파일은 무조건 덮어쓰기.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::extract_archive;
use crate::download::DownloadManager;
use crate::error::{run_blocking, UpdaterError};
use crate::events::{CancellationFlag, EventSink};
use crate::manifest::PackageDescriptor;
use crate::profile::{ProfileRegistrar, ProfileSettings};
use crate::state::InstalledState;

pub const FULL_SCRATCH_DIR: &str = "_temp_full_";
pub const PATCH_SCRATCH_DIR: &str = "_temp_patch_";

/// 설치 대상 디렉터리 역할
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRoots {
    /// 팩 콘텐츠 트리 (마커 파일, 스크래치 디렉터리 포함)
    pub pack_root: PathBuf,
    /// 런처의 버전 저장소 (`<game_dir>/versions`)
    pub version_store_root: PathBuf,
    /// 런처의 공유 라이브러리 (`<game_dir>/libraries`)
    pub libraries_root: PathBuf,
}

/// 아카이브 최상위 디렉터리 이름
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArchiveLayout {
    pub pack_content: String,
    pub version_store: String,
    pub libraries: String,
    pub additional_files: String,
}

impl Default for ArchiveLayout {
    fn default() -> Self {
        Self {
            pack_content: ".mxd02modpack".to_string(),
            version_store: "forgeVersion".to_string(),
            libraries: "libraries".to_string(),
            additional_files: "additional_files".to_string(),
        }
    }
}

// ══════════════════════════════════════════════════════
// 병합 / 삭제 기본 연산
// ══════════════════════════════════════════════════════

/// `src` 트리를 `dst`에 재귀 병합. 복사한 파일 수 반환
pub fn merge_tree(src: &Path, dst: &Path) -> Result<usize, UpdaterError> {
    std::fs::create_dir_all(dst).map_err(|e| UpdaterError::io("create dir", dst, e))?;

    let mut copied = 0;
    let entries = std::fs::read_dir(src).map_err(|e| UpdaterError::io("read dir", src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| UpdaterError::io("read dir", src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| UpdaterError::io("stat", &from, e))?;

        if file_type.is_dir() {
            copied += merge_tree(&from, &to)?;
        } else {
            copy_file_over(&from, &to)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// `src`의 각 최상위 자식을 `dst_root/<이름>`에 병합
pub fn merge_children(src: &Path, dst_root: &Path) -> Result<usize, UpdaterError> {
    std::fs::create_dir_all(dst_root).map_err(|e| UpdaterError::io("create dir", dst_root, e))?;

    let mut copied = 0;
    let entries = std::fs::read_dir(src).map_err(|e| UpdaterError::io("read dir", src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| UpdaterError::io("read dir", src, e))?;
        let from = entry.path();
        let to = dst_root.join(entry.file_name());
        if from.is_dir() {
            copied += merge_tree(&from, &to)?;
        } else {
            copy_file_over(&from, &to)?;
            copied += 1;
        }
        tracing::debug!("[Installer] Merged {} -> {}", from.display(), to.display());
    }
    Ok(copied)
}

fn copy_file_over(from: &Path, to: &Path) -> Result<(), UpdaterError> {
    // 읽기 전용 대상은 덮어쓰기 전에 쓰기 가능으로
    if let Ok(meta) = std::fs::metadata(to) {
        if meta.is_file() {
            ensure_owner_writable(to, &meta).map_err(|e| UpdaterError::io("chmod", to, e))?;
        }
    }
    std::fs::copy(from, to).map_err(|e| UpdaterError::io("copy", to, e))?;
    Ok(())
}

/// 소유자 쓰기 권한만 추가. 그룹/기타 권한은 건드리지 않는다
fn ensure_owner_writable(path: &Path, meta: &std::fs::Metadata) -> std::io::Result<()> {
    let mut perms = meta.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = perms.mode();
        if mode & 0o200 != 0 {
            return Ok(());
        }
        perms.set_mode(mode | 0o200);
    }
    #[cfg(not(unix))]
    {
        if !perms.readonly() {
            return Ok(());
        }
        perms.set_readonly(false);
    }
    std::fs::set_permissions(path, perms)
}

/// 매니페스트의 상대 경로를 `root` 아래 경로로 변환. 절대 경로와 `..`는 거부
pub fn resolve_relative(root: &Path, relative: &str) -> Result<PathBuf, UpdaterError> {
    let trimmed = relative.trim();
    if trimmed.is_empty() {
        return Err(UpdaterError::UnsafePath(relative.to_string()));
    }
    let path = Path::new(trimmed);
    let mut has_normal = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => has_normal = true,
            Component::CurDir => {}
            _ => return Err(UpdaterError::UnsafePath(relative.to_string())),
        }
    }
    if !has_normal {
        return Err(UpdaterError::UnsafePath(relative.to_string()));
    }
    Ok(root.join(path))
}

/// 하위 트리 전체의 읽기 전용 속성 해제
pub fn clear_readonly_recursive(path: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    ensure_owner_writable(path, &meta)?;
    if meta.is_dir() {
        for entry in std::fs::read_dir(path)? {
            clear_readonly_recursive(&entry?.path())?;
        }
    }
    Ok(())
}

/// 삭제 목록 처리 결과
#[derive(Debug, Default)]
pub struct RemovalReport {
    pub removed: Vec<PathBuf>,
    /// 항목별 실패 (`RemovalFailed`). 단계 실패로 이어지지 않는다
    pub failures: Vec<UpdaterError>,
}

/// `files_to_remove` 다음 `dir_to_remove` 순으로 팩 루트 기준 삭제
pub fn apply_removals(pack_root: &Path, files: &[String], dirs: &[String]) -> RemovalReport {
    let mut report = RemovalReport::default();

    for rel in files {
        let target = match resolve_relative(pack_root, rel) {
            Ok(target) => target,
            Err(e) => {
                report.failures.push(removal_failed(rel, &e.to_string()));
                continue;
            }
        };
        if std::fs::symlink_metadata(&target).is_err() {
            tracing::debug!("[Installer] Nothing to remove at {}", target.display());
            continue;
        }
        match std::fs::remove_file(&target) {
            Ok(()) => report.removed.push(target),
            Err(e) => report.failures.push(removal_failed(rel, &e.to_string())),
        }
    }

    for rel in dirs {
        let target = match resolve_relative(pack_root, rel) {
            Ok(target) => target,
            Err(e) => {
                report.failures.push(removal_failed(rel, &e.to_string()));
                continue;
            }
        };
        if !target.exists() {
            tracing::debug!("[Installer] Nothing to remove at {}", target.display());
            continue;
        }
        let result = clear_readonly_recursive(&target).and_then(|_| std::fs::remove_dir_all(&target));
        match result {
            Ok(()) => report.removed.push(target),
            Err(e) => report.failures.push(removal_failed(rel, &e.to_string())),
        }
    }

    report
}

fn removal_failed(path: &str, message: &str) -> UpdaterError {
    UpdaterError::RemovalFailed {
        path: path.to_string(),
        message: message.to_string(),
    }
}

/// 이전 실행이 남긴 스크래치 디렉터리를 지우고 새로 만든다
fn prepare_scratch(dir: &Path) -> Result<(), UpdaterError> {
    if dir.exists() {
        tracing::info!("[Installer] Removing leftover scratch dir {}", dir.display());
        clear_readonly_recursive(dir)
            .and_then(|_| std::fs::remove_dir_all(dir))
            .map_err(|e| UpdaterError::io("remove scratch dir", dir, e))?;
    }
    std::fs::create_dir_all(dir).map_err(|e| UpdaterError::io("create dir", dir, e))
}

// ══════════════════════════════════════════════════════
// ArchiveInstaller
// ══════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageKind {
    Full,
    Patch,
}

impl PackageKind {
    fn scratch_dir_name(self) -> &'static str {
        match self {
            PackageKind::Full => FULL_SCRATCH_DIR,
            PackageKind::Patch => PATCH_SCRATCH_DIR,
        }
    }
}

/// 풀 팩 / 패치 설치기
pub struct ArchiveInstaller {
    roots: InstallRoots,
    layout: ArchiveLayout,
    registrar: ProfileRegistrar,
    profile: ProfileSettings,
    memory_gb: u32,
    events: EventSink,
    cancel: CancellationFlag,
}

impl ArchiveInstaller {
    pub fn new(
        roots: InstallRoots,
        layout: ArchiveLayout,
        registrar: ProfileRegistrar,
        profile: ProfileSettings,
        memory_gb: u32,
        events: EventSink,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            roots,
            layout,
            registrar,
            profile,
            memory_gb,
            events,
            cancel,
        }
    }

    pub async fn install_full(
        &self,
        package: &PackageDescriptor,
        downloader: &DownloadManager,
    ) -> Result<(), UpdaterError> {
        self.events
            .log(format!("[Installer] Installing full pack {}", package.version));
        self.install(PackageKind::Full, package, downloader).await?;
        self.events.log(format!(
            "[Installer] Full pack {} installed",
            package.version
        ));
        Ok(())
    }

    pub async fn install_patch(
        &self,
        key: &str,
        package: &PackageDescriptor,
        downloader: &DownloadManager,
    ) -> Result<(), UpdaterError> {
        self.events.log(format!(
            "[Installer] Applying {} (version {})",
            key, package.version
        ));
        self.install(PackageKind::Patch, package, downloader).await?;
        self.events
            .log(format!("[Installer] Patch {} applied", package.version));
        Ok(())
    }

    async fn install(
        &self,
        kind: PackageKind,
        package: &PackageDescriptor,
        downloader: &DownloadManager,
    ) -> Result<(), UpdaterError> {
        let archive = downloader
            .fetch(&package.url, &package.filename, package.expected_hash())
            .await?;

        // 다운로드 이후로는 파일 시스템을 바꾸므로 여기서 마지막으로 취소 확인
        self.cancel.check()?;

        let scratch = self.roots.pack_root.join(kind.scratch_dir_name());
        let staging = self.staging();
        {
            let (package, archive, scratch) = (package.clone(), archive.clone(), scratch.clone());
            run_blocking(move || staging.place(kind, &package, &archive, &scratch)).await?;
        }

        let fields = match kind {
            PackageKind::Full => self
                .profile
                .full_payload(&self.roots.pack_root, self.memory_gb),
            PackageKind::Patch => self.profile.patch_payload(self.memory_gb),
        };
        {
            let marker = InstalledState::in_pack_root(&self.roots.pack_root);
            let registrar = self.registrar.clone();
            let (version, profile_id) = (package.version.clone(), self.profile.id.clone());
            run_blocking(move || {
                marker.write(&version)?;
                registrar.upsert(&profile_id, &fields)
            })
            .await?;
        }

        let staging = self.staging();
        let cleanup = run_blocking(move || {
            staging.cleanup(&scratch, &archive);
            Ok(())
        });
        if let Err(e) = cleanup.await {
            self.events
                .warn(format!("[Installer] Cleanup did not finish: {}", e));
        }
        Ok(())
    }

    fn staging(&self) -> Staging {
        Staging {
            roots: self.roots.clone(),
            layout: self.layout.clone(),
            events: self.events.clone(),
        }
    }
}

/// 블로킹 스레드에서 도는 압축 해제 / 삭제 / 병합 / 정리
struct Staging {
    roots: InstallRoots,
    layout: ArchiveLayout,
    events: EventSink,
}

impl Staging {
    fn place(
        &self,
        kind: PackageKind,
        package: &PackageDescriptor,
        archive: &Path,
        scratch: &Path,
    ) -> Result<(), UpdaterError> {
        prepare_scratch(scratch)?;
        self.events
            .log(format!("[Installer] Extracting {}", package.filename));
        extract_archive(archive, scratch)?;

        if kind == PackageKind::Patch {
            self.remove_obsolete(package);
        }

        self.merge_layout(scratch)
    }

    fn remove_obsolete(&self, package: &PackageDescriptor) {
        if package.files_to_remove.is_empty() && package.dir_to_remove.is_empty() {
            return;
        }
        let report = apply_removals(
            &self.roots.pack_root,
            &package.files_to_remove,
            &package.dir_to_remove,
        );
        for path in &report.removed {
            self.events
                .log(format!("[Installer] Removed {}", path.display()));
        }
        for failure in &report.failures {
            self.events.warn(format!("[Installer] {}", failure));
        }
    }

    fn merge_layout(&self, scratch: &Path) -> Result<(), UpdaterError> {
        let pack_content = scratch.join(&self.layout.pack_content);
        if pack_content.is_dir() {
            let n = merge_tree(&pack_content, &self.roots.pack_root)?;
            self.events.log(format!(
                "[Installer] Copied {} ({} files)",
                self.layout.pack_content, n
            ));
        }

        let version_store = scratch.join(&self.layout.version_store);
        if version_store.is_dir() {
            let n = merge_children(&version_store, &self.roots.version_store_root)?;
            self.events.log(format!(
                "[Installer] Copied {} into {} ({} files)",
                self.layout.version_store,
                self.roots.version_store_root.display(),
                n
            ));
        }

        let libraries = scratch.join(&self.layout.libraries);
        if libraries.is_dir() {
            let n = merge_children(&libraries, &self.roots.libraries_root)?;
            self.events.log(format!(
                "[Installer] Copied {} into {} ({} files)",
                self.layout.libraries,
                self.roots.libraries_root.display(),
                n
            ));
        }

        let additional = scratch.join(&self.layout.additional_files);
        if additional.is_dir() {
            let n = merge_tree(&additional, &self.roots.pack_root)?;
            self.events.log(format!(
                "[Installer] Copied {} ({} files)",
                self.layout.additional_files, n
            ));
        } else {
            self.events.log(format!(
                "[Installer] No '{}' folder in package",
                self.layout.additional_files
            ));
        }

        Ok(())
    }

    /// 스크래치 디렉터리와 받은 아카이브 삭제. 실패해도 단계는 성공
    fn cleanup(&self, scratch: &Path, archive: &Path) {
        let scratch_result =
            clear_readonly_recursive(scratch).and_then(|_| std::fs::remove_dir_all(scratch));
        if let Err(e) = scratch_result {
            self.events.warn(format!(
                "[Installer] Failed to clean up {}: {}",
                scratch.display(),
                e
            ));
        }
        if let Err(e) = std::fs::remove_file(archive) {
            self.events.warn(format!(
                "[Installer] Failed to delete {}: {}",
                archive.display(),
                e
            ));
        }
        // 비어 있을 때만 지워진다
        if let Some(download_dir) = archive.parent() {
            let _ = std::fs::remove_dir(download_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_and_creates() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        std::fs::create_dir_all(src.join("mods/sub")).unwrap();
        std::fs::write(src.join("mods/a.jar"), b"new").unwrap();
        std::fs::write(src.join("mods/sub/b.cfg"), b"cfg").unwrap();
        std::fs::create_dir_all(dst.join("mods")).unwrap();
        std::fs::write(dst.join("mods/a.jar"), b"old content that is longer").unwrap();
        std::fs::write(dst.join("mods/keep.jar"), b"keep").unwrap();

        let copied = merge_tree(&src, &dst).unwrap();
        assert_eq!(copied, 2);
        assert_eq!(std::fs::read(dst.join("mods/a.jar")).unwrap(), b"new");
        assert_eq!(std::fs::read(dst.join("mods/sub/b.cfg")).unwrap(), b"cfg");
        assert_eq!(std::fs::read(dst.join("mods/keep.jar")).unwrap(), b"keep");
    }

    #[test]
    fn merge_children_places_each_child() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("forgeVersion");
        std::fs::create_dir_all(src.join("1.19.2-forge")).unwrap();
        std::fs::write(src.join("1.19.2-forge/1.19.2-forge.json"), b"{}").unwrap();
        std::fs::write(src.join("loose.txt"), b"x").unwrap();

        let versions = tmp.path().join("versions");
        merge_children(&src, &versions).unwrap();
        assert!(versions.join("1.19.2-forge/1.19.2-forge.json").is_file());
        assert!(versions.join("loose.txt").is_file());
    }

    #[test]
    fn removals_tolerate_missing_and_remove_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("config/legacy/deep")).unwrap();
        std::fs::write(root.join("config/legacy/deep/x.toml"), b"x").unwrap();
        std::fs::create_dir_all(root.join("mods")).unwrap();
        std::fs::write(root.join("mods/old.jar"), b"old").unwrap();

        let report = apply_removals(
            root,
            &["mods/old.jar".into(), "mods/never-existed.jar".into()],
            &["config/legacy".into()],
        );
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert_eq!(report.removed.len(), 2);
        assert!(!root.join("mods/old.jar").exists());
        assert!(!root.join("config/legacy").exists());
        assert!(root.join("config").exists());
    }

    #[test]
    fn unsafe_removals_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let pack = tmp.path().join("pack");
        std::fs::create_dir_all(&pack).unwrap();
        std::fs::write(tmp.path().join("outside.txt"), b"precious").unwrap();
        let absolute = tmp.path().join("outside.txt").display().to_string();

        let report = apply_removals(
            &pack,
            &["../outside.txt".into(), absolute],
            &["..".into(), "".into()],
        );
        assert_eq!(report.failures.len(), 4);
        assert!(report
            .failures
            .iter()
            .all(|f| matches!(f, UpdaterError::RemovalFailed { .. })));
        assert!(tmp.path().join("outside.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn readonly_tree_is_removed() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("locked");
        std::fs::create_dir_all(dir.join("inner")).unwrap();
        std::fs::write(dir.join("inner/f.txt"), b"x").unwrap();
        std::fs::set_permissions(dir.join("inner/f.txt"), std::fs::Permissions::from_mode(0o444))
            .unwrap();
        std::fs::set_permissions(dir.join("inner"), std::fs::Permissions::from_mode(0o555))
            .unwrap();

        let report = apply_removals(tmp.path(), &[], &["locked".into()]);
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn clearing_readonly_adds_only_owner_write() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("versions");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("forge.json"), b"{}").unwrap();
        std::fs::set_permissions(dir.join("forge.json"), std::fs::Permissions::from_mode(0o444))
            .unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o555)).unwrap();

        clear_readonly_recursive(&dir).unwrap();

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&dir), 0o755);
        assert_eq!(mode(&dir.join("forge.json")), 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn overwriting_readonly_target_keeps_it_private() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::create_dir_all(&dst).unwrap();
        std::fs::write(src.join("a.jar"), b"new").unwrap();
        std::fs::set_permissions(src.join("a.jar"), std::fs::Permissions::from_mode(0o600))
            .unwrap();
        std::fs::write(dst.join("a.jar"), b"old").unwrap();
        std::fs::set_permissions(dst.join("a.jar"), std::fs::Permissions::from_mode(0o400))
            .unwrap();

        merge_tree(&src, &dst).unwrap();

        assert_eq!(std::fs::read(dst.join("a.jar")).unwrap(), b"new");
        let mode = std::fs::metadata(dst.join("a.jar")).unwrap().permissions().mode();
        assert_eq!(mode & 0o022, 0, "group/other write must stay off");
    }

    #[test]
    fn resolve_relative_accepts_nested_paths() {
        let root = Path::new("/pack");
        assert_eq!(
            resolve_relative(root, "./mods/a.jar").unwrap(),
            root.join("mods/a.jar")
        );
        assert!(resolve_relative(root, ".").is_err());
        assert!(resolve_relative(root, "mods/../../x").is_err());
    }
}
