//! # modpack-sync
//!
//! 모드팩 업데이트 엔진(`modpack-updater-lib`)의 터미널 프론트엔드.
//! 설정 파일 관리와 CLI 명령을 제공합니다.

pub mod cli;
pub mod config;

pub use modpack_updater_lib as updater;
