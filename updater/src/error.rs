//! 업데이트 엔진 에러 타입
//!
//! ## 치명도 구분
//! - 치명적: 매니페스트 오류, 다운로드 소진, 압축 해제 실패, 버전 파싱 실패, 파일 시스템 오류
//! - 비치명적: 개별 삭제 실패(`RemovalFailed`), 손상된 프로필 저장소(`ProfileStoreCorrupt`).
//!   로그만 남기고 계속 진행
//! - 시도 단위: `HashMismatch`, `HttpStatus`, `Network`, `Io`는 재시도 대상 (`is_retryable`).
//!   그 외는 남은 시도와 상관없이 즉시 실패

use std::path::Path;
use std::time::Duration;

/// 업데이터 에러 타입
#[derive(thiserror::Error, Debug)]
pub enum UpdaterError {
    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),

    #[error("manifest unavailable: {0}")]
    ManifestUnavailable(String),

    #[error("malformed version '{0}'")]
    MalformedVersion(String),

    #[error("download of {filename} failed after {attempts} attempts: {last_error}")]
    DownloadExhausted {
        filename: String,
        attempts: u32,
        last_error: String,
    },

    #[error("hash mismatch for {filename}: expected {expected}, got {actual}")]
    HashMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("extraction of {archive} failed: {message}")]
    ExtractionFailed { archive: String, message: String },

    #[error("failed to remove {path}: {message}")]
    RemovalFailed { path: String, message: String },

    #[error("profile store {path} is corrupt: {message}")]
    ProfileStoreCorrupt { path: String, message: String },

    #[error("unsafe relative path '{0}'")]
    UnsafePath(String),

    #[error("file system error during {operation} on '{path}': {source}")]
    Io {
        operation: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl UpdaterError {
    /// IO 에러를 작업/경로 정보와 함께 감싼다
    pub fn io(operation: &str, path: &Path, source: std::io::Error) -> Self {
        UpdaterError::Io {
            operation: operation.to_string(),
            path: path.display().to_string(),
            source,
        }
    }

    /// reqwest 에러 변환. 상태 코드가 붙어 있으면 `HttpStatus`로 분류
    pub fn from_reqwest(err: &reqwest::Error, url: &str) -> Self {
        if let Some(status) = err.status() {
            UpdaterError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else if err.is_timeout() {
            UpdaterError::Network(format!("timed out: {}", url))
        } else if err.is_connect() {
            UpdaterError::Network(format!("connection failed: {}", url))
        } else {
            UpdaterError::Network(err.to_string())
        }
    }

    /// 같은 다운로드를 다시 시도해서 회복될 수 있는 에러인지
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpdaterError::HashMismatch { .. }
                | UpdaterError::HttpStatus { .. }
                | UpdaterError::Network(_)
                | UpdaterError::Io { .. }
        )
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ManifestInvalid(_) => "MANIFEST_INVALID",
            Self::ManifestUnavailable(_) => "MANIFEST_UNAVAILABLE",
            Self::MalformedVersion(_) => "MALFORMED_VERSION",
            Self::DownloadExhausted { .. } => "DOWNLOAD_EXHAUSTED",
            Self::HashMismatch { .. } => "HASH_MISMATCH",
            Self::HttpStatus { .. } => "HTTP_STATUS",
            Self::Network(_) => "NETWORK",
            Self::ExtractionFailed { .. } => "EXTRACTION_FAILED",
            Self::RemovalFailed { .. } => "REMOVAL_FAILED",
            Self::ProfileStoreCorrupt { .. } => "PROFILE_STORE_CORRUPT",
            Self::UnsafePath(_) => "UNSAFE_PATH",
            Self::Io { .. } => "IO",
            Self::Cancelled => "CANCELLED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// 블로킹 파일 작업(해시, 압축 해제, 병합)을 런타임 스레드 밖에서 실행
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, UpdaterError>
where
    F: FnOnce() -> Result<T, UpdaterError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| UpdaterError::Internal(anyhow::anyhow!("blocking task failed: {}", e)))?
}

/// 재시도 정책: 고정 횟수, 고정 간격 (백오프/지터 없음)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 현재까지 시도한 횟수
    pub current_attempt: u32,
    /// 시도 사이 대기 시간
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            current_attempt: 0,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            current_attempt: 0,
            delay,
        }
    }

    /// 남은 시도가 있는지 확인
    pub fn can_retry(&self) -> bool {
        self.current_attempt < self.max_attempts
    }

    /// 다음 시도를 시작. 1부터 시작하는 시도 번호 반환
    pub fn begin_attempt(&mut self) -> u32 {
        self.current_attempt += 1;
        self.current_attempt
    }

    /// 다음 시도 전 대기 시간 (선형: 항상 동일)
    pub fn next_delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_counts_attempts() {
        let mut policy = RetryPolicy::new(3, Duration::ZERO);
        let mut seen = Vec::new();
        while policy.can_retry() {
            seen.push(policy.begin_attempt());
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(!policy.can_retry());
    }

    #[test]
    fn retry_policy_never_zero_attempts() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn classification() {
        assert!(UpdaterError::Network("reset".into()).is_retryable());
        assert!(!UpdaterError::ManifestInvalid("x".into()).is_retryable());
        assert!(!UpdaterError::Cancelled.is_retryable());
        assert!(UpdaterError::HashMismatch {
            filename: "p.zip".into(),
            expected: "aa".into(),
            actual: "bb".into()
        }
        .is_retryable());
        assert!(!UpdaterError::ExtractionFailed {
            archive: "p.zip".into(),
            message: "bad".into()
        }
        .is_retryable());
        assert_eq!(UpdaterError::Cancelled.error_code(), "CANCELLED");
    }
}
