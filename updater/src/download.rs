//! 재시도/해시 검증 다운로드
//!
//! ## 동작
//! - 시도마다 취소 확인 → 진행률 0 → 스트리밍 GET
//! - 본문은 `<scratch>/<filename>.part`에 기록, 검증 후에만 최종 경로로 rename
//! - 전송 오류, 2xx 이외 상태, 청크 읽기 타임아웃, 해시 불일치는 모두 시도 실패
//! - 예산 소진 시 `DownloadExhausted`, 최종 경로에는 파일이 남지 않는다

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::checksum;
use crate::error::{run_blocking, RetryPolicy, UpdaterError};
use crate::events::{CancellationFlag, EventSink};

/// 팩 루트 안의 다운로드 스크래치 디렉터리 이름
pub const DOWNLOAD_SCRATCH_DIR: &str = "_temp_down_";

const USER_AGENT: &str = concat!("modpack-sync/", env!("CARGO_PKG_VERSION"));

/// 다운로드 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DownloadSettings {
    /// 파일당 최대 시도 횟수
    pub max_attempts: u32,
    /// 연결 / 청크 읽기 / 매니페스트 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 시도 사이 대기 (밀리초)
    pub retry_delay_ms: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            timeout_secs: 15,
            retry_delay_ms: 0,
        }
    }
}

impl DownloadSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

pub struct DownloadManager {
    http: reqwest::Client,
    settings: DownloadSettings,
    scratch_dir: PathBuf,
    events: EventSink,
    cancel: CancellationFlag,
}

impl DownloadManager {
    pub fn new(
        settings: DownloadSettings,
        scratch_dir: impl Into<PathBuf>,
        events: EventSink,
        cancel: CancellationFlag,
    ) -> Result<Self, UpdaterError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(settings.timeout())
            .build()
            .map_err(|e| UpdaterError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            settings,
            scratch_dir: scratch_dir.into(),
            events,
            cancel,
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// `url`을 `<scratch>/<filename>`으로 다운로드하고 검증된 경로 반환
    pub async fn fetch(
        &self,
        url: &str,
        filename: &str,
        expected_hash: Option<&str>,
    ) -> Result<PathBuf, UpdaterError> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| UpdaterError::io("create dir", &self.scratch_dir, e))?;

        let dest = self.scratch_dir.join(filename);
        let part = self.scratch_dir.join(format!("{}.part", filename));
        // 이전 실행의 잔여물
        remove_if_exists(&dest).await;
        remove_if_exists(&part).await;

        let mut policy = self.settings.retry_policy();
        let mut last_error = String::from("no attempt made");

        while policy.can_retry() {
            self.cancel.check()?;
            let attempt = policy.begin_attempt();
            self.events.log(format!(
                "[Download] Downloading {} (attempt {}/{})",
                filename, attempt, policy.max_attempts
            ));
            self.events.progress(0);

            match self.attempt(url, filename, &part, expected_hash).await {
                Ok(()) => {
                    tokio::fs::rename(&part, &dest)
                        .await
                        .map_err(|e| UpdaterError::io("rename", &dest, e))?;
                    self.events
                        .log(format!("[Download] {} downloaded", filename));
                    return Ok(dest);
                }
                Err(UpdaterError::Cancelled) => {
                    remove_if_exists(&part).await;
                    self.events
                        .warn(format!("[Download] {} cancelled", filename));
                    return Err(UpdaterError::Cancelled);
                }
                Err(e) if !e.is_retryable() => {
                    remove_if_exists(&part).await;
                    return Err(e);
                }
                Err(e) => {
                    remove_if_exists(&part).await;
                    self.events.warn(format!(
                        "[Download] Attempt {}/{} for {} failed: {}",
                        attempt, policy.max_attempts, filename, e
                    ));
                    last_error = e.to_string();
                    self.wait_before_retry(&policy).await?;
                }
            }
        }

        Err(UpdaterError::DownloadExhausted {
            filename: filename.to_string(),
            attempts: policy.current_attempt,
            last_error,
        })
    }

    async fn attempt(
        &self,
        url: &str,
        filename: &str,
        part: &Path,
        expected_hash: Option<&str>,
    ) -> Result<(), UpdaterError> {
        let response = self.send(self.http.get(url), url).await?;

        let total = response.content_length().filter(|len| *len > 0);
        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| UpdaterError::io("create", part, e))?;

        let read_timeout = self.settings.timeout();
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut last_percent: u8 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(UpdaterError::Cancelled),
                next = tokio::time::timeout(read_timeout, stream.next()) => next.map_err(|_| {
                    UpdaterError::Network(format!(
                        "no data for {}s while reading {}",
                        read_timeout.as_secs(),
                        url
                    ))
                })?,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| UpdaterError::from_reqwest(&e, url))?;

            file.write_all(&chunk)
                .await
                .map_err(|e| UpdaterError::io("write", part, e))?;
            written += chunk.len() as u64;

            if let Some(total) = total {
                let percent = (written.saturating_mul(100) / total).min(100) as u8;
                if percent != last_percent {
                    self.events.progress(percent);
                    last_percent = percent;
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| UpdaterError::io("flush", part, e))?;
        file.sync_all()
            .await
            .map_err(|e| UpdaterError::io("sync", part, e))?;
        drop(file);

        if let Some(expected) = expected_hash {
            let path = part.to_path_buf();
            let name = filename.to_string();
            let expected = expected.to_string();
            run_blocking(move || checksum::verify_sha256_file(&path, &name, &expected)).await?;
            tracing::debug!("[Download] {} hash verified", filename);
        }

        Ok(())
    }

    /// 요청을 보내고 응답 헤더까지 대기. 타임아웃과 취소가 대기를 끊는다
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, UpdaterError> {
        let timeout = self.settings.timeout();
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(UpdaterError::Cancelled),
            sent = tokio::time::timeout(timeout, request.send()) => sent
                .map_err(|_| {
                    UpdaterError::Network(format!(
                        "no response for {}s from {}",
                        timeout.as_secs(),
                        url
                    ))
                })?
                .map_err(|e| UpdaterError::from_reqwest(&e, url))?,
        };
        response
            .error_for_status()
            .map_err(|e| UpdaterError::from_reqwest(&e, url))
    }

    async fn wait_before_retry(&self, policy: &RetryPolicy) -> Result<(), UpdaterError> {
        let delay = policy.next_delay();
        if !policy.can_retry() || delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UpdaterError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// 매니페스트 JSON 조회. 모든 시도 실패 시 `ManifestUnavailable`
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, UpdaterError> {
        let mut policy = self.settings.retry_policy();
        let mut last_error = String::from("no attempt made");

        while policy.can_retry() {
            self.cancel.check()?;
            let attempt = policy.begin_attempt();
            tracing::info!(
                "[Download] Fetching manifest {} (attempt {}/{})",
                url,
                attempt,
                policy.max_attempts
            );

            match self.fetch_text(url).await {
                Ok(body) => {
                    return serde_json::from_str(&body).map_err(|e| {
                        UpdaterError::ManifestInvalid(format!("not valid JSON: {}", e))
                    });
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    self.events.warn(format!(
                        "[Download] Manifest attempt {}/{} failed: {}",
                        attempt, policy.max_attempts, e
                    ));
                    last_error = e.to_string();
                    self.wait_before_retry(&policy).await?;
                }
            }
        }

        Err(UpdaterError::ManifestUnavailable(last_error))
    }

    async fn fetch_text(&self, url: &str) -> Result<String, UpdaterError> {
        // 본문까지 포함한 요청 전체 타임아웃
        let response = self
            .send(self.http.get(url).timeout(self.settings.timeout()), url)
            .await?;
        response
            .text()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, url))
    }
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("[Download] Failed to remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = DownloadSettings::default();
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.timeout(), Duration::from_secs(15));
        assert_eq!(settings.retry_policy().next_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn unreachable_host_exhausts_budget() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DownloadSettings {
            max_attempts: 2,
            timeout_secs: 1,
            retry_delay_ms: 0,
        };
        let manager =
            DownloadManager::new(settings, dir.path(), EventSink::detached(), CancellationFlag::new())
                .unwrap();

        // 포트 1: 연결 거부
        let err = manager
            .fetch("http://127.0.0.1:1/pack.zip", "pack.zip", None)
            .await
            .unwrap_err();
        match err {
            UpdaterError::DownloadExhausted { attempts, filename, .. } => {
                assert_eq!(attempts, 2);
                assert_eq!(filename, "pack.zip");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("pack.zip").exists());
        assert!(!dir.path().join("pack.zip.part").exists());
    }

    /// 연결은 받지만 아무것도 보내지 않는 서버
    async fn silent_server() -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        addr
    }

    #[tokio::test]
    async fn silent_server_times_out_each_attempt() {
        let addr = silent_server().await;
        let dir = tempfile::tempdir().unwrap();
        let settings = DownloadSettings {
            max_attempts: 2,
            timeout_secs: 1,
            retry_delay_ms: 0,
        };
        let manager =
            DownloadManager::new(settings, dir.path(), EventSink::detached(), CancellationFlag::new())
                .unwrap();

        let url = format!("http://{}/pack.zip", addr);
        let err = tokio::time::timeout(
            Duration::from_secs(10),
            manager.fetch(&url, "pack.zip", None),
        )
        .await
        .expect("download hung on a silent server")
        .unwrap_err();
        assert!(
            matches!(err, UpdaterError::DownloadExhausted { attempts: 2, .. }),
            "unexpected error: {err}"
        );
        assert!(!dir.path().join("pack.zip.part").exists());
    }

    #[tokio::test]
    async fn cancel_interrupts_silent_server() {
        let addr = silent_server().await;
        let dir = tempfile::tempdir().unwrap();
        let settings = DownloadSettings {
            max_attempts: 3,
            timeout_secs: 30,
            retry_delay_ms: 0,
        };
        let cancel = CancellationFlag::new();
        let manager =
            DownloadManager::new(settings, dir.path(), EventSink::detached(), cancel.clone())
                .unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let url = format!("http://{}/pack.zip", addr);
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            manager.fetch(&url, "pack.zip", None),
        )
        .await
        .expect("cancel did not interrupt the header wait")
        .unwrap_err();
        assert!(matches!(err, UpdaterError::Cancelled), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let manager =
            DownloadManager::new(DownloadSettings::default(), dir.path(), EventSink::detached(), cancel)
                .unwrap();
        let err = manager
            .fetch("http://127.0.0.1:1/pack.zip", "pack.zip", None)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::Cancelled));
    }

    #[tokio::test]
    async fn manifest_unavailable_after_budget() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DownloadSettings {
            max_attempts: 1,
            timeout_secs: 1,
            retry_delay_ms: 0,
        };
        let manager =
            DownloadManager::new(settings, dir.path(), EventSink::detached(), CancellationFlag::new())
                .unwrap();
        let err = manager
            .fetch_json("http://127.0.0.1:1/manifest.json")
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::ManifestUnavailable(_)));
    }
}
