//! 엔진 이벤트와 협조적 취소 플래그
//!
//! 엔진은 호출자와 단방향 이벤트로만 통신한다: 로그 문자열, 진행률(0–100),
//! 그리고 실행당 정확히 한 번의 `Finished`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use crate::engine::RunOutcome;
use crate::error::UpdaterError;

/// 엔진에서 발생하는 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// 사람이 읽을 로그 한 줄
    Log(String),
    /// 현재 다운로드 진행률 (단계마다 0부터 다시 시작)
    Progress(u8),
    /// 실행 종료
    Finished(RunOutcome),
}

/// 이벤트 송신기. 수신자가 없어도 tracing 으로는 항상 기록된다
/// (`log`는 debug, `warn`은 warn 레벨)
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// 채널 없이 tracing 으로만 기록
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{}", message);
        self.send(EngineEvent::Log(message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.send(EngineEvent::Log(message));
    }

    pub fn progress(&self, percent: u8) {
        self.send(EngineEvent::Progress(percent.min(100)));
    }

    pub fn finished(&self, outcome: RunOutcome) {
        self.send(EngineEvent::Finished(outcome));
    }

    fn send(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            // 수신자가 사라졌으면 조용히 무시
            let _ = tx.send(event);
        }
    }
}

/// 협조적 취소 플래그. 여러 번 설정해도 안전
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<CancelInner>);

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// 취소되었으면 `UpdaterError::Cancelled`
    pub fn check(&self) -> Result<(), UpdaterError> {
        if self.is_cancelled() {
            Err(UpdaterError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// 취소될 때까지 대기. 이미 취소되었으면 즉시 반환
    pub async fn cancelled(&self) {
        loop {
            // 플래그 확인 전에 등록해야 그 사이의 cancel()을 놓치지 않는다
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
