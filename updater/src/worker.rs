//! 백그라운드 워커: 엔진 한 번의 실행을 독립 tokio 태스크로 처리
//!
//! ## 아키텍처
//! - `UpdateWorker`: 엔진을 tokio 태스크 하나로 스폰
//! - CLI는 이벤트 채널(`next_event`)로 로그/진행률/종료를 수신
//! - 취소는 `cancel_handle()`의 플래그로만 전달

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::engine::{RunOutcome, UpdateEngine};
use crate::events::{CancellationFlag, EngineEvent, EventSink};

pub struct UpdateWorker {
    events: mpsc::UnboundedReceiver<EngineEvent>,
    cancel: CancellationFlag,
    handle: JoinHandle<RunOutcome>,
}

impl UpdateWorker {
    /// 엔진 생성 후 백그라운드 태스크로 시작
    pub fn spawn(config: EngineConfig) -> Self {
        let (sink, events) = EventSink::channel();
        let cancel = CancellationFlag::new();
        let mut engine = UpdateEngine::new(config, sink, cancel.clone());

        let handle = tokio::spawn(async move {
            tracing::info!("[Worker] Update worker started");
            let outcome = engine.run().await;
            tracing::info!("[Worker] Update worker stopped");
            outcome
        });

        Self {
            events,
            cancel,
            handle,
        }
    }

    /// 다음 이벤트. 엔진이 끝나고 채널이 비면 `None`
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    pub fn cancel_handle(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// 태스크 종료 대기
    pub async fn join(self) -> RunOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("[Worker] Update task aborted: {}", e);
                RunOutcome::Failed {
                    reason: format!("update task aborted: {}", e),
                }
            }
        }
    }
}
