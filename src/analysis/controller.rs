//! 分析工作流控制器：状态机主控
//!
//! idle → uploading → thinking → analyzing → complete / error，reset 回到 idle。
//!
//! 内部状态（运行 ID、步骤追踪、结果）由 Mutex 保护，每次修改后在持锁期间投影为 AnalysisState
//! 并通过 watch 通道发布，因此观察者看到的顺序与修改顺序一致。
//! 每次运行持有自己的 RunId：reset 或新提交会使旧 ID 失效，旧运行迟到的修改一律丢弃。

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::analysis::fallback::fallback_result;
use crate::analysis::pipeline::{Pipeline, PipelineStep};
use crate::analysis::steps::{StepId, StepStatus, StepTracker};
use crate::analysis::types::{AnalysisResult, DocumentFile};
use crate::analysis::work::RunContext;
use crate::backend::{BackendGateway, DegradedMode};
use crate::config::AppConfig;
use crate::core::{AnalysisError, AnalysisState, AnalysisStatus};

/// 运行 ID（单调递增）
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize)]
pub struct RunId(u64);

impl RunId {
    pub fn first() -> Self {
        Self(1)
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// 控制器内部状态
struct Shared {
    /// 当前有效的运行；与之不符的运行不得修改状态
    active_run: RunId,
    status: AnalysisStatus,
    file: Option<Arc<DocumentFile>>,
    tracker: StepTracker,
    result: Option<AnalysisResult>,
    error: Option<String>,
    cancel: Option<CancellationToken>,
    state_tx: watch::Sender<AnalysisState>,
}

impl Shared {
    fn project(&self) -> AnalysisState {
        AnalysisState {
            status: self.status,
            file: self.file.clone(),
            thinking_steps: self.tracker.steps().to_vec(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.project());
    }

    /// 使当前运行失效并回到 idle 默认值
    fn reset_to_idle(&mut self) {
        self.active_run = self.active_run.next();
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.status = AnalysisStatus::Idle;
        self.file = None;
        self.tracker.clear();
        self.result = None;
        self.error = None;
    }
}

/// submit 返回的运行句柄
pub struct RunHandle {
    run_id: RunId,
    join: JoinHandle<()>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// 等待运行任务结束（完成、失败或因 reset 被放弃）
    pub async fn wait(self) {
        if let Err(e) = self.join.await {
            tracing::error!("Analysis task for {} aborted: {}", self.run_id, e);
        }
    }
}

pub struct AnalysisController {
    shared: Arc<Mutex<Shared>>,
    state_rx: watch::Receiver<AnalysisState>,
    pipeline: Arc<Pipeline>,
    gateway: Arc<BackendGateway>,
}

impl AnalysisController {
    pub fn new(pipeline: Pipeline, gateway: Arc<BackendGateway>) -> Self {
        let (state_tx, state_rx) = watch::channel(AnalysisState::default());
        let shared = Shared {
            active_run: RunId(0),
            status: AnalysisStatus::Idle,
            file: None,
            tracker: StepTracker::new(),
            result: None,
            error: None,
            cancel: None,
            state_tx,
        };
        Self {
            shared: Arc::new(Mutex::new(shared)),
            state_rx,
            pipeline: Arc::new(pipeline),
            gateway,
        }
    }

    /// 按配置创建网关与标准流水线
    pub fn from_config(cfg: &AppConfig, degraded: DegradedMode) -> Self {
        let gateway = Arc::new(BackendGateway::from_config(&cfg.backend, degraded));
        let pipeline = Pipeline::standard(gateway.clone(), &cfg.simulation);
        Self::new(pipeline, gateway)
    }

    /// 提交文档并启动一次运行；运行中（uploading / thinking / analyzing）时拒绝
    pub async fn submit(&self, file: DocumentFile) -> Result<RunHandle, AnalysisError> {
        let file = Arc::new(file);
        let (run_id, cancel) = {
            let mut shared = self.shared.lock().await;
            if !shared.status.accepts_submission() {
                return Err(AnalysisError::RunInProgress {
                    status: shared.status,
                });
            }
            shared.reset_to_idle();
            shared.status = AnalysisStatus::Uploading;
            shared.file = Some(file.clone());
            let cancel = CancellationToken::new();
            shared.cancel = Some(cancel.clone());
            shared.publish();
            (shared.active_run, cancel)
        };

        tracing::info!(
            "Analysis {} started: {} ({} bytes, {})",
            run_id,
            file.name,
            file.size,
            file.content_type
        );

        let runner = RunExecutor {
            shared: self.shared.clone(),
            pipeline: self.pipeline.clone(),
            run_id,
            cancel,
        };
        let join = tokio::spawn(runner.run(file));
        Ok(RunHandle { run_id, join })
    }

    /// 提交并等待运行结束，返回最终状态
    pub async fn analyze(&self, file: DocumentFile) -> Result<AnalysisState, AnalysisError> {
        self.submit(file).await?.wait().await;
        Ok(self.snapshot())
    }

    /// 回到 idle；放弃进行中的运行（其后续修改会被丢弃）
    pub async fn reset(&self) {
        let mut shared = self.shared.lock().await;
        if shared.status != AnalysisStatus::Idle {
            tracing::info!("Analysis reset (was {})", shared.status);
        }
        shared.reset_to_idle();
        shared.publish();
    }

    pub fn snapshot(&self) -> AnalysisState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisState> {
        self.state_rx.clone()
    }

    /// 演示模式（远端不可用，使用本地模拟）
    pub fn is_demo_mode(&self) -> bool {
        self.gateway.is_degraded()
    }

    pub fn gateway(&self) -> &BackendGateway {
        &self.gateway
    }
}

/// 从 panic 载荷中取出消息（&str / String），其他类型给出占位描述
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// 单次运行的执行体（在独立 task 中运行）
struct RunExecutor {
    shared: Arc<Mutex<Shared>>,
    pipeline: Arc<Pipeline>,
    run_id: RunId,
    cancel: CancellationToken,
}

impl RunExecutor {
    async fn run(self, file: Arc<DocumentFile>) {
        let started = Instant::now();
        let mut ctx = RunContext::new(self.run_id, file);

        for step in self.pipeline.steps() {
            let step_id = match self.begin_step(step).await {
                Some(Ok(id)) => id,
                Some(Err(e)) => {
                    self.fail(None, e).await;
                    return;
                }
                None => return,
            };

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("{} cancelled during '{}'", self.run_id, step.kind.description());
                    return;
                }
                outcome = AssertUnwindSafe(step.work.execute(&ctx)).catch_unwind() => outcome,
            };

            match outcome {
                Ok(Ok(outcome)) => ctx.apply(outcome),
                Ok(Err(e)) => {
                    self.fail(Some(step_id), e).await;
                    return;
                }
                Err(payload) => {
                    let err = AnalysisError::StepPanicked {
                        step: step.kind.description().to_string(),
                        message: panic_message(payload.as_ref()),
                    };
                    self.fail(Some(step_id), err).await;
                    return;
                }
            }

            match self.complete_step(step_id).await {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    self.fail(Some(step_id), e).await;
                    return;
                }
                None => return,
            }
        }

        let result = ctx.result.take().unwrap_or_else(fallback_result);
        let finished = self
            .with_active(|s| {
                s.result = Some(result);
                s.error = None;
                s.status = AnalysisStatus::Complete;
                s.cancel = None;
            })
            .await;
        if finished.is_some() {
            tracing::info!(
                "Analysis {} complete in {:?}",
                self.run_id,
                started.elapsed()
            );
        }
    }

    /// 在持锁且运行仍有效时执行 f 并发布状态；运行已失效时返回 None
    async fn with_active<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> Option<R> {
        let mut shared = self.shared.lock().await;
        if shared.active_run != self.run_id {
            tracing::debug!(
                "Dropping late update from {} (active: {})",
                self.run_id,
                shared.active_run
            );
            return None;
        }
        let out = f(&mut *shared);
        shared.publish();
        Some(out)
    }

    /// 切换阶段（如需要）、追加 pending 步骤并标记为 in-progress
    async fn begin_step(&self, step: &PipelineStep) -> Option<Result<StepId, AnalysisError>> {
        let run_id = self.run_id;
        let kind = step.kind;
        self.with_active(|s| -> Result<StepId, AnalysisError> {
            let phase = kind.phase();
            if s.status != phase {
                tracing::info!("Analysis {}: {} -> {}", run_id, s.status, phase);
                s.status = phase;
            }
            let id = s.tracker.add_step(kind.description());
            s.publish();
            s.tracker.advance(id, StepStatus::InProgress)?;
            tracing::debug!("Analysis {}: {}", run_id, kind.description());
            Ok(id)
        })
        .await
    }

    async fn complete_step(&self, id: StepId) -> Option<Result<(), AnalysisError>> {
        self.with_active(|s| s.tracker.advance(id, StepStatus::Complete))
            .await
    }

    /// 未归类故障：当前步骤标记 error，运行进入 error 状态，已有步骤保留
    async fn fail(&self, step: Option<StepId>, err: AnalysisError) {
        let run_id = self.run_id;
        let message = err.to_string();
        self.with_active(|s| {
            if let Some(id) = step {
                if let Err(e) = s.tracker.advance(id, StepStatus::Error) {
                    tracing::debug!("Could not mark {} as error: {}", id, e);
                }
            }
            tracing::error!("Analysis {} failed: {}", run_id, message);
            s.result = None;
            s.error = Some(message);
            s.status = AnalysisStatus::Error;
            s.cancel = None;
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::analysis::pipeline::StepKind;
    use crate::analysis::work::{StepOutcome, StepWork};
    use crate::backend::InMemoryBackend;
    use crate::config::SimulationSection;

    fn controller_with(gateway: BackendGateway) -> AnalysisController {
        let gateway = Arc::new(gateway);
        let pipeline = Pipeline::standard(gateway.clone(), &SimulationSection::instant());
        AnalysisController::new(pipeline, gateway)
    }

    fn contract() -> DocumentFile {
        DocumentFile::new("contract.pdf", b"%PDF-1.7 contract".to_vec())
    }

    /// 第一次执行时阻塞，直到测试放行
    struct GateWork {
        started: Notify,
        release: Notify,
        armed: std::sync::atomic::AtomicBool,
    }

    impl GateWork {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: Notify::new(),
                release: Notify::new(),
                armed: std::sync::atomic::AtomicBool::new(true),
            })
        }
    }

    #[async_trait]
    impl StepWork for GateWork {
        async fn execute(&self, _ctx: &RunContext) -> Result<StepOutcome, AnalysisError> {
            if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
                self.started.notify_one();
                self.release.notified().await;
            }
            Ok(StepOutcome::Done)
        }
    }

    struct FailingWork;

    #[async_trait]
    impl StepWork for FailingWork {
        async fn execute(&self, _ctx: &RunContext) -> Result<StepOutcome, AnalysisError> {
            Err(AnalysisError::step_failed(
                StepKind::ExtractDates.description(),
                "clause index out of bounds",
            ))
        }
    }

    /// 越界索引，模拟工作单元内部不变量被破坏
    struct PanickingWork;

    #[async_trait]
    impl StepWork for PanickingWork {
        async fn execute(&self, _ctx: &RunContext) -> Result<StepOutcome, AnalysisError> {
            let clauses: Vec<usize> = Vec::new();
            let idx = clauses.len() + 3;
            let _ = clauses[idx];
            Ok(StepOutcome::Done)
        }
    }

    fn gated_controller(gate: Arc<GateWork>) -> AnalysisController {
        let gateway = Arc::new(BackendGateway::local());
        let pipeline = Pipeline::standard(gateway.clone(), &SimulationSection::instant())
            .with_work(StepKind::ExamineStructure, gate);
        AnalysisController::new(pipeline, gateway)
    }

    #[tokio::test]
    async fn test_local_run_completes() {
        let controller = controller_with(BackendGateway::local());
        let state = controller.analyze(contract()).await.unwrap();

        assert_eq!(state.status, AnalysisStatus::Complete);
        assert!(state.is_consistent());
        assert_eq!(state.thinking_steps.len(), 6);
        assert!(state
            .thinking_steps
            .iter()
            .all(|s| s.status == StepStatus::Complete));
        assert_eq!(state.progress(), 100.0);
        assert_eq!(state.result, Some(fallback_result()));
        assert!(!controller.is_demo_mode());
    }

    #[tokio::test]
    async fn test_submit_while_busy_is_rejected() {
        let gate = GateWork::new();
        let controller = gated_controller(gate.clone());

        let handle = controller.submit(contract()).await.unwrap();
        gate.started.notified().await;

        let err = controller.submit(contract()).await.err().unwrap();
        assert!(matches!(
            err,
            AnalysisError::RunInProgress {
                status: AnalysisStatus::Thinking
            }
        ));

        gate.release.notify_one();
        handle.wait().await;
        let state = controller.snapshot();
        assert_eq!(state.status, AnalysisStatus::Complete);
        assert_eq!(state.file.as_ref().map(|f| f.name.as_str()), Some("contract.pdf"));
    }

    #[tokio::test]
    async fn test_unhandled_fault_ends_in_error() {
        let gateway = Arc::new(BackendGateway::local());
        let pipeline = Pipeline::standard(gateway.clone(), &SimulationSection::instant())
            .with_work(StepKind::ExtractDates, Arc::new(FailingWork));
        let controller = AnalysisController::new(pipeline, gateway);

        let state = controller.analyze(contract()).await.unwrap();
        assert_eq!(state.status, AnalysisStatus::Error);
        assert!(state.is_consistent());
        assert!(state.result.is_none());
        assert!(state
            .error
            .as_deref()
            .unwrap()
            .contains("clause index out of bounds"));

        let statuses: Vec<_> = state.thinking_steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Complete,
                StepStatus::Complete,
                StepStatus::Complete,
                StepStatus::Complete,
                StepStatus::Error,
            ]
        );
    }

    #[tokio::test]
    async fn test_error_state_accepts_new_run() {
        let gateway = Arc::new(BackendGateway::local());
        let pipeline = Pipeline::standard(gateway.clone(), &SimulationSection::instant())
            .with_work(StepKind::Upload, Arc::new(FailingWork));
        let controller = AnalysisController::new(pipeline, gateway);

        let first = controller.analyze(contract()).await.unwrap();
        assert_eq!(first.status, AnalysisStatus::Error);
        assert_eq!(first.thinking_steps.len(), 1);

        // 新运行从干净状态开始，上一轮的步骤不会累积
        let handle = controller.submit(contract()).await.unwrap();
        handle.wait().await;
        let second = controller.snapshot();
        assert_eq!(second.status, AnalysisStatus::Error);
        assert_eq!(second.thinking_steps.len(), 1);
        assert_ne!(first.thinking_steps[0].id, second.thinking_steps[0].id);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let controller = controller_with(BackendGateway::local());
        controller.analyze(contract()).await.unwrap();

        controller.reset().await;
        let once = controller.snapshot();
        controller.reset().await;
        let twice = controller.snapshot();

        assert!(once.is_idle());
        assert!(twice.is_idle());
        assert_eq!(once.status, twice.status);
    }

    #[tokio::test]
    async fn test_stale_run_cannot_touch_new_run() {
        let gate = GateWork::new();
        let controller = gated_controller(gate.clone());

        let stale = controller.submit(contract()).await.unwrap();
        gate.started.notified().await;
        controller.reset().await;

        // 第二次运行不再被 gate 阻塞
        let fresh = controller
            .submit(DocumentFile::new("lease.docx", b"lease".to_vec()))
            .await
            .unwrap();
        assert_ne!(stale.run_id(), fresh.run_id());

        gate.release.notify_one();
        stale.wait().await;
        fresh.wait().await;

        let state = controller.snapshot();
        assert_eq!(state.status, AnalysisStatus::Complete);
        assert_eq!(state.thinking_steps.len(), 6);
        assert_eq!(state.file.as_ref().unwrap().name, "lease.docx");
    }

    #[tokio::test]
    async fn test_remote_result_is_used() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut remote = fallback_result();
        remote.parties.push("Initech Holdings".to_string());
        backend.seed_result(remote.clone()).await;

        let controller = controller_with(BackendGateway::with_backend(backend.clone()));
        let state = controller.analyze(contract()).await.unwrap();

        assert_eq!(state.status, AnalysisStatus::Complete);
        assert_eq!(state.result.as_ref().unwrap().parties.len(), 3);
        assert!(!controller.is_demo_mode());
        // upload + insert + fetch + update
        assert_eq!(backend.call_count(), 4);
    }

    #[tokio::test]
    async fn test_failing_backend_degrades_to_demo_mode() {
        let backend = Arc::new(InMemoryBackend::failing());
        let controller = controller_with(BackendGateway::with_backend(backend.clone()));

        let state = controller.analyze(contract()).await.unwrap();
        assert_eq!(state.status, AnalysisStatus::Complete);
        assert_eq!(state.result, Some(fallback_result()));
        assert!(controller.is_demo_mode());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_observed_states_are_consistent_and_monotonic() {
        let controller = controller_with(BackendGateway::local());
        let mut rx = controller.subscribe();

        let collector = tokio::spawn(async move {
            let mut seen = Vec::new();
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                let done = state.status.is_terminal();
                seen.push(state);
                if done {
                    break;
                }
            }
            seen
        });

        let handle = controller.submit(contract()).await.unwrap();
        handle.wait().await;
        let seen = tokio::time::timeout(Duration::from_secs(5), collector)
            .await
            .unwrap()
            .unwrap();

        assert!(!seen.is_empty());
        let rank = |s: StepStatus| match s {
            StepStatus::Pending => 0,
            StepStatus::InProgress => 1,
            StepStatus::Complete | StepStatus::Error => 2,
        };
        let mut last: std::collections::HashMap<StepId, StepStatus> = Default::default();
        for state in &seen {
            assert!(state.is_consistent());
            for step in &state.thinking_steps {
                if let Some(prev) = last.insert(step.id, step.status) {
                    assert!(rank(step.status) >= rank(prev));
                }
            }
        }
        assert_eq!(seen.last().unwrap().status, AnalysisStatus::Complete);
    }

    #[tokio::test]
    async fn test_panicking_step_ends_in_error() {
        let gateway = Arc::new(BackendGateway::local());
        let pipeline = Pipeline::standard(gateway.clone(), &SimulationSection::instant())
            .with_work(StepKind::ExamineStructure, Arc::new(PanickingWork));
        let controller = AnalysisController::new(pipeline, gateway);

        let state = controller.analyze(contract()).await.unwrap();
        assert_eq!(state.status, AnalysisStatus::Error);
        assert!(state.is_consistent());
        let message = state.error.as_deref().unwrap();
        assert!(message.contains("Examining document structure"));
        assert!(message.contains("panicked"));

        let statuses: Vec<_> = state.thinking_steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Complete, StepStatus::Complete, StepStatus::Error]
        );

        // 不会卡在运行中，可以直接重新提交
        let handle = controller.submit(contract()).await.unwrap();
        handle.wait().await;
        assert_eq!(controller.snapshot().status, AnalysisStatus::Error);
    }

    #[tokio::test]
    async fn test_stale_executor_updates_are_dropped() {
        let gate = GateWork::new();
        let controller = gated_controller(gate.clone());

        let handle = controller.submit(contract()).await.unwrap();
        gate.started.notified().await;
        let in_flight = controller.snapshot().thinking_steps[2].id;
        controller.reset().await;

        let mut rx = controller.subscribe();
        let _ = rx.borrow_and_update();

        // 旧运行的工作在 reset 之后才返回：其修改必须被丢弃
        let stale = RunExecutor {
            shared: controller.shared.clone(),
            pipeline: controller.pipeline.clone(),
            run_id: handle.run_id(),
            cancel: CancellationToken::new(),
        };
        assert!(stale.complete_step(in_flight).await.is_none());
        assert!(stale.begin_step(&controller.pipeline.steps()[3]).await.is_none());
        stale
            .fail(Some(in_flight), AnalysisError::step_failed("late", "late"))
            .await;
        assert!(stale.with_active(|s| s.status = AnalysisStatus::Complete).await.is_none());

        assert!(!rx.has_changed().unwrap());
        assert!(controller.snapshot().is_idle());

        gate.release.notify_one();
        handle.wait().await;
        assert!(controller.snapshot().is_idle());
    }

    #[tokio::test]
    async fn test_active_executor_updates_are_applied() {
        let controller = controller_with(BackendGateway::local());
        let handle = controller.submit(contract()).await.unwrap();
        let run_id = handle.run_id();
        handle.wait().await;

        // 与当前运行 ID 一致时修改生效（对照上面的失效场景）
        let active = RunExecutor {
            shared: controller.shared.clone(),
            pipeline: controller.pipeline.clone(),
            run_id,
            cancel: CancellationToken::new(),
        };
        assert!(active.with_active(|s| s.status).await.is_some());
    }
}
