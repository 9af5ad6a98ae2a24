//! 分析工作流集成测试

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use docsense::analysis::*;
    use docsense::backend::{BackendGateway, DegradedMode, InMemoryBackend, RemoteBackend};
    use docsense::config::{AppConfig, SimulationSection};
    use docsense::{AnalysisError, AnalysisStatus};
    use tokio::sync::Notify;

    const LABELS: [&str; 6] = [
        "Uploading document to secure storage",
        "Initializing document analysis",
        "Examining document structure",
        "Identifying parties and signatories",
        "Extracting dates and key clauses",
        "Generating summary and analysis",
    ];

    fn contract() -> DocumentFile {
        DocumentFile::new("contract.pdf", b"%PDF-1.7 master services agreement".to_vec())
    }

    fn instant_controller(gateway: BackendGateway) -> AnalysisController {
        let gateway = Arc::new(gateway);
        let pipeline = Pipeline::standard(gateway.clone(), &SimulationSection::instant());
        AnalysisController::new(pipeline, gateway)
    }

    /// 阻塞直到测试放行；finished 记录放行后是否真的执行完
    struct LateWork {
        started: Notify,
        release: Notify,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl StepWork for LateWork {
        async fn execute(&self, _ctx: &RunContext) -> Result<StepOutcome, AnalysisError> {
            self.started.notify_one();
            self.release.notified().await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(StepOutcome::Done)
        }
    }

    #[tokio::test]
    async fn test_contract_without_backend() {
        let controller = instant_controller(BackendGateway::local());
        let state = controller.analyze(contract()).await.unwrap();

        assert_eq!(state.status, AnalysisStatus::Complete);
        assert!(state.error.is_none());
        let result = state.result.as_ref().unwrap();
        assert_eq!(result.parties.len(), 2);
        assert_eq!(result.clauses.len(), 3);
        assert_eq!(result.signatures.len(), 2);
        assert_eq!(state.thinking_steps.len(), 6);
        assert!(state
            .thinking_steps
            .iter()
            .all(|s| s.status == StepStatus::Complete));

        let labels: Vec<_> = state
            .thinking_steps
            .iter()
            .map(|s| s.description.as_str())
            .collect();
        assert_eq!(labels, LABELS.to_vec());
    }

    #[tokio::test]
    async fn test_labels_do_not_depend_on_backend() {
        let healthy = Arc::new(InMemoryBackend::new());
        let broken = Arc::new(InMemoryBackend::failing());
        let gateways = vec![
            BackendGateway::local(),
            BackendGateway::with_backend(healthy),
            BackendGateway::with_backend(broken),
        ];

        for gateway in gateways {
            let controller = instant_controller(gateway);
            let state = controller.analyze(contract()).await.unwrap();
            assert_eq!(state.status, AnalysisStatus::Complete);
            let labels: Vec<_> = state
                .thinking_steps
                .iter()
                .map(|s| s.description.as_str())
                .collect();
            assert_eq!(labels, LABELS.to_vec());
        }
    }

    #[tokio::test]
    async fn test_failing_backend_still_completes() {
        let backend = Arc::new(InMemoryBackend::failing());
        let controller = instant_controller(BackendGateway::with_backend(backend));

        let state = controller.analyze(contract()).await.unwrap();
        assert_eq!(state.status, AnalysisStatus::Complete);
        assert!(state.result.as_ref().unwrap().validate().is_ok());
        assert!(controller.is_demo_mode());
    }

    #[tokio::test]
    async fn test_degraded_flag_shared_across_controllers() {
        let mode = DegradedMode::new();
        let broken: Arc<dyn RemoteBackend> = Arc::new(InMemoryBackend::failing());
        let first = instant_controller(BackendGateway::new(Some(broken), mode.clone()));
        first.analyze(contract()).await.unwrap();
        assert!(mode.is_degraded());

        let healthy = Arc::new(InMemoryBackend::new());
        let remote: Arc<dyn RemoteBackend> = healthy.clone();
        let second = instant_controller(BackendGateway::new(Some(remote), mode));
        let state = second.analyze(contract()).await.unwrap();
        assert_eq!(state.status, AnalysisStatus::Complete);
        assert!(second.is_demo_mode());
        assert_eq!(healthy.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_mid_run() {
        let late = Arc::new(LateWork {
            started: Notify::new(),
            release: Notify::new(),
            finished: AtomicUsize::new(0),
        });
        let gateway = Arc::new(BackendGateway::local());
        let pipeline = Pipeline::standard(gateway.clone(), &SimulationSection::instant())
            .with_work(StepKind::ExamineStructure, late.clone());
        let controller = AnalysisController::new(pipeline, gateway);

        let handle = controller.submit(contract()).await.unwrap();
        late.started.notified().await;

        let mid = controller.snapshot();
        assert_eq!(mid.status, AnalysisStatus::Thinking);
        assert_eq!(mid.completed_steps(), 2);

        controller.reset().await;
        late.release.notify_one();
        handle.wait().await;

        let state = controller.snapshot();
        assert_eq!(state.status, AnalysisStatus::Idle);
        assert!(state.file.is_none());
        assert!(state.thinking_steps.is_empty());
        assert!(state.result.is_none());
        assert!(state.error.is_none());
        assert!(state.is_idle());

        // reset 取消了被放弃运行的等待，迟到的工作不会继续执行
        assert_eq!(late.finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_twice_equals_once() {
        let controller = instant_controller(BackendGateway::local());
        controller.analyze(contract()).await.unwrap();

        controller.reset().await;
        let once = serde_json::to_value(controller.snapshot()).unwrap();
        controller.reset().await;
        let twice = serde_json::to_value(controller.snapshot()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once["status"], "idle");
    }

    #[tokio::test]
    async fn test_controller_from_config() {
        let cfg = AppConfig {
            simulation: SimulationSection::instant(),
            ..AppConfig::default()
        };
        let controller = AnalysisController::from_config(&cfg, DegradedMode::new());
        assert!(!controller.gateway().is_configured());

        let state = controller.analyze(contract()).await.unwrap();
        assert_eq!(state.status, AnalysisStatus::Complete);
        assert_eq!(state.progress(), 100.0);
        assert!(!controller.is_demo_mode());
    }

    #[tokio::test]
    async fn test_state_serialization_shape() {
        let controller = instant_controller(BackendGateway::local());
        let state = controller.analyze(contract()).await.unwrap();
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["status"], "complete");
        assert_eq!(json["file"]["name"], "contract.pdf");
        assert!(json["file"].get("content").is_none());
        assert_eq!(json["thinkingSteps"][0]["status"], "complete");
        assert_eq!(json["result"]["keyDates"].as_array().unwrap().len(), 3);
        assert!(json["error"].is_null());
    }
}
