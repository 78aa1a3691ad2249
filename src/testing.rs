//! Scripted collaborators for exercising the worker without external systems
//!
//! `Harness` bundles one of each with an in-memory `MockSystem` and an
//! `EventCapture`, so a test can run the supervisor (or a single component)
//! and inspect every observable effect afterwards.

use crate::authority::{AuthorityError, DecisionAuthority};
use crate::config::ContentManagementPolicy;
use crate::core::{
    Collaborators, EscalationPolicy, EscalationVerdict, EventSequencer, FileCategory,
    OutputFence, ProcessingSupervisor, WorkItem,
};
use crate::engine::{self, CdrEngine, EngineError};
use crate::messaging::{self, ArchiveChannel, ArchiveRequest, OutcomeChannel, OutcomeMessage};
use crate::report::{ReportError, ReportRenderer};
use crate::system::MockSystem;
use async_trait::async_trait;
use cdr_observability::EventCapture;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Unit of work reading `/in/<file_id>` and writing `/out/<file_id>`
///
/// Both policy actions are `block`, no report, 60 second deadline.
pub fn work_item(file_id: &str) -> WorkItem {
    WorkItem {
        file_id: file_id.to_string(),
        policy_id: "policy-1".to_string(),
        input_path: PathBuf::from(format!("/in/{}", file_id)),
        output_path: PathBuf::from(format!("/out/{}", file_id)),
        reply_to: "outcomes".to_string(),
        content_management: ContentManagementPolicy::default(),
        escalation: EscalationPolicy::default(),
        generate_report: false,
        deadline: Duration::from_secs(60),
        timestamp: Utc::now(),
    }
}

/// Engine whose answers are fixed up front
#[derive(Clone)]
pub struct ScriptedEngine {
    file_type: Result<String, String>,
    analysis: Result<String, String>,
    rebuild: Result<Option<Vec<u8>>, String>,
    rebuild_delay: Option<Duration>,
    panic_on_rebuild: bool,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self {
            file_type: Ok("Docx".to_string()),
            analysis: Ok("<analysis/>".to_string()),
            rebuild: Ok(Some(b"rebuilt".to_vec())),
            rebuild_delay: None,
            panic_on_rebuild: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ScriptedEngine {
    /// Detects `Docx`, analyses to `<analysis/>`, rebuilds to `rebuilt`
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_type(mut self, file_type: &str) -> Self {
        self.file_type = Ok(file_type.to_string());
        self
    }

    pub fn detect_error(mut self, message: &str) -> Self {
        self.file_type = Err(message.to_string());
        self
    }

    pub fn analysis(mut self, report: &str) -> Self {
        self.analysis = Ok(report.to_string());
        self
    }

    pub fn analysis_error(mut self, message: &str) -> Self {
        self.analysis = Err(message.to_string());
        self
    }

    pub fn rebuilds_to(mut self, artifact: &[u8]) -> Self {
        self.rebuild = Ok(Some(artifact.to_vec()));
        self
    }

    /// Rebuild yields no artifact
    pub fn refuses(mut self) -> Self {
        self.rebuild = Ok(None);
        self
    }

    pub fn rebuild_error(mut self, message: &str) -> Self {
        self.rebuild = Err(message.to_string());
        self
    }

    /// Stall the rebuild before answering
    pub fn rebuild_delay(mut self, delay: Duration) -> Self {
        self.rebuild_delay = Some(delay);
        self
    }

    pub fn panic_on_rebuild(mut self) -> Self {
        self.panic_on_rebuild = true;
        self
    }

    /// Engine operations invoked so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl CdrEngine for ScriptedEngine {
    async fn version(&self) -> engine::Result<String> {
        self.record("version");
        Ok("scripted-1.0".to_string())
    }

    async fn detect_type(&self, _data: &[u8]) -> engine::Result<String> {
        self.record("detect");
        self.file_type.clone().map_err(EngineError::Failed)
    }

    async fn analyse(
        &self,
        _policy: &ContentManagementPolicy,
        _file_type: &str,
        _data: &[u8],
    ) -> engine::Result<String> {
        self.record("analyse");
        self.analysis.clone().map_err(EngineError::Failed)
    }

    async fn rebuild(
        &self,
        _policy: &ContentManagementPolicy,
        _file_type: &str,
        _data: &[u8],
    ) -> engine::Result<Option<Vec<u8>>> {
        self.record("rebuild");
        if let Some(delay) = self.rebuild_delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on_rebuild {
            panic!("scripted engine crash");
        }
        self.rebuild.clone().map_err(EngineError::Failed)
    }
}

/// Decision authority with a fixed verdict, or permanently unavailable
#[derive(Clone)]
pub struct ScriptedAuthority {
    verdict: Option<EscalationVerdict>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedAuthority {
    pub fn verdict(verdict: EscalationVerdict) -> Self {
        Self {
            verdict: Some(verdict),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every call fails with HTTP 503
    pub fn unavailable() -> Self {
        Self {
            verdict: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests().len()
    }

    /// `(base64 payload, detected type)` of every call
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DecisionAuthority for ScriptedAuthority {
    async fn decide(
        &self,
        base64_payload: &str,
        category: &FileCategory,
    ) -> Result<EscalationVerdict, AuthorityError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((base64_payload.to_string(), category.type_name().to_string()));
        }
        self.verdict.clone().ok_or(AuthorityError::Status(503))
    }
}

/// Outcome and archive channel that keeps every message
#[derive(Clone, Default)]
pub struct RecordingChannel {
    outcomes: Arc<Mutex<Vec<OutcomeMessage>>>,
    archives: Arc<Mutex<Vec<ArchiveRequest>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<OutcomeMessage> {
        self.outcomes.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn archive_requests(&self) -> Vec<ArchiveRequest> {
        self.archives.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Outcome messages plus archive hand-offs
    pub fn terminal_calls(&self) -> usize {
        self.outcomes().len() + self.archive_requests().len()
    }
}

impl OutcomeChannel for RecordingChannel {
    fn send(&self, message: &OutcomeMessage) -> messaging::Result<()> {
        self.outcomes
            .lock()
            .map_err(|_| messaging::ChannelError::Poisoned)?
            .push(message.clone());
        Ok(())
    }
}

impl ArchiveChannel for RecordingChannel {
    fn send(&self, request: &ArchiveRequest) -> messaging::Result<()> {
        self.archives
            .lock()
            .map_err(|_| messaging::ChannelError::Poisoned)?
            .push(request.clone());
        Ok(())
    }
}

/// Renderer returning fixed bytes
#[derive(Debug, Clone)]
pub struct StaticRenderer {
    report: Vec<u8>,
}

impl StaticRenderer {
    pub fn new(report: &[u8]) -> Self {
        Self {
            report: report.to_vec(),
        }
    }

    pub fn report(&self) -> &[u8] {
        &self.report
    }
}

impl Default for StaticRenderer {
    fn default() -> Self {
        Self::new(b"<html>report</html>")
    }
}

impl ReportRenderer for StaticRenderer {
    fn render(&self, _file_id: &str) -> Result<Vec<u8>, ReportError> {
        Ok(self.report.clone())
    }
}

/// One of each scripted collaborator, wired together
pub struct Harness {
    pub storage: MockSystem,
    pub engine: ScriptedEngine,
    pub authority: ScriptedAuthority,
    pub events: EventCapture,
    pub channel: RecordingChannel,
    pub renderer: StaticRenderer,
    pub collaborators: Collaborators,
}

impl Harness {
    /// Default engine and an authority that answers `relay`
    pub fn new() -> Self {
        Self::from_parts(
            ScriptedEngine::new(),
            ScriptedAuthority::verdict(EscalationVerdict::Relay),
        )
    }

    pub fn with_engine(engine: ScriptedEngine) -> Self {
        Self::from_parts(engine, ScriptedAuthority::verdict(EscalationVerdict::Relay))
    }

    pub fn with_authority(authority: ScriptedAuthority) -> Self {
        Self::from_parts(ScriptedEngine::new(), authority)
    }

    pub fn from_parts(engine: ScriptedEngine, authority: ScriptedAuthority) -> Self {
        let storage = MockSystem::new();
        let events = EventCapture::new();
        let channel = RecordingChannel::new();
        let renderer = StaticRenderer::default();

        let collaborators = Collaborators {
            storage: Arc::new(storage.clone()),
            engine: Arc::new(engine.clone()),
            authority: Some(Arc::new(authority.clone())),
            events: Arc::new(events.clone()),
            outcomes: Arc::new(channel.clone()),
            archives: Arc::new(channel.clone()),
            renderer: Arc::new(renderer.clone()),
        };

        Self {
            storage,
            engine,
            authority,
            events,
            channel,
            renderer,
            collaborators,
        }
    }

    pub fn supervisor(&self) -> ProcessingSupervisor {
        ProcessingSupervisor::new(self.collaborators.clone())
    }

    /// Sequencer and fence for driving a single component directly
    pub fn run_parts(&self, item: &WorkItem) -> (EventSequencer, OutputFence) {
        (
            EventSequencer::new(item, self.collaborators.events.clone(), CancellationToken::new()),
            OutputFence::new(),
        )
    }

    /// Bytes the harness renderer produces
    pub fn report_bytes(&self) -> Vec<u8> {
        self.renderer.report().to_vec()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
