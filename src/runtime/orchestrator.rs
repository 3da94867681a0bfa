//! Orchestrator - Accepts turns and runs them as tokio tasks
//!
//! The `Orchestrator` is responsible for:
//! - Validating the agent tree against the tool registry at construction
//! - Enforcing one running turn per session (reject or queue)
//! - Spawning each turn so a client disconnect never cancels it
//! - Handing back the turn's event stream and a handle to observe it

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::channels::create_event_channel;
use super::handle::{TurnHandle, TurnOutcome};
use super::runner::TurnRunner;
use super::transport::{EventSink, TurnStream};
use crate::agent::{AgentRegistry, BusyPolicy, InstructionRenderer, OrchestratorConfig};
use crate::core::{
    Attachment, ErrorKind, Event, OrchestratorError, OrchestratorResult, ResourceMap, TurnPhase,
};
use crate::llm::ModelBackend;
use crate::session::{SessionKey, SessionSnapshot, SessionStore};
use crate::tools::ToolRegistry;

/// One inbound user turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Application namespace
    pub app_name: String,
    /// Owning user
    pub user_id: String,
    /// Target session
    pub session_id: String,
    /// User message text
    pub message: String,
    /// Optional attachments
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl TurnRequest {
    /// Create a text-only request
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            message: message.into(),
            attachments: Vec::new(),
        }
    }

    /// Attach a file
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Key of the target session
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(&self.app_name, &self.user_id, &self.session_id)
    }
}

/// Everything a turn needs, shared read-only by all turns
pub(crate) struct Shared {
    pub(crate) config: OrchestratorConfig,
    pub(crate) agents: AgentRegistry,
    pub(crate) tools: ToolRegistry,
    pub(crate) backend: Arc<dyn ModelBackend>,
    pub(crate) store: Arc<SessionStore>,
    pub(crate) resources: Arc<ResourceMap>,
    pub(crate) renderer: InstructionRenderer,
}

type Lease = Arc<Mutex<()>>;

/// Builder for an `Orchestrator`
///
/// ```ignore
/// let orchestrator = Orchestrator::builder()
///     .config(OrchestratorConfig::default())
///     .agents(AgentTreeConfig::from_file("agents.json")?.build()?)
///     .tools(tools)
///     .backend(Arc::new(my_backend))
///     .resource(warehouse)
///     .build()?;
/// ```
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    agents: Option<AgentRegistry>,
    tools: ToolRegistry,
    backend: Option<Arc<dyn ModelBackend>>,
    store: Option<Arc<SessionStore>>,
    resources: ResourceMap,
}

impl OrchestratorBuilder {
    /// Set the configuration
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the agent tree
    pub fn agents(mut self, agents: AgentRegistry) -> Self {
        self.agents = Some(agents);
        self
    }

    /// Set the tool registry
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Set the model backend
    pub fn backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the session store (defaults to an in-memory store)
    pub fn store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Add a site resource visible to every tool call
    pub fn resource<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.resources.insert(value);
        self
    }

    /// Set all site resources
    pub fn resources(mut self, resources: ResourceMap) -> Self {
        self.resources = resources;
        self
    }

    /// Validate and build
    pub fn build(self) -> OrchestratorResult<Orchestrator> {
        self.config.validate()?;

        let agents = self
            .agents
            .ok_or_else(|| OrchestratorError::config("No agent tree configured"))?;
        let backend = self
            .backend
            .ok_or_else(|| OrchestratorError::config("No model backend configured"))?;
        agents.validate_tools(&self.tools)?;

        let tools = self.tools.with_call_timeout(self.config.tool_timeout());
        let store = self.store.unwrap_or_else(|| Arc::new(SessionStore::in_memory()));

        tracing::info!(
            "[Orchestrator] Ready: {} agent(s), {} tool(s), backend '{}', busy policy {:?}",
            agents.len(),
            tools.len(),
            backend.name(),
            self.config.busy_policy
        );

        Ok(Orchestrator {
            shared: Arc::new(Shared {
                config: self.config,
                agents,
                tools,
                backend,
                store,
                resources: Arc::new(self.resources),
                renderer: InstructionRenderer::new()?,
            }),
            leases: Arc::new(RwLock::new(HashMap::new())),
        })
    }
}

/// Runs conversational turns against a fixed agent tree
///
/// Constructed once at process start and shared by reference; clones share
/// the same store and session leases.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
    /// One lease per session with a turn running or queued
    leases: Arc<RwLock<HashMap<SessionKey, Lease>>>,
}

impl Orchestrator {
    /// Start building an orchestrator
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// The configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// The agent tree
    pub fn agents(&self) -> &AgentRegistry {
        &self.shared.agents
    }

    /// The session store
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.shared.store
    }

    /// Read a session; clients call this after reconnecting
    pub async fn session(&self, key: &SessionKey) -> OrchestratorResult<SessionSnapshot> {
        if self.shared.store.exists(key).await {
            self.shared.store.get(key).await
        } else {
            Err(OrchestratorError::SessionNotFound(key.session_id.clone()))
        }
    }

    /// Submit a turn
    ///
    /// Fails with `SessionNotFound` or `SessionBusy` before any turn work
    /// begins. Otherwise the turn runs to completion on its own task whether
    /// or not the returned stream is consumed.
    pub async fn submit(&self, request: TurnRequest) -> OrchestratorResult<(TurnStream, TurnHandle)> {
        let key = request.session_key();
        let store = &self.shared.store;

        if self.shared.config.create_sessions {
            store.create(&key).await?;
        } else if !store.exists(&key).await {
            return Err(OrchestratorError::SessionNotFound(key.session_id.clone()));
        }

        let lease = self.lease_for(&key).await;
        // Taken here when free, so queued turns run in submission order
        let held = match lease.clone().try_lock_owned() {
            Ok(guard) => Some(guard),
            Err(_) if self.shared.config.busy_policy == BusyPolicy::Reject => {
                tracing::info!(session = %key, "[Orchestrator] Rejecting turn: session busy");
                drop(lease);
                self.release_lease(&key).await;
                return Err(OrchestratorError::SessionBusy(key.session_id.clone()));
            }
            Err(_) => {
                tracing::info!(session = %key, "[Orchestrator] Queueing turn behind running turn");
                None
            }
        };

        let turn_id = format!("turn_{}", uuid::Uuid::new_v4().simple());
        let (tx, rx) = create_event_channel(self.shared.config.stream_buffer);
        let cancel = CancellationToken::new();
        let stream = TurnStream::new(&turn_id, rx, cancel.clone());
        let phase = Arc::new(RwLock::new(TurnPhase::Queued));

        let fallback_tx = tx.clone();
        let runner = TurnRunner::new(
            self.shared.clone(),
            key.clone(),
            turn_id.clone(),
            EventSink::new(tx, cancel.clone()),
            phase.clone(),
        );

        let orchestrator = self.clone();
        let task_key = key.clone();
        let task_turn_id = turn_id.clone();
        let task_phase = phase.clone();
        let TurnRequest {
            message,
            attachments,
            ..
        } = request;

        let task = tokio::spawn(async move {
            let guard = match held {
                Some(guard) => guard,
                None => lease.clone().lock_owned().await,
            };
            drop(lease);

            let result = AssertUnwindSafe(runner.run(message, attachments))
                .catch_unwind()
                .await;

            drop(guard);
            orchestrator.release_lease(&task_key).await;

            match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::error!(session = %task_key, turn_id = %task_turn_id, "[Orchestrator] Turn panicked");
                    let message = "turn aborted by an internal error";
                    let event = Event::error(&task_turn_id, "orchestrator", ErrorKind::Orchestration, message, true);
                    let disconnected = cancel.is_cancelled() || fallback_tx.send(event).await.is_err();
                    *task_phase.write().await = TurnPhase::failed(message);
                    TurnOutcome {
                        turn_id: task_turn_id,
                        final_agent: String::new(),
                        appended: 0,
                        delivered: 0,
                        disconnected,
                        phase: TurnPhase::failed(message),
                    }
                }
            }
        });

        tracing::debug!(session = %key, turn_id = %turn_id, "[Orchestrator] Turn submitted");
        Ok((stream, TurnHandle::new(turn_id, key, phase, task)))
    }

    /// Submit a turn and drain its stream
    pub async fn run_turn(&self, request: TurnRequest) -> OrchestratorResult<(Vec<Event>, TurnOutcome)> {
        let (stream, handle) = self.submit(request).await?;
        let events = stream.collect_all().await;
        let outcome = handle.join().await?;
        Ok((events, outcome))
    }

    /// Check whether a session has a turn running or queued
    pub async fn is_busy(&self, key: &SessionKey) -> bool {
        self.leases.read().await.contains_key(key)
    }

    /// Leases are only cloned under the write lock, so a count of one means
    /// nobody else holds or waits on it
    async fn lease_for(&self, key: &SessionKey) -> Lease {
        let mut leases = self.leases.write().await;
        leases.entry(key.clone()).or_default().clone()
    }

    async fn release_lease(&self, key: &SessionKey) {
        let mut leases = self.leases.write().await;
        if let Some(lease) = leases.get(key) {
            if Arc::strong_count(lease) == 1 {
                leases.remove(key);
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("agents", &self.shared.agents.len())
            .field("tools", &self.shared.tools)
            .field("config", &self.shared.config)
            .finish()
    }
}
