//! Turn runner - drives one conversational turn
//!
//! ```text
//! RoutingToAgent -> AwaitingModelResponse -> HandlingToolCalls  --+
//!       ^                                  -> HandlingDelegation --+-> Persisting -> StreamingOut -> loop
//!       |                                  -> EmittingText -------+                               -> TurnComplete
//!       +---------------------------------------------------------------------------------------------+
//! ```
//!
//! Every event goes through `record`, which appends it to the session store
//! and only then hands it to the transport. A failed append ends the turn.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;

use super::history::select_history;
use super::orchestrator::Shared;
use super::transport::EventSink;
use super::handle::TurnOutcome;
use crate::agent::AgentDefinition;
use crate::core::{
    Attachment, ErrorKind, Event, EventPayload, OrchestratorError, OrchestratorResult,
    StateDelta, ToolScope, TurnPhase, USER_AUTHOR,
};
use crate::llm::{generate_with_retry, ModelRequest, ModelResponse, ToolCallRequest};
use crate::session::{split_ephemeral, SessionKey, StateScope};
use crate::tools::ToolInvocation;

/// How the loop ended, short of a store failure
enum TurnEnd {
    Completed,
    Failed(String),
}

/// State of one turn in flight
pub(crate) struct TurnRunner {
    shared: Arc<Shared>,
    key: SessionKey,
    turn_id: String,
    sink: EventSink,
    phase: Arc<RwLock<TurnPhase>>,
    /// Agent currently in control
    active: String,
    /// Events from earlier turns
    prior: Vec<Event>,
    /// Events appended during this turn
    current: Vec<Event>,
    /// Session state after the last append, shared registers overlaid
    state: BTreeMap<String, Value>,
    /// Turn-scoped values, never persisted
    temp: StateDelta,
    iterations: usize,
}

impl TurnRunner {
    pub(crate) fn new(
        shared: Arc<Shared>,
        key: SessionKey,
        turn_id: String,
        sink: EventSink,
        phase: Arc<RwLock<TurnPhase>>,
    ) -> Self {
        let active = shared.agents.root_name().to_string();
        Self {
            shared,
            key,
            turn_id,
            sink,
            phase,
            active,
            prior: Vec::new(),
            current: Vec::new(),
            state: BTreeMap::new(),
            temp: StateDelta::new(),
            iterations: 0,
        }
    }

    /// Run the turn to its end
    ///
    /// Always leaves the consumer with a terminal event, persisted or not.
    pub(crate) async fn run(mut self, message: String, attachments: Vec<Attachment>) -> TurnOutcome {
        let final_phase = match self.drive(message, attachments).await {
            Ok(TurnEnd::Completed) => TurnPhase::TurnComplete,
            Ok(TurnEnd::Failed(message)) => TurnPhase::failed(message),
            Err(e) => {
                tracing::error!(
                    session_id = %self.key.session_id,
                    turn_id = %self.turn_id,
                    "[Runner] Turn aborted: {}",
                    e
                );
                let event = Event::error(&self.turn_id, &self.active, e.kind(), e.to_string(), true);
                self.sink.deliver(&event).await;
                TurnPhase::failed(e.to_string())
            }
        };

        self.set_phase(final_phase.clone()).await;

        tracing::info!(
            session_id = %self.key.session_id,
            turn_id = %self.turn_id,
            agent = %self.active,
            appended = self.current.len(),
            "[Runner] Turn finished: {}",
            final_phase
        );

        TurnOutcome {
            turn_id: self.turn_id,
            final_agent: self.active,
            appended: self.current.len(),
            delivered: self.sink.delivered(),
            disconnected: self.sink.is_disconnected(),
            phase: final_phase,
        }
    }

    async fn drive(&mut self, message: String, attachments: Vec<Attachment>) -> OrchestratorResult<TurnEnd> {
        let snapshot = self.shared.store.get(&self.key).await?;
        self.state = snapshot.visible_state();
        self.prior = snapshot.events;
        self.active = self.resume_agent();

        self.set_phase(TurnPhase::routing(&self.active)).await;
        tracing::info!(
            session_id = %self.key.session_id,
            turn_id = %self.turn_id,
            agent = %self.active,
            "[Runner] Starting turn"
        );

        self.record(Event::new(
            &self.turn_id,
            USER_AUTHOR,
            EventPayload::UserMessage {
                text: message,
                attachments,
            },
        ))
        .await?;

        let history = select_history(&self.prior, self.shared.config.history_window);
        let mut visited: HashSet<String> = HashSet::from([self.active.clone()]);
        let mut offer_transfers = true;

        loop {
            if self.iterations >= self.shared.config.max_iterations {
                let message = format!(
                    "Turn exceeded {} model invocations",
                    self.shared.config.max_iterations
                );
                tracing::error!(turn_id = %self.turn_id, "[Runner] {}", message);
                self.record_error(ErrorKind::Orchestration, &message, true).await?;
                return Ok(TurnEnd::Failed(message));
            }
            self.iterations += 1;

            let Some(agent) = self.shared.agents.get(&self.active).cloned() else {
                // Only reachable through a registry/log mismatch
                let message = format!("Active agent '{}' is not defined", self.active);
                self.record_error(ErrorKind::Orchestration, &message, true).await?;
                return Ok(TurnEnd::Failed(message));
            };

            self.set_phase(TurnPhase::routing(&agent.name)).await;
            let request = self.build_request(&agent, &history, offer_transfers);

            self.set_phase(TurnPhase::awaiting_model(&agent.name, self.iterations)).await;
            let policy = self.shared.config.retry_policy();
            let response = match generate_with_retry(self.shared.backend.as_ref(), &request, &policy).await {
                Ok(response) => response,
                Err(e) => {
                    self.record_error(e.kind(), &e.to_string(), true).await?;
                    return Ok(TurnEnd::Failed(e.to_string()));
                }
            };

            match response {
                ModelResponse::Text {
                    text,
                    release_control,
                } => {
                    self.set_phase(TurnPhase::EmittingText).await;
                    self.emit_text(&agent, text, release_control).await?;
                    return Ok(TurnEnd::Completed);
                }
                ModelResponse::ToolCalls { calls } => {
                    self.set_phase(TurnPhase::HandlingToolCalls { count: calls.len() }).await;
                    self.handle_tool_calls(&agent, calls).await?;
                }
                ModelResponse::Transfer { target } => {
                    self.set_phase(TurnPhase::delegating(&agent.name, &target)).await;
                    let resolved = self
                        .shared
                        .agents
                        .resolve_transfer(&agent.name, &target)
                        .and_then(|to| {
                            if visited.contains(&to.name) {
                                Err(OrchestratorError::routing(
                                    &agent.name,
                                    &target,
                                    "agent already active in this turn",
                                ))
                            } else {
                                Ok(to.name.clone())
                            }
                        });

                    match resolved {
                        Ok(to) => {
                            tracing::info!(
                                turn_id = %self.turn_id,
                                "[Runner] Delegating {} -> {}",
                                agent.name,
                                to
                            );
                            self.record(Event::new(
                                &self.turn_id,
                                &agent.name,
                                EventPayload::Delegation {
                                    from: agent.name.clone(),
                                    to: to.clone(),
                                },
                            ))
                            .await?;
                            visited.insert(to.clone());
                            self.active = to;
                            offer_transfers = true;
                        }
                        Err(e) => {
                            tracing::warn!(turn_id = %self.turn_id, "[Runner] {}", e);
                            self.record_error(ErrorKind::Routing, &e.to_string(), false).await?;
                            // Fall back to the same agent answering without transfer options
                            offer_transfers = false;
                        }
                    }
                }
            }
        }
    }

    /// Agent the turn starts with
    ///
    /// The last completion marker decides: a sticky completion resumes its
    /// agent, anything else starts at the root. A turn that ended after a
    /// delegation without completing resumes the delegate.
    fn resume_agent(&self) -> String {
        let root = self.shared.agents.root_name();

        let candidate = self.prior.iter().rev().find_map(|event| match &event.payload {
            EventPayload::TurnComplete { agent, sticky } => {
                Some(if *sticky { agent.as_str() } else { root })
            }
            EventPayload::Delegation { to, .. } => Some(to.as_str()),
            _ => None,
        });

        match candidate {
            Some(name) if self.shared.agents.contains(name) => name.to_string(),
            Some(name) => {
                tracing::warn!(
                    session_id = %self.key.session_id,
                    "[Runner] Resumed agent '{}' no longer exists; starting at root",
                    name
                );
                root.to_string()
            }
            None => root.to_string(),
        }
    }

    fn build_request(&self, agent: &AgentDefinition, history: &[Event], offer_transfers: bool) -> ModelRequest {
        let rendered = self
            .shared
            .renderer
            .render(&agent.name, &agent.instruction, &self.visible_state());

        let transfer_targets = if offer_transfers {
            self.shared.agents.transfer_offers(&agent.name)
        } else {
            Vec::new()
        };

        ModelRequest {
            agent: agent.name.clone(),
            instruction: rendered.text,
            tools: self.shared.tools.definitions_for(&agent.tools),
            transfer_targets,
            // Windowed earlier turns, then this turn in full
            history: history.iter().chain(self.current.iter()).cloned().collect(),
        }
    }

    /// Session state with the turn's `temp:` overlay
    fn visible_state(&self) -> BTreeMap<String, Value> {
        let mut state = self.state.clone();
        state.extend(self.temp.iter().map(|(k, v)| (k.clone(), v.clone())));
        state
    }

    async fn emit_text(&mut self, agent: &AgentDefinition, text: String, release_control: bool) -> OrchestratorResult<()> {
        self.record(Event::new(
            &self.turn_id,
            &agent.name,
            EventPayload::Text { text: text.clone() },
        ))
        .await?;

        if let Some(key) = agent.output_state_key() {
            if agent.output_scope == StateScope::Temp {
                self.temp.insert(key, Value::String(text));
            } else {
                let mut delta = StateDelta::new();
                delta.insert(key, Value::String(text));
                self.record(Event::new(
                    &self.turn_id,
                    &agent.name,
                    EventPayload::StateDelta { delta },
                ))
                .await?;
            }
        }

        let sticky = agent.name != self.shared.agents.root_name() && !release_control;
        self.record(Event::new(
            &self.turn_id,
            &agent.name,
            EventPayload::TurnComplete {
                agent: agent.name.clone(),
                sticky,
            },
        ))
        .await?;
        Ok(())
    }

    async fn handle_tool_calls(&mut self, agent: &AgentDefinition, calls: Vec<ToolCallRequest>) -> OrchestratorResult<()> {
        if calls.is_empty() {
            return self
                .record_error(ErrorKind::Orchestration, "Model returned an empty tool call list", false)
                .await;
        }

        for call in &calls {
            self.record(Event::new(
                &self.turn_id,
                &agent.name,
                EventPayload::ToolCall {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    args: call.args.clone(),
                },
            ))
            .await?;
        }

        let scope = ToolScope {
            app_name: self.key.app_name.clone(),
            user_id: self.key.user_id.clone(),
            session_id: self.key.session_id.clone(),
            turn_id: self.turn_id.clone(),
            agent: agent.name.clone(),
            state: Arc::new(self.visible_state()),
            resources: self.shared.resources.clone(),
        };

        let tools = &self.shared.tools;
        let invocations = join_all(calls.iter().map(|call| {
            let scope = scope.clone();
            async move {
                if agent.tools.contains(&call.name) {
                    tools.invoke(scope, call).await
                } else {
                    ToolInvocation {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        args: call.args.clone(),
                        outcome: Err(OrchestratorError::UnknownTool(call.name.clone())),
                        state_delta: StateDelta::new(),
                    }
                }
            }
        }))
        .await;

        for invocation in invocations {
            if let Err(e) = &invocation.outcome {
                tracing::warn!(
                    turn_id = %self.turn_id,
                    agent = %agent.name,
                    tool = %invocation.tool_name,
                    "[Runner] Tool call failed: {}",
                    e
                );
            }

            self.record(Event::new(
                &self.turn_id,
                &agent.name,
                EventPayload::ToolResult {
                    call_id: invocation.call_id.clone(),
                    name: invocation.tool_name.clone(),
                    result: invocation.result_value(),
                    is_error: invocation.is_error(),
                },
            ))
            .await?;

            let (persisted, ephemeral) = split_ephemeral(invocation.state_delta);
            self.temp.extend(ephemeral);
            if !persisted.is_empty() {
                self.record(Event::new(
                    &self.turn_id,
                    &agent.name,
                    EventPayload::StateDelta { delta: persisted },
                ))
                .await?;
            }
        }

        Ok(())
    }

    async fn record_error(&mut self, kind: ErrorKind, message: &str, fatal: bool) -> OrchestratorResult<()> {
        let event = Event::error(&self.turn_id, &self.active, kind, message, fatal);
        self.record(event).await
    }

    /// Persist, then stream
    async fn record(&mut self, event: Event) -> OrchestratorResult<()> {
        self.set_phase(TurnPhase::Persisting).await;
        let appended = self.shared.store.append(&self.key, event).await?;

        self.state = appended.visible_state();
        self.current.push(appended.event.clone());

        self.set_phase(TurnPhase::StreamingOut).await;
        self.sink.deliver(&appended.event).await;
        Ok(())
    }

    async fn set_phase(&self, phase: TurnPhase) {
        tracing::trace!(turn_id = %self.turn_id, "[Runner] Phase: {}", phase);
        *self.phase.write().await = phase;
    }
}
