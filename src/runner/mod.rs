//! The agent loop.
//!
//! [`AgentRunner::run`] takes one user request through a bounded series of
//! provider calls. Each iteration streams a model turn, executes the tool
//! calls it contains one at a time (subject to the agent's policy and the
//! doom-loop detector), persists the assistant message, and decides whether
//! to go round again.

use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::AgentConfig;
use crate::constants::{
    CONTEXT_WINDOW_TOKENS_DEFAULT, DOOM_LOOP_THRESHOLD_DEFAULT, MAX_CONVERSATION_MESSAGES_DEFAULT,
    MAX_ITERATIONS_DEFAULT,
};
use crate::context::ContextManager;
use crate::doom_loop::{DoomLoopDetector, DoomLoopKind};
use crate::error::{ProviderError, RunError};
use crate::history::{project_for_provider, MessageHistory};
use crate::message::{
    check_pairing, IdGenerator, Message, Part, TokenUsage, ToolCallPart, ToolStatus,
};
use crate::output::{OutputChunk, Renderer};
use crate::permissions::{Permission, PermissionPrompter, PermissionRequest};
use crate::provider::{
    self, EventStream, LlmProvider, ProviderEvent, ProviderRequest, RetryPolicy, Summarizer,
};
use crate::session::Session;
use crate::tokens::TokenEstimator;
use crate::tools::{ToolContext, ToolRegistry, ToolResult};

/// Knobs for one runner, usually taken from `[runtime]`.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_iterations: usize,
    pub doom_loop_detection: bool,
    pub doom_loop_threshold: usize,
    /// Token budget for the context sent to the provider.
    pub context_window_tokens: usize,
    /// How many stored messages are loaded at the start of a run.
    pub max_conversation_messages: usize,
    pub estimator: TokenEstimator,
    /// Appended to the agent prompt (`system_prompt` in config).
    pub extra_system_prompt: Option<String>,
    /// Backoff when the provider stream cannot be opened.
    pub retry: RetryPolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS_DEFAULT,
            doom_loop_detection: true,
            doom_loop_threshold: DOOM_LOOP_THRESHOLD_DEFAULT,
            context_window_tokens: CONTEXT_WINDOW_TOKENS_DEFAULT,
            max_conversation_messages: MAX_CONVERSATION_MESSAGES_DEFAULT,
            estimator: TokenEstimator::Chars,
            extra_system_prompt: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The model finished without asking for more tool calls.
    Completed,
    /// The doom-loop detector halted the run.
    DoomLoop(DoomLoopKind),
    /// The iteration bound was reached.
    IterationLimit(usize),
    /// The caller cancelled the run.
    Cancelled,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub stop: StopReason,
    /// Provider calls issued.
    pub iterations: usize,
    /// Tool calls that received a result, including denials.
    pub tool_calls: usize,
}

/// A freshly opened stream and the first event read from it.
type OpenedStream = (EventStream, Option<Result<ProviderEvent, ProviderError>>);

/// How one model turn ended.
enum TurnEnd {
    Stopped(Option<provider::StopReason>),
    Cancelled,
}

/// Drives one agent over one session.
pub struct AgentRunner<'a> {
    session: &'a mut Session,
    agent: &'a AgentConfig,
    provider: &'a dyn LlmProvider,
    tools: &'a ToolRegistry,
    history: &'a MessageHistory,
    prompter: Option<&'a dyn PermissionPrompter>,
    summarizer: Option<&'a dyn Summarizer>,
    settings: RunSettings,
    cancel: CancellationToken,
    /// False once a write failed twice; the rest of the run stays in memory.
    durable: bool,
}

impl<'a> AgentRunner<'a> {
    pub fn new(
        session: &'a mut Session,
        agent: &'a AgentConfig,
        provider: &'a dyn LlmProvider,
        tools: &'a ToolRegistry,
        history: &'a MessageHistory,
    ) -> Self {
        let settings = RunSettings {
            max_iterations: agent.max_iterations,
            ..RunSettings::default()
        };
        Self {
            session,
            agent,
            provider,
            tools,
            history,
            prompter: None,
            summarizer: None,
            settings,
            cancel: CancellationToken::new(),
            durable: true,
        }
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_prompter(mut self, prompter: &'a dyn PermissionPrompter) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn with_summarizer(mut self, summarizer: &'a dyn Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    /// Processes one user request to completion.
    ///
    /// Only transport failures and unreadable history come back as `Err`;
    /// everything else, including denials, doom loops and the iteration
    /// limit, ends as data in the history and a final chunk.
    pub async fn run(
        &mut self,
        request: &str,
        out: &mut dyn Renderer,
    ) -> Result<RunOutcome, RunError> {
        self.durable = true;
        let session_id = self.session.id.clone();

        let mut conversation = self
            .history
            .load(&session_id, self.settings.max_conversation_messages)
            .map_err(|source| RunError::History {
                session: session_id.clone(),
                source,
            })?;
        let mut ids = IdGenerator::after(conversation.last().map(|m| m.id));

        let user = Message::user(ids.next(), &session_id, request);
        self.persist(&user, out);
        conversation.push(user);
        self.session.title_from(request);
        self.touch_session();

        info!(
            session = %self.session.short_id(),
            agent = %self.agent.name,
            provider = self.provider.name(),
            "starting run"
        );

        let tool_defs = self.tools.definitions_for(self.agent);
        let mut context = ContextManager::new(
            self.settings.context_window_tokens,
            self.settings.estimator.clone(),
        );
        let mut detector = self
            .settings
            .doom_loop_detection
            .then(|| DoomLoopDetector::new(self.settings.doom_loop_threshold));
        let mut tool_calls = 0usize;

        for iteration in 1..=self.settings.max_iterations {
            if self.cancel.is_cancelled() {
                out.render(&OutputChunk::Notice("Run cancelled.".into()));
                return Ok(self.outcome(StopReason::Cancelled, iteration - 1, tool_calls));
            }
            debug!(iteration, "iteration start");

            let pruned = context.prune(&conversation);
            let note = context.pruned_note(&pruned.dropped, self.summarizer).await;
            let system = self.system_prompt(note.as_deref());
            let projected = project_for_provider(&pruned.messages);

            let mut assistant = Message::assistant(ids.next(), &session_id, &self.agent.name);
            let provider_request = ProviderRequest {
                system: Some(&system),
                messages: &projected,
                tools: &tool_defs,
            };
            let end = match self.stream_turn(provider_request, &mut assistant, out).await {
                Ok(end) => end,
                Err(e) => {
                    warn!(error = %e, iteration, "provider failed, aborting run");
                    out.render(&OutputChunk::Error(e.to_string()));
                    return Err(e.into());
                }
            };

            let calls: Vec<ToolCallPart> = assistant.tool_calls().cloned().collect();
            let mut cancelled = matches!(end, TurnEnd::Cancelled);
            let mut halted: Option<DoomLoopKind> = None;

            for call in &calls {
                let skipped = halted
                    .as_ref()
                    .map(|kind| format!("Skipped: run halted after a doom loop ({})", kind));
                let (result, status) = if let Some(reason) = skipped {
                    (ToolResult::error(&call.name, reason), ToolStatus::Error)
                } else if cancelled || self.cancel.is_cancelled() {
                    cancelled = true;
                    (
                        ToolResult::error(&call.name, "Cancelled before execution"),
                        ToolStatus::Error,
                    )
                } else {
                    let (result, status, flagged) = self
                        .dispatch(call, &assistant, detector.as_mut(), out)
                        .await;
                    halted = flagged;
                    if self.cancel.is_cancelled() {
                        cancelled = true;
                    }
                    (result, status)
                };

                out.render(&OutputChunk::tool_finished(
                    &call.name,
                    &result.title,
                    result.is_error(),
                    result.error.as_deref().unwrap_or(&result.output),
                ));
                assistant.set_call_status(&call.call_id, status);
                assistant
                    .parts
                    .push(Part::ToolResult(result.into_part(&call.call_id)));
                tool_calls += 1;
            }

            assistant.usage = Some(TokenUsage {
                input: pruned.estimated_tokens,
                output: self.output_tokens(&assistant),
            });
            self.persist(&assistant, out);
            conversation.push(assistant);
            self.touch_session();
            if let Err(call_id) = check_pairing(&conversation) {
                warn!(%call_id, "tool call and result pairing is broken");
            }
            debug!(iteration, calls = calls.len(), "iteration end");

            if let Some(kind) = halted {
                warn!(%kind, "doom loop detected, halting run");
                out.render(&OutputChunk::Notice(format!(
                    "Doom loop detected: {}. Stopping the run.",
                    kind
                )));
                return Ok(self.outcome(StopReason::DoomLoop(kind), iteration, tool_calls));
            }
            if cancelled {
                out.render(&OutputChunk::Notice("Run cancelled.".into()));
                return Ok(self.outcome(StopReason::Cancelled, iteration, tool_calls));
            }

            let wants_more = match end {
                TurnEnd::Stopped(Some(provider::StopReason::EndTurn)) => false,
                TurnEnd::Stopped(Some(provider::StopReason::MaxTokens)) if calls.is_empty() => {
                    out.render(&OutputChunk::Notice(
                        "The response hit the output token limit.".into(),
                    ));
                    false
                }
                _ => !calls.is_empty(),
            };
            if !wants_more {
                return Ok(self.outcome(StopReason::Completed, iteration, tool_calls));
            }
        }

        let limit = self.settings.max_iterations;
        warn!(limit, "iteration limit reached");
        out.render(&OutputChunk::Notice(format!(
            "Iteration limit exceeded: stopped after {} model calls.",
            limit
        )));
        Ok(self.outcome(StopReason::IterationLimit(limit), limit, tool_calls))
    }

    /// Streams one model turn into `assistant`, racing the cancellation token.
    async fn stream_turn(
        &self,
        request: ProviderRequest<'_>,
        assistant: &mut Message,
        out: &mut dyn Renderer,
    ) -> Result<TurnEnd, ProviderError> {
        let Some((mut stream, mut event)) = self.open_stream(request).await? else {
            return Ok(TurnEnd::Cancelled);
        };

        let mut call_index = 0usize;
        loop {
            match event {
                None => {
                    debug!("provider stream ended without a stop event");
                    return Ok(TurnEnd::Stopped(None));
                }
                Some(Err(e)) => return Err(e),
                Some(Ok(ProviderEvent::TextDelta(text))) => {
                    assistant.push_text(&text);
                    out.render(&OutputChunk::Text(text));
                }
                Some(Ok(ProviderEvent::ToolCall { id, name, args })) => {
                    call_index += 1;
                    let call_id = if id.is_empty() {
                        format!("call_{}_{}", assistant.id.0, call_index)
                    } else {
                        id
                    };
                    debug!(tool = %name, %call_id, "tool call received");
                    assistant.parts.push(Part::ToolCall(ToolCallPart {
                        call_id,
                        name,
                        args,
                        status: ToolStatus::Pending,
                    }));
                }
                Some(Ok(ProviderEvent::Stop(reason))) => {
                    debug!(?reason, "provider stop");
                    return Ok(TurnEnd::Stopped(Some(reason)));
                }
            }
            event = tokio::select! {
                ev = stream.next() => ev,
                _ = self.cancel.cancelled() => return Ok(TurnEnd::Cancelled),
            };
        }
    }

    /// Opens the provider stream and reads its first event, retrying
    /// transport failures with backoff while nothing has been received.
    /// `None` means the run was cancelled.
    async fn open_stream(
        &self,
        request: ProviderRequest<'_>,
    ) -> Result<Option<OpenedStream>, ProviderError> {
        let policy = self.settings.retry;
        let mut attempt = 1u32;
        loop {
            let opened = tokio::select! {
                s = self.provider.stream(request) => s,
                _ = self.cancel.cancelled() => return Ok(None),
            };
            let failure = match opened {
                Ok(mut stream) => {
                    let first = tokio::select! {
                        ev = stream.next() => ev,
                        _ = self.cancel.cancelled() => return Ok(None),
                    };
                    match first {
                        Some(Err(e @ ProviderError::Transport(_))) => e,
                        first => return Ok(Some((stream, first))),
                    }
                }
                Err(e) => e,
            };
            if attempt >= policy.max_attempts || !matches!(failure, ProviderError::Transport(_)) {
                return Err(failure);
            }

            let delay = policy.delay(attempt);
            warn!(
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "provider request failed, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return Ok(None),
            }
            attempt += 1;
        }
    }

    /// Runs one tool call through policy, the doom-loop detector and the
    /// registry. The third element is set when the detector flagged the call.
    async fn dispatch(
        &self,
        call: &ToolCallPart,
        assistant: &Message,
        detector: Option<&mut DoomLoopDetector>,
        out: &mut dyn Renderer,
    ) -> (ToolResult, ToolStatus, Option<DoomLoopKind>) {
        let working_dir = PathBuf::from(&self.session.directory);

        if let Some(reason) = self.denial(call, &working_dir) {
            info!(tool = %call.name, %reason, "tool call denied");
            return (
                ToolResult::error(&call.name, reason),
                ToolStatus::Denied,
                None,
            );
        }

        // A terminal prompt blocks the thread, so a Ctrl+C pressed while it
        // was open has only been queued. Let it land before running the call.
        tokio::task::yield_now().await;
        if self.cancel.is_cancelled() {
            return (
                ToolResult::error(&call.name, "Cancelled before execution"),
                ToolStatus::Error,
                None,
            );
        }

        if let Some(detector) = detector {
            if let Some(kind) = detector.record(&call.name, &call.args) {
                let result = ToolResult::error(
                    &call.name,
                    format!(
                        "Doom loop detected: {}. This call was not executed; the run is stopping.",
                        kind
                    ),
                );
                return (result, ToolStatus::Error, Some(kind));
            }
        }

        out.render(&OutputChunk::ToolStarted {
            name: call.name.clone(),
            args: compact_args(&call.args),
        });
        let ctx = ToolContext {
            session_id: self.session.id.clone(),
            message_id: assistant.id,
            call_id: call.call_id.clone(),
            agent: self.agent.name.clone(),
            working_dir,
            cancel: self.cancel.clone(),
        };
        let result = tokio::select! {
            r = self.tools.execute(&call.name, call.args.clone(), &ctx) => r,
            _ = self.cancel.cancelled() => ToolResult::error(&call.name, "Cancelled during execution"),
        };
        let status = if result.is_error() {
            ToolStatus::Error
        } else {
            ToolStatus::Completed
        };
        (result, status, None)
    }

    /// Returns the denial message if policy (or the user) rejects the call.
    fn denial(&self, call: &ToolCallPart, working_dir: &std::path::Path) -> Option<String> {
        match self.agent.check(&call.name, &call.args) {
            Permission::Allow => None,
            Permission::Deny => Some(format!(
                "Permission denied: agent '{}' is not allowed to run {}",
                self.agent.name,
                describe_call(call)
            )),
            Permission::Ask => {
                let Some(prompter) = self.prompter else {
                    return Some(format!(
                        "Permission denied: {} requires confirmation and no one is available to confirm it",
                        describe_call(call)
                    ));
                };
                let request = PermissionRequest {
                    tool: &call.name,
                    args: &call.args,
                    agent: &self.agent.name,
                    working_dir,
                };
                match prompter.confirm(&request) {
                    Ok(decision) if decision.approved() => {
                        debug!(tool = %call.name, ?decision, "tool call approved");
                        None
                    }
                    Ok(decision) => {
                        debug!(tool = %call.name, ?decision, "tool call rejected");
                        Some(format!(
                            "Permission denied: the user rejected {}",
                            describe_call(call)
                        ))
                    }
                    Err(e) => {
                        warn!(error = %e, "permission prompt failed, denying");
                        Some(format!(
                            "Permission denied: confirmation failed ({})",
                            e
                        ))
                    }
                }
            }
        }
    }

    fn system_prompt(&self, pruned_note: Option<&str>) -> String {
        let mut system = self.agent.prompt.clone();
        if let Some(extra) = &self.settings.extra_system_prompt {
            system.push_str("\n\n");
            system.push_str(extra);
        }
        system.push_str(&format!(
            "\n\nWorking directory: {}",
            self.session.directory
        ));
        if let Some(note) = pruned_note {
            system.push_str("\n\n");
            system.push_str(note);
        }
        system
    }

    fn output_tokens(&self, assistant: &Message) -> usize {
        let estimator = &self.settings.estimator;
        assistant
            .parts
            .iter()
            .map(|p| match p {
                Part::Text { text } => estimator.count_text(text),
                Part::ToolCall(call) => estimator.count_text(&call.args.to_string()),
                Part::ToolResult(_) => 0,
            })
            .sum()
    }

    /// Saves a message, retrying once. A second failure switches the rest of
    /// the run to memory only.
    fn persist(&mut self, message: &Message, out: &mut dyn Renderer) {
        if !self.durable {
            return;
        }
        let Err(first) = self.history.save(&self.session.id, message) else {
            return;
        };
        warn!(error = %first, message = %message.id, "saving message failed, retrying");
        if let Err(e) = self.history.save(&self.session.id, message) {
            self.durable = false;
            warn!(error = %e, "history is now in memory only for this run");
            out.render(&OutputChunk::Notice(format!(
                "Could not save conversation history ({}). Continuing without saving.",
                e
            )));
        }
    }

    fn touch_session(&mut self) {
        self.session.touch();
        if !self.durable {
            return;
        }
        if let Err(e) = self.session.save(self.history.storage()) {
            warn!(error = %e, session = %self.session.short_id(), "failed to save session");
        }
    }

    fn outcome(&self, stop: StopReason, iterations: usize, tool_calls: usize) -> RunOutcome {
        info!(?stop, iterations, tool_calls, "run finished");
        RunOutcome {
            stop,
            iterations,
            tool_calls,
        }
    }
}

/// `bash (git push)` or just the tool name.
fn describe_call(call: &ToolCallPart) -> String {
    match call.args.get("command").and_then(Value::as_str) {
        Some(command) => format!("{} ({})", call.name, command),
        None => call.name.clone(),
    }
}

/// One-line argument display for tool-started chunks.
fn compact_args(args: &Value) -> String {
    let text = match args.get("command").and_then(Value::as_str) {
        Some(command) => command.to_string(),
        None => args.to_string(),
    };
    if text.chars().count() > 120 {
        let head: String = text.chars().take(120).collect();
        format!("{}...", head)
    } else {
        text
    }
}
