//! Everything one `kiri run` or `kiri chat` needs, assembled once.

use anyhow::{Context, Result};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::RunOptions;
use crate::agent::AgentConfig;
use crate::config::Config;
use crate::history::MessageHistory;
use crate::output::StdoutRenderer;
use crate::permissions::{AutoApprove, PermissionPrompter, TerminalPrompter};
use crate::provider::{self, RigProvider};
use crate::runner::{AgentRunner, RunOutcome, RunSettings};
use crate::session::Session;
use crate::storage::Storage;
use crate::tokens::{format_number, format_token_usage, TokenEstimator};
use crate::tools::ToolRegistry;

pub(crate) struct Workbench {
    pub config: Config,
    pub agent: AgentConfig,
    pub provider: RigProvider,
    pub tools: ToolRegistry,
    pub history: MessageHistory,
    pub session: Session,
    pub settings: RunSettings,
    /// True when the session was loaded rather than created.
    pub resumed: bool,
    prompter: Box<dyn PermissionPrompter>,
}

impl Workbench {
    /// Loads config, resolves the agent and model, and opens (or creates)
    /// the session.
    pub fn prepare(options: &RunOptions) -> Result<Self> {
        let config = Config::load()?;
        let agent_name = options
            .agent
            .clone()
            .unwrap_or_else(|| config.default_agent_name().to_string());
        let agent = config.agent(&agent_name)?;

        let selection =
            provider::resolve_model(options.provider.as_deref(), options.model.as_deref(), &config)?;
        let provider = RigProvider::from_config(&config, &selection)?;

        let storage = Storage::open_default()?;
        let (session, resumed) = match &options.session {
            Some(partial) => {
                let id = Session::resolve_prefix(&storage, partial)?;
                (Session::load(&storage, &id)?, true)
            }
            None => {
                let cwd = std::env::current_dir()?;
                let session = Session::new(&cwd);
                session
                    .save(&storage)
                    .context("Failed to create session")?;
                (session, false)
            }
        };
        debug!(session = %session.id, agent = %agent.name, model = %selection.model, "workbench ready");

        let settings = RunSettings {
            max_iterations: options.max_iterations.unwrap_or(agent.max_iterations),
            doom_loop_detection: config.doom_loop_detection(),
            doom_loop_threshold: config.doom_loop_threshold(),
            context_window_tokens: config.context_window_tokens(),
            max_conversation_messages: config.max_conversation_messages(),
            estimator: TokenEstimator::new(config.token_estimator(), &selection.model),
            extra_system_prompt: config.system_prompt.clone(),
            retry: config.retry_policy(),
        };
        let prompter: Box<dyn PermissionPrompter> = if options.yes || config.auto_approve() {
            Box::new(AutoApprove)
        } else {
            Box::new(TerminalPrompter::new())
        };

        Ok(Self {
            config,
            agent,
            provider,
            tools: ToolRegistry::with_storage(storage.clone()),
            history: MessageHistory::new(storage),
            session,
            settings,
            resumed,
            prompter,
        })
    }

    pub fn print_banner(&self) {
        println!(
            "{} [agent: {}] [model: {}] [session: {}]",
            "kiri".bold().cyan(),
            self.agent.name.yellow(),
            self.provider.model().yellow(),
            self.session.short_id().yellow(),
        );
        println!();
    }

    /// Runs one request. Ctrl+C while it runs cancels it.
    pub async fn run(&mut self, request: &str) -> Result<RunOutcome> {
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            }
        });

        let mut runner = AgentRunner::new(
            &mut self.session,
            &self.agent,
            &self.provider,
            &self.tools,
            &self.history,
        )
        .with_settings(self.settings.clone())
        .with_prompter(&*self.prompter)
        .with_cancel(cancel);
        if self.config.summarize_pruned() {
            runner = runner.with_summarizer(&self.provider);
        }

        let mut renderer = StdoutRenderer::new();
        let result = runner.run(request, &mut renderer).await;
        watcher.abort();
        if renderer.text_chunks() > 0 {
            println!();
        }
        Ok(result?)
    }

    /// One dimmed line: iterations, tool calls, and context use of the last turn.
    pub fn print_footer(&self, outcome: &RunOutcome) {
        let mut line = format!(
            "{} iterations · {} tool calls",
            outcome.iterations,
            format_number(outcome.tool_calls)
        );
        if let Ok(Some(last)) = self.history.last(&self.session.id) {
            if let Some(usage) = last.usage {
                line.push_str(&format!(
                    " · context {}",
                    format_token_usage(usage.input, self.settings.context_window_tokens)
                ));
            }
        }
        println!("{}", line.dimmed());
    }
}
