//! Session controller: the effect runner for session transitions
//!
//! Owns the conversation between turns. A running turn owns it instead: the
//! store moves into the turn task and comes back through its join handle,
//! so only one turn can ever touch it.

use super::effect::Effect;
use super::event::{SessionEvent, SessionInput, SessionOutput};
use super::state::SessionState;
use super::transition::{transition, TransitionResult};
use crate::conversation::{ConversationStore, Message};
use crate::runtime::{LlmClient, StreamEvent, ToolDispatcher, TurnError, TurnExecutor, TurnSummary};
use crate::system_prompt::{PromptService, PromptVars};
use crate::tools::ToolRegistry;
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

const OUTPUT_CAPACITY: usize = 1024;

/// How long shutdown waits for a cancelled turn to hand the conversation back
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub working_dir: PathBuf,
    /// Window after the first Ctrl+C in which further presses count
    pub interrupt_window: Duration,
    /// Capacity of each turn's event channel
    pub event_buffer: usize,
}

type TurnOutcome = (ConversationStore, Result<TurnSummary, TurnError>);

struct ActiveTurn {
    handle: JoinHandle<TurnOutcome>,
    cancel: CancellationToken,
    events: mpsc::Receiver<StreamEvent>,
}

enum TurnSignal {
    Event(StreamEvent),
    Finished(Result<TurnOutcome, JoinError>),
}

pub struct SessionController<L: LlmClient + ?Sized + 'static> {
    llm: Arc<L>,
    tools: ToolRegistry,
    prompts: PromptService,
    options: SessionOptions,
    state: SessionState,
    /// `None` while a turn task owns the conversation
    store: Option<ConversationStore>,
    active: Option<ActiveTurn>,
    outputs: broadcast::Sender<SessionOutput>,
    timer_tx: mpsc::UnboundedSender<u64>,
    timer_rx: mpsc::UnboundedReceiver<u64>,
    done: bool,
}

impl<L: LlmClient + ?Sized + 'static> SessionController<L> {
    pub fn new(
        llm: Arc<L>,
        tools: ToolRegistry,
        prompts: PromptService,
        options: SessionOptions,
    ) -> Self {
        let (outputs, _) = broadcast::channel(OUTPUT_CAPACITY);
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        Self {
            llm,
            tools,
            prompts,
            options,
            state: SessionState::new(),
            store: Some(ConversationStore::new()),
            active: None,
            outputs,
            timer_tx,
            timer_rx,
            done: false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionOutput> {
        self.outputs.subscribe()
    }

    /// Process input until the session shuts down. Returns the conversation
    /// as it stood at exit.
    pub async fn run(mut self, mut input: mpsc::Receiver<SessionInput>) -> ConversationStore {
        tracing::info!(
            working_dir = %self.options.working_dir.display(),
            tools = self.tools.len(),
            "Session started"
        );

        // Ctrl+C shares the channel with stdin, so it stays open past EOF
        let mut channel_open = true;

        while !self.done {
            tokio::select! {
                biased;

                message = input.recv(), if channel_open => match message {
                    Some(SessionInput::Line(line)) if self.state.input_closed => {
                        tracing::debug!(line = %line, "Ignoring line received after end of input");
                    }
                    Some(SessionInput::Line(line)) => self.on_line(line).await,
                    Some(SessionInput::Interrupt) => self.apply(SessionEvent::CancelSignal).await,
                    Some(SessionInput::Eof) => {
                        if !self.state.input_closed {
                            self.apply(SessionEvent::InputClosed).await;
                        }
                    }
                    None => {
                        channel_open = false;
                        if !self.state.input_closed {
                            self.apply(SessionEvent::InputClosed).await;
                        }
                    }
                },

                Some(generation) = self.timer_rx.recv() => {
                    self.apply(SessionEvent::InterruptWindowElapsed { generation }).await;
                }

                signal = next_turn_signal(&mut self.active) => self.on_turn_signal(signal).await,
            }
        }

        let mut store = self.store.take().unwrap_or_default();
        store.finalize_buffers();
        tracing::info!(messages = store.len(), "Session ended");
        store
    }

    async fn apply(&mut self, event: SessionEvent) {
        tracing::debug!(?event, phase = ?self.state.phase, "Session event");
        let TransitionResult { new_state, effects } = transition(&self.state, event);
        self.state = new_state;
        for effect in effects {
            self.execute(effect).await;
        }
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::StartTurn { line, reconnect } => self.start_turn(line, reconnect).await,
            Effect::CancelTurn => {
                if let Some(turn) = &self.active {
                    tracing::info!("Cancelling turn");
                    turn.cancel.cancel();
                }
            }
            Effect::ArmInterruptReset { generation } => {
                let timer = self.timer_tx.clone();
                let window = self.options.interrupt_window;
                tokio::spawn(async move {
                    tokio::time::sleep(window).await;
                    let _ = timer.send(generation);
                });
            }
            Effect::FinalizeBuffers => {
                if let Some(store) = self.store.as_mut() {
                    store.finalize_buffers();
                }
            }
            Effect::Notify(output) => self.emit(output),
            Effect::Shutdown => self.shutdown().await,
        }
    }

    async fn start_turn(&mut self, line: String, reconnect: bool) {
        if reconnect {
            self.reconnect().await;
        }

        let mut store = self.store.take().unwrap_or_else(|| {
            tracing::warn!("No conversation at turn start, starting a fresh one");
            ConversationStore::new()
        });
        store.add_message(Message::human(line.clone()));

        let model = self.llm.model_id().await;
        let vars = PromptVars::new(self.options.working_dir.clone(), model, self.tools.names());
        let system_prompt = self.prompts.system_prompt(&vars);

        let (events_tx, events) = mpsc::channel(self.options.event_buffer);
        let dispatcher = ToolDispatcher::new(self.tools.clone(), self.options.working_dir.clone());
        let executor = TurnExecutor::new(Arc::clone(&self.llm), dispatcher, system_prompt, events_tx);

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let result = executor.run_turn(&mut store, &token).await;
            (store, result)
        });

        self.active = Some(ActiveTurn {
            handle,
            cancel,
            events,
        });
        self.emit(SessionOutput::TurnStarted { line });
    }

    async fn reconnect(&mut self) {
        tracing::info!("Re-establishing connections after interrupt");

        if let Err(e) = self.llm.reconnect().await {
            tracing::warn!(error = %e, "Provider reconnect failed");
            self.emit(SessionOutput::Error(format!("Provider reconnect failed: {e}")));
        }

        match self.tools.reconnect().await {
            Ok(remote_tools) => tracing::debug!(remote_tools, "Tool registry refreshed"),
            Err(e) => tracing::warn!(error = %e, "Remote tool reconnect failed, keeping previous tools"),
        }
    }

    async fn on_turn_signal(&mut self, signal: TurnSignal) {
        match signal {
            TurnSignal::Event(event) => self.emit(SessionOutput::Stream(event)),
            TurnSignal::Finished(joined) => {
                self.active = None;
                let event = self.turn_finished(joined);
                self.apply(event).await;
            }
        }
    }

    fn turn_finished(&mut self, joined: Result<TurnOutcome, JoinError>) -> SessionEvent {
        let (store, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Turn task crashed, starting a fresh conversation");
                self.store = Some(ConversationStore::new());
                self.emit(SessionOutput::Notice(
                    "Session reset: the conversation history was lost".to_string(),
                ));
                return SessionEvent::TurnFailed {
                    message: format!("Turn crashed: {e}"),
                };
            }
        };
        self.store = Some(store);

        match result {
            Ok(summary) => {
                tracing::debug!(
                    model_steps = summary.model_steps,
                    tool_results = summary.tool_results,
                    "Turn finished"
                );
                SessionEvent::TurnCompleted
            }
            Err(TurnError::Interrupted) => {
                tracing::info!("Turn interrupted");
                SessionEvent::TurnInterrupted
            }
            Err(e) => {
                tracing::error!(error = %e, "Turn failed");
                SessionEvent::TurnFailed {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        tracing::info!("Shutting down session");

        if let Some(turn) = self.active.take() {
            let ActiveTurn {
                mut handle,
                cancel,
                events,
            } = turn;
            // Unblock a turn waiting on a full event channel
            drop(events);
            cancel.cancel();

            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok((store, _))) => self.store = Some(store),
                Ok(Err(e)) => tracing::warn!(error = %e, "Turn task crashed during shutdown"),
                Err(_) => {
                    tracing::warn!("Turn did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        if let Some(store) = self.store.as_mut() {
            store.finalize_buffers();
        }
        self.emit(SessionOutput::Shutdown);
        self.done = true;
    }

    // ------------------------------------------------------------------------
    // Meta-commands
    // ------------------------------------------------------------------------

    async fn on_line(&mut self, line: String) {
        if let Some(command) = line.trim().strip_prefix('/') {
            let (name, arg) = command
                .split_once(char::is_whitespace)
                .map_or((command, ""), |(name, arg)| (name, arg.trim()));
            match name {
                "switch" => return self.switch_model(arg).await,
                "models" => return self.list_models().await,
                "reset" => return self.reset(),
                // Anything else is ordinary input
                _ => {}
            }
        }
        self.apply(SessionEvent::LineReceived { line }).await;
    }

    async fn switch_model(&self, query: &str) {
        if query.is_empty() {
            self.emit(SessionOutput::Error(
                "Usage: /switch <model-or-provider>".to_string(),
            ));
            return;
        }

        match self.llm.switch_model(query).await {
            Ok(model) => {
                tracing::info!(model = %model, "Switched model");
                self.emit(SessionOutput::Notice(format!("Switched to {model}")));
            }
            Err(e) => self.emit(SessionOutput::Error(e.to_string())),
        }
    }

    async fn list_models(&self) {
        let current = self.llm.model_id().await;
        let mut text = String::from("Available models:");
        for model in self.llm.available_models().await {
            let marker = if model.id == current { '*' } else { ' ' };
            let _ = write!(
                text,
                "\n{marker} {} ({}) {}",
                model.id, model.provider, model.description
            );
        }
        self.emit(SessionOutput::Notice(text));
    }

    fn reset(&mut self) {
        if self.state.turn_in_flight {
            self.emit(SessionOutput::Error(
                "Cannot reset while a turn is running".to_string(),
            ));
            return;
        }

        if let Some(store) = self.store.as_mut() {
            store.clear_messages();
        }
        tracing::info!("Conversation cleared");
        self.emit(SessionOutput::Notice("Conversation cleared".to_string()));
    }

    fn emit(&self, output: SessionOutput) {
        // No subscribers is not an error
        let _ = self.outputs.send(output);
    }
}

async fn next_turn_signal(active: &mut Option<ActiveTurn>) -> TurnSignal {
    let Some(turn) = active.as_mut() else {
        return std::future::pending().await;
    };

    // Buffered events drain before completion is reported
    tokio::select! {
        biased;
        Some(event) = turn.events.recv() => TurnSignal::Event(event),
        joined = &mut turn.handle => TurnSignal::Finished(joined),
    }
}
