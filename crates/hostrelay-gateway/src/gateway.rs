//! Gateway: the event loop connecting a channel to commands and sessions.
//!
//! Messages of one user are handled in arrival order by that user's worker
//! task; different users are handled concurrently. The dispatch loop never
//! waits on a worker: a message for a user whose queue is full is dropped
//! with a busy reply. Workers exit after a quiet period and are respawned on
//! the user's next message.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use hostrelay_core::channel::Channel;
use hostrelay_core::config::HostConfig;
use hostrelay_core::store::RecordStore;
use hostrelay_core::types::{IncomingMessage, OutgoingMessage, RecordTable, UserId};
use hostrelay_dialogue::{DialogueEngine, DialogueError, WorkflowKind};

use crate::command::{self, Command, Inbound, HELP_TEXT};
use crate::diagnostics::{repl_logs_command, CommandExecutor, DiagnosticQuery};
use crate::error::GatewayError;

const WORKER_QUEUE: usize = 32;
const WORKER_IDLE: Duration = Duration::from_secs(300);

pub(crate) const NO_OUTPUT_REPLY: &str = "(no output)";
pub(crate) const NO_PACKAGES_REPLY: &str = "No packages found.";
pub(crate) const LOG_UNAVAILABLE_REPLY: &str = "Can not open log file!";
pub(crate) const HOST_ERROR_REPLY: &str = "Failed to run the command on the host.";
pub(crate) const STORE_ERROR_REPLY: &str = "Failed to read from the database.";
pub(crate) const WORKFLOW_ERROR_REPLY: &str = "Something went wrong. The workflow was cancelled.";
pub(crate) const BUSY_REPLY: &str =
    "Still working on your earlier messages. This one was dropped, please resend it later.";

pub struct Gateway {
    engine: Arc<DialogueEngine>,
    store: Arc<dyn RecordStore>,
    /// Runs diagnostic queries on the managed host.
    host_executor: Arc<dyn CommandExecutor>,
    /// Runs commands on the relay host itself.
    local_executor: Arc<dyn CommandExecutor>,
    host: HostConfig,
    worker_idle: Duration,
    active_workers: AtomicUsize,
}

impl Gateway {
    pub fn new(
        engine: Arc<DialogueEngine>,
        store: Arc<dyn RecordStore>,
        host_executor: Arc<dyn CommandExecutor>,
        local_executor: Arc<dyn CommandExecutor>,
        host: HostConfig,
    ) -> Self {
        Self {
            engine,
            store,
            host_executor,
            local_executor,
            host,
            worker_idle: WORKER_IDLE,
            active_workers: AtomicUsize::new(0),
        }
    }

    /// How long a user's worker waits for the next message before exiting.
    pub fn with_worker_idle(mut self, idle: Duration) -> Self {
        self.worker_idle = idle;
        self
    }

    pub fn engine(&self) -> &Arc<DialogueEngine> {
        &self.engine
    }

    /// Users with a live worker in the running event loop.
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// Produce the replies for one inbound message.
    pub async fn handle(&self, message: &IncomingMessage) -> Vec<String> {
        match command::parse(&message.text) {
            Inbound::Command(cmd) => self.handle_command(message, cmd).await,
            Inbound::Text(text) => self.handle_text(&message.user, &text).await,
        }
    }

    async fn handle_command(&self, message: &IncomingMessage, cmd: Command) -> Vec<String> {
        let user = &message.user;
        match cmd {
            Command::Start => {
                info!(user = %user, "/start");
                vec![format!("Hello {}!", message.display_name)]
            }
            Command::Help => vec![HELP_TEXT.to_string()],
            Command::Enter(kind) => self.enter(user, kind),
            Command::Diagnostic(query) => self.diagnostic(user, &query).await,
            Command::ReplLogs => self.repl_logs(user).await,
            Command::ListRecords(table) => self.list_records(user, table).await,
            Command::Unknown(name) => {
                debug!(user = %user, command = %name, "Ignoring unknown command");
                Vec::new()
            }
        }
    }

    fn enter(&self, user: &UserId, kind: WorkflowKind) -> Vec<String> {
        match self.engine.enter(user, kind) {
            Ok(prompt) => vec![prompt],
            Err(DialogueError::SessionActive { .. }) => {
                info!(user = %user, workflow = %kind, "Entry rejected, session in progress");
                vec![format!(
                    "/{} is already in progress. Finish it first.",
                    kind.entry_command()
                )]
            }
            Err(e) => {
                error!(user = %user, workflow = %kind, error = %e, "Failed to enter workflow");
                vec![WORKFLOW_ERROR_REPLY.to_string()]
            }
        }
    }

    async fn handle_text(&self, user: &UserId, text: &str) -> Vec<String> {
        match self.engine.handle_text(user, text).await {
            Ok(advance) => advance.replies,
            Err(DialogueError::NoActiveSession { .. }) => vec![text.to_string()],
            Err(e) => {
                warn!(user = %user, error = %e, "Session failed");
                vec![WORKFLOW_ERROR_REPLY.to_string()]
            }
        }
    }

    async fn diagnostic(&self, user: &UserId, query: &DiagnosticQuery) -> Vec<String> {
        let command = query.shell_command();
        info!(user = %user, command = query.command_name(), "Diagnostic query");

        let output = match self.host_executor.run(&command).await {
            Ok(output) => output,
            Err(e) => {
                error!(user = %user, command = %command, error = %e, "Diagnostic query failed");
                return vec![HOST_ERROR_REPLY.to_string()];
            }
        };

        if let DiagnosticQuery::AptList(_) = query {
            let packages = output.stdout.trim();
            if packages.is_empty() {
                return vec![NO_PACKAGES_REPLY.to_string()];
            }
            return packages.lines().map(str::to_string).collect();
        }

        let text = output.stdout.trim_end();
        if text.trim().is_empty() {
            vec![NO_OUTPUT_REPLY.to_string()]
        } else {
            vec![text.to_string()]
        }
    }

    async fn repl_logs(&self, user: &UserId) -> Vec<String> {
        info!(user = %user, "Replication log query");
        let command = repl_logs_command(&self.host.repl_log_path, self.host.repl_log_lines);

        match self.local_executor.run(&command).await {
            Ok(output) if output.success() && output.stderr.is_empty() => {
                let text = output.stdout.trim_matches('\n');
                if text.is_empty() {
                    vec![NO_OUTPUT_REPLY.to_string()]
                } else {
                    vec![text.to_string()]
                }
            }
            Ok(output) => {
                warn!(
                    user = %user,
                    status = ?output.status,
                    stderr = %output.stderr.trim(),
                    "Replication log unavailable"
                );
                vec![LOG_UNAVAILABLE_REPLY.to_string()]
            }
            Err(e) => {
                warn!(user = %user, error = %e, "Replication log unavailable");
                vec![LOG_UNAVAILABLE_REPLY.to_string()]
            }
        }
    }

    async fn list_records(&self, user: &UserId, table: RecordTable) -> Vec<String> {
        info!(user = %user, table = %table, "Listing stored records");
        let store = Arc::clone(&self.store);

        match tokio::task::spawn_blocking(move || store.list(table)).await {
            Ok(Ok(values)) if values.is_empty() => vec![match table {
                RecordTable::Emails => "No email addresses saved yet.".to_string(),
                RecordTable::PhoneNumbers => "No phone numbers saved yet.".to_string(),
            }],
            Ok(Ok(values)) => values,
            Ok(Err(e)) => {
                error!(table = %table, error = %e, "Failed to list records");
                vec![STORE_ERROR_REPLY.to_string()]
            }
            Err(e) => {
                error!(table = %table, error = %e, "List task failed");
                vec![STORE_ERROR_REPLY.to_string()]
            }
        }
    }

    async fn respond(&self, channel: &Arc<dyn Channel>, message: IncomingMessage) {
        for text in self.handle(&message).await {
            let reply = OutgoingMessage {
                user: message.user.clone(),
                text,
            };
            if let Err(e) = channel.send(reply).await {
                error!(
                    user = %message.user,
                    channel = channel.name(),
                    error = %e,
                    "Failed to send reply"
                );
            }
        }
    }

    fn spawn_worker(
        self: &Arc<Self>,
        user: &UserId,
        channel: &Arc<dyn Channel>,
        workers: &mut JoinSet<UserId>,
    ) -> mpsc::Sender<IncomingMessage> {
        let (tx, mut rx) = mpsc::channel::<IncomingMessage>(WORKER_QUEUE);
        let gateway = Arc::clone(self);
        let channel = Arc::clone(channel);
        let user = user.clone();
        let idle = self.worker_idle;
        workers.spawn(async move {
            loop {
                match tokio::time::timeout(idle, rx.recv()).await {
                    Ok(Some(message)) => gateway.respond(&channel, message).await,
                    Ok(None) => break,
                    Err(_) => {
                        // Refuse further sends, then answer what is already queued.
                        rx.close();
                        while let Some(message) = rx.recv().await {
                            gateway.respond(&channel, message).await;
                        }
                        debug!(user = %user, "Worker idle, exiting");
                        break;
                    }
                }
            }
            user
        });
        tx
    }

    fn dispatch(
        self: &Arc<Self>,
        channel: &Arc<dyn Channel>,
        senders: &mut HashMap<UserId, mpsc::Sender<IncomingMessage>>,
        workers: &mut JoinSet<UserId>,
        message: IncomingMessage,
    ) {
        let user = message.user.clone();
        let sender = senders
            .entry(user.clone())
            .or_insert_with(|| self.spawn_worker(&user, channel, workers));

        let message = match sender.try_send(message) {
            Ok(()) => return,
            Err(TrySendError::Full(message)) => {
                warn!(user = %user, "Worker queue full, dropping message");
                self.reply_busy(channel, message.user);
                return;
            }
            Err(TrySendError::Closed(message)) => message,
        };

        debug!(user = %user, "Worker gone, respawning");
        let sender = self.spawn_worker(&user, channel, workers);
        if let Err(e) = sender.try_send(message) {
            error!(user = %user, error = %e, "Dropping message, worker unavailable");
            return;
        }
        senders.insert(user, sender);
    }

    /// Tell `user` their message was dropped without holding up dispatch.
    fn reply_busy(&self, channel: &Arc<dyn Channel>, user: UserId) {
        let channel = Arc::clone(channel);
        tokio::spawn(async move {
            let reply = OutgoingMessage {
                user: user.clone(),
                text: BUSY_REPLY.to_string(),
            };
            if let Err(e) = channel.send(reply).await {
                error!(
                    user = %user,
                    channel = channel.name(),
                    error = %e,
                    "Failed to send reply"
                );
            }
        });
    }

    /// Forget the sender of a worker that exited, unless it was already
    /// replaced by a newer worker.
    fn reap_worker(
        senders: &mut HashMap<UserId, mpsc::Sender<IncomingMessage>>,
        user: &UserId,
    ) {
        if senders.get(user).is_some_and(|sender| sender.is_closed()) {
            senders.remove(user);
            debug!(user = %user, "Worker reaped");
        }
    }

    fn spawn_sweeper(&self) -> Option<tokio::task::JoinHandle<()>> {
        let config = self.engine.config();
        if config.session_idle_timeout_secs == 0 || config.expiry_sweep_interval_secs == 0 {
            return None;
        }
        let period = Duration::from_secs(config.expiry_sweep_interval_secs);
        let engine = Arc::clone(&self.engine);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = engine.purge_expired() {
                    error!(error = %e, "Session sweep failed");
                }
            }
        }))
    }

    /// Run until the channel closes or Ctrl-C is received.
    pub async fn run(self: Arc<Self>, channel: Arc<dyn Channel>) -> Result<(), GatewayError> {
        let mut inbound = channel.start().await.map_err(|e| {
            GatewayError::Channel(format!("failed to start {}: {}", channel.name(), e))
        })?;
        info!(channel = channel.name(), "Gateway running");

        let sweeper = self.spawn_sweeper();
        let mut senders: HashMap<UserId, mpsc::Sender<IncomingMessage>> = HashMap::new();
        let mut workers: JoinSet<UserId> = JoinSet::new();

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => {
                        self.dispatch(&channel, &mut senders, &mut workers, message);
                    }
                    None => {
                        info!(channel = channel.name(), "Channel closed");
                        break;
                    }
                },
                Some(joined) = workers.join_next() => match joined {
                    Ok(user) => Self::reap_worker(&mut senders, &user),
                    Err(e) => {
                        error!(error = %e, "Worker task failed");
                        senders.retain(|_, sender| !sender.is_closed());
                    }
                },
                result = &mut shutdown => {
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to listen for shutdown signal");
                    }
                    info!("Received shutdown signal");
                    break;
                }
            }
            self.active_workers.store(senders.len(), Ordering::Relaxed);
        }

        // Let workers finish what is already queued.
        drop(senders);
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Worker task failed");
            }
        }
        self.active_workers.store(0, Ordering::Relaxed);
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        info!("Gateway stopped");
        Ok(())
    }
}
