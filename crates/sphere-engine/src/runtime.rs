//! Async driver for the message pipeline.
//!
//! [`start_pipeline`] moves a [`MessagePipeline`] into a background task that
//! sleeps until the next scheduled transition and serves commands from any
//! number of [`PipelineHandle`]s in between. Observer output arrives as
//! [`PipelineEvent`]s on the channel passed in.
//!
//! The task also owns a [`ToastQueue`] on the same clock: notifications
//! from the pipeline are shown as toasts and dismissed once
//! `toast.dismiss_after_ms` has elapsed.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::chat::{
    Attachment, AttachmentSource, Conversation, ConversationId, ConversationSnapshot,
    ConversationSummary, MessageBody, MessageId, MessageKind, MessagePipeline, PipelineError,
    PipelineEvent, PipelineStats, SubmitReceipt,
};
use crate::config::EngineConfig;
use crate::notify::{Notification, ToastQueue};

const COMMAND_BUFFER: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, PipelineError>>;

enum Command {
    Open(Conversation, Reply<()>),
    Close(ConversationId, Reply<Conversation>),
    Submit {
        conversation: ConversationId,
        kind: MessageKind,
        body: MessageBody,
        reply: Reply<MessageId>,
    },
    Attach {
        conversation: ConversationId,
        attachment: Attachment,
        reply: Reply<SubmitReceipt>,
    },
    RequestReply(ConversationId, Reply<()>),
    MarkRead(ConversationId, Reply<usize>),
    Snapshot(ConversationId, oneshot::Sender<Option<ConversationSnapshot>>),
    Summaries(Option<String>, oneshot::Sender<Vec<ConversationSummary>>),
    Stats(oneshot::Sender<PipelineStats>),
    Shutdown,
}

/// Handle for talking to a running pipeline task.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    commands: mpsc::Sender<Command>,
}

impl PipelineHandle {
    /// Open a conversation view.
    pub async fn open_conversation(&self, conversation: Conversation) -> Result<(), PipelineError> {
        self.request(|reply| Command::Open(conversation, reply)).await
    }

    /// Leave a conversation view, cancelling everything pending for it.
    pub async fn close_conversation(
        &self,
        conversation: ConversationId,
    ) -> Result<Conversation, PipelineError> {
        self.request(|reply| Command::Close(conversation, reply)).await
    }

    /// Submit a local message.
    pub async fn submit_local_message(
        &self,
        conversation: ConversationId,
        kind: MessageKind,
        body: MessageBody,
    ) -> Result<MessageId, PipelineError> {
        self.request(|reply| Command::Submit {
            conversation,
            kind,
            body,
            reply,
        })
        .await
    }

    /// Submit a local text message.
    pub async fn submit_text(
        &self,
        conversation: ConversationId,
        text: impl Into<String>,
    ) -> Result<MessageId, PipelineError> {
        self.submit_local_message(conversation, MessageKind::Text, MessageBody::text(text))
            .await
    }

    /// Submit an attachment, resolved by the task's attachment source.
    pub async fn submit_attachment(
        &self,
        conversation: ConversationId,
        attachment: Attachment,
    ) -> Result<SubmitReceipt, PipelineError> {
        self.request(|reply| Command::Attach {
            conversation,
            attachment,
            reply,
        })
        .await
    }

    /// Schedule a simulated reply.
    pub async fn request_simulated_reply(
        &self,
        conversation: ConversationId,
    ) -> Result<(), PipelineError> {
        self.request(|reply| Command::RequestReply(conversation, reply))
            .await
    }

    /// Mark a conversation read.
    pub async fn mark_conversation_read(
        &self,
        conversation: ConversationId,
    ) -> Result<usize, PipelineError> {
        self.request(|reply| Command::MarkRead(conversation, reply))
            .await
    }

    /// Current state of an open conversation.
    pub async fn snapshot(
        &self,
        conversation: ConversationId,
    ) -> Result<Option<ConversationSnapshot>, PipelineError> {
        self.query(|reply| Command::Snapshot(conversation, reply))
            .await
    }

    /// Chat-list rows, optionally filtered by peer name.
    pub async fn summaries(
        &self,
        query: Option<String>,
    ) -> Result<Vec<ConversationSummary>, PipelineError> {
        self.query(|reply| Command::Summaries(query, reply)).await
    }

    /// Pipeline counters.
    pub async fn stats(&self) -> Result<PipelineStats, PipelineError> {
        self.query(Command::Stats).await
    }

    /// Stop the pipeline task. Pending transitions are dropped.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, PipelineError> {
        self.query(command).await?
    }

    async fn query<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PipelineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| PipelineError::Stopped)?;
        rx.await.map_err(|_| PipelineError::Stopped)
    }
}

/// Start the pipeline task.
///
/// The task owns the pipeline and `source`; it exits when a handle calls
/// [`PipelineHandle::shutdown`] or every handle is dropped, and its join
/// handle yields the final counters.
pub fn start_pipeline(
    config: &EngineConfig,
    source: Box<dyn AttachmentSource + Send>,
    event_tx: mpsc::UnboundedSender<PipelineEvent>,
) -> (PipelineHandle, JoinHandle<PipelineStats>) {
    let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (notify_tx, notify_rx) = mpsc::unbounded_channel::<Notification>();
    let pipeline = MessagePipeline::new(config.delivery.clone())
        .with_observer(event_tx.clone())
        .with_notifier(notify_tx);
    let toasts = Toasts {
        queue: ToastQueue::new(&config.toast),
        incoming: notify_rx,
        events: event_tx,
    };

    let task =
        tokio::spawn(async move { pipeline_loop(pipeline, toasts, source, command_rx).await });

    (PipelineHandle { commands }, task)
}

/// Toasts raised by the pipeline, on the task's clock.
struct Toasts {
    queue: ToastQueue,
    incoming: mpsc::UnboundedReceiver<Notification>,
    events: mpsc::UnboundedSender<PipelineEvent>,
}

impl Toasts {
    /// Dismiss expired toasts, then show everything the pipeline raised.
    fn step(&mut self, now: Duration) {
        for toast in self.queue.advance_to(now) {
            debug!(id = toast.id.0, "Toast dismissed");
            let _ = self.events.send(PipelineEvent::ToastDismissed(toast));
        }
        while let Ok(notification) = self.incoming.try_recv() {
            let id = self.queue.show(notification.level, notification.message);
            if let Some(toast) = self.queue.visible().iter().find(|t| t.id == id) {
                let _ = self.events.send(PipelineEvent::ToastShown(toast.clone()));
            }
        }
    }
}

async fn pipeline_loop(
    mut pipeline: MessagePipeline,
    mut toasts: Toasts,
    mut source: Box<dyn AttachmentSource + Send>,
    mut commands: mpsc::Receiver<Command>,
) -> PipelineStats {
    let start = Instant::now();
    info!("Pipeline started");

    loop {
        let deadline = [pipeline.next_deadline(), toasts.queue.next_deadline()]
            .into_iter()
            .flatten()
            .min()
            .map(|at| start + at);
        tokio::select! {
            command = commands.recv() => {
                let now = start.elapsed();
                pipeline.advance_to(now);
                match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => handle_command(&mut pipeline, source.as_mut(), command),
                }
                toasts.step(now);
            }
            () = wait_for(deadline) => {
                let now = start.elapsed();
                let fired = pipeline.advance_to(now);
                debug!(fired, "Timers fired");
                toasts.step(now);
            }
        }
    }

    let stats = pipeline.stats();
    info!(
        applied = stats.transitions_applied,
        stale = stats.stale_discarded,
        pending = pipeline.pending_transitions(),
        "Pipeline stopped"
    );
    stats
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn handle_command(
    pipeline: &mut MessagePipeline,
    source: &mut (dyn AttachmentSource + Send),
    command: Command,
) {
    // A dropped reply receiver only means the caller stopped waiting.
    match command {
        Command::Open(conversation, reply) => {
            let _ = reply.send(pipeline.open_conversation(conversation));
        }
        Command::Close(conversation, reply) => {
            let _ = reply.send(pipeline.close_conversation(&conversation));
        }
        Command::Submit {
            conversation,
            kind,
            body,
            reply,
        } => {
            let _ = reply.send(pipeline.submit_local_message(&conversation, kind, body));
        }
        Command::Attach {
            conversation,
            attachment,
            reply,
        } => {
            let _ = reply.send(pipeline.submit_attachment(&conversation, &attachment, source));
        }
        Command::RequestReply(conversation, reply) => {
            let _ = reply.send(pipeline.request_simulated_reply(&conversation));
        }
        Command::MarkRead(conversation, reply) => {
            let _ = reply.send(pipeline.mark_conversation_read(&conversation));
        }
        Command::Snapshot(conversation, reply) => {
            let _ = reply.send(pipeline.snapshot(&conversation));
        }
        Command::Summaries(query, reply) => {
            let _ = reply.send(pipeline.summaries(query.as_deref()));
        }
        Command::Stats(reply) => {
            let _ = reply.send(pipeline.stats());
        }
        Command::Shutdown => {}
    }
}
