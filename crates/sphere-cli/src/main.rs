//! sphere CLI: Drive the sphere interaction core with synthetic input

use chrono::Utc;
use clap::{Parser, Subcommand};
use sphere_engine::chat::sample;
use sphere_engine::{
    start_pipeline, Attachment, Contact, Conversation, ConversationId, EngineConfig, MessageId,
    MessagePipeline, Notification, ObjectUrlSource, PipelineEvent, PointerSample, RefreshController,
    RefreshEvent, RefreshFailed, RefreshOutcome, Release, StartOutcome,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Interaction core of the sphere sports feed
#[derive(Parser)]
#[command(name = "sphere")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a pull-to-refresh gesture on the feed
    Pull {
        /// Raw pull distance in pixels
        #[arg(long)]
        distance: f64,

        /// Scroll offset of the feed when the gesture starts
        #[arg(long, default_value = "0")]
        offset: f64,

        /// Number of move events to spread the pull over
        #[arg(long, default_value = "5")]
        steps: u32,

        /// Make the refresh operation fail
        #[arg(long)]
        fail: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a message in a sample conversation and watch it get delivered
    Chat {
        /// Conversation id
        #[arg(long, default_value = "2")]
        conversation: String,

        /// Start a new conversation with this peer instead
        #[arg(long, value_name = "NAME", conflicts_with = "conversation")]
        new: Option<String>,

        /// Do not ask the peer for a reply
        #[arg(long)]
        no_reply: bool,

        /// Send a file instead of text (the text is used as the file name)
        #[arg(long)]
        mime: Option<String>,

        /// Message text
        text: String,
    },

    /// List the sample conversations
    Conversations {
        /// Filter by name (case-insensitive)
        #[arg(long)]
        search: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Write the default configuration to this path instead
        #[arg(long)]
        init: Option<PathBuf>,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(&e),
    };

    match cli.command {
        Commands::Pull {
            distance,
            offset,
            steps,
            fail: should_fail,
            json,
        } => block_on(cmd_pull(config, distance, offset, steps, should_fail, json)),
        Commands::Chat {
            conversation,
            new,
            no_reply,
            mime,
            text,
        } => {
            let target = match new {
                Some(name) => ChatTarget::New(name),
                None => ChatTarget::Sample(ConversationId::new(conversation)),
            };
            block_on(cmd_chat(config, target, !no_reply, mime, text));
        }
        Commands::Conversations { search, json } => {
            cmd_conversations(&config, search.as_deref(), json);
        }
        Commands::Config { init } => cmd_config(&config, init.as_deref()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sphere_engine=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => {
            let config = EngineConfig::load(path)
                .map_err(|e| format!("Failed to load config {}: {e}", path.display()))?;
            debug!(path = %path.display(), "Loaded config");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn block_on(future: impl std::future::Future<Output = Result<(), String>>) {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => fail(&format!("Failed to create tokio runtime: {e}")),
    };
    if let Err(e) = rt.block_on(future) {
        fail(&e);
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

async fn cmd_pull(
    config: EngineConfig,
    distance: f64,
    offset: f64,
    steps: u32,
    should_fail: bool,
    json: bool,
) -> Result<(), String> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RefreshEvent>();
    let (toast_tx, mut toast_rx) = mpsc::unbounded_channel::<Notification>();

    let operation = move || async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        if should_fail {
            Err(RefreshFailed::new("feed service unavailable"))
        } else {
            Ok(())
        }
    };
    let mut controller = RefreshController::new(config.refresh.clone(), Arc::new(operation))
        .with_observer(event_tx)
        .with_notifier(toast_tx);

    let steps = steps.max(1);
    let mut outcome = None;
    if let StartOutcome::Ignored(reason) =
        controller.on_interaction_start(PointerSample::new(0.0, 0.0, 0), offset)
    {
        outcome = Some(format!("ignored: {reason:?}"));
    } else {
        for step in 1..=steps {
            let y = distance * f64::from(step) / f64::from(steps);
            controller.on_interaction_move(PointerSample::new(0.0, y, u64::from(step) * 16));
        }
        match controller.on_interaction_end() {
            Release::Refreshing(pending) => {
                let completion = pending.wait().await;
                outcome = controller.finish(completion).map(|o| match o {
                    RefreshOutcome::Completed => "refreshed".to_string(),
                    RefreshOutcome::Failed(e) => format!("failed: {}", e.reason),
                });
            }
            Release::Reset { damped_distance } => {
                outcome = Some(format!(
                    "reset: damped distance {damped_distance} did not exceed {}",
                    config.refresh.threshold
                ));
            }
            Release::Ignored(reason) => outcome = Some(format!("ignored: {reason:?}")),
        }
    }
    drop(controller);

    let mut events = Vec::new();
    while let Some(event) = event_rx.recv().await {
        events.push(event);
    }
    let mut toasts = Vec::new();
    while let Some(toast) = toast_rx.recv().await {
        toasts.push(toast);
    }
    let outcome = outcome.unwrap_or_else(|| "discarded".into());

    if json {
        let events: Vec<_> = events.iter().map(refresh_event_json).collect();
        let report = serde_json::json!({
            "outcome": outcome,
            "events": events,
            "toasts": toasts,
        });
        let text = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{text}");
        return Ok(());
    }

    for event in &events {
        match event {
            RefreshEvent::Progress {
                damped_distance,
                phase,
            } => println!("  {:<10} {damped_distance:>7.1}", phase.to_string()),
            RefreshEvent::Started => println!("  refresh started"),
            RefreshEvent::Finished(outcome) => {
                let label = if outcome.is_success() { "ok" } else { "failed" };
                println!("  refresh finished ({label})");
            }
        }
    }
    for toast in &toasts {
        println!("[{}] {}", toast.level, toast.message);
    }
    println!("{outcome}");
    Ok(())
}

fn refresh_event_json(event: &RefreshEvent) -> serde_json::Value {
    match event {
        RefreshEvent::Progress {
            damped_distance,
            phase,
        } => serde_json::json!({
            "type": "progress",
            "damped_distance": damped_distance,
            "phase": phase.to_string(),
        }),
        RefreshEvent::Started => serde_json::json!({ "type": "started" }),
        RefreshEvent::Finished(outcome) => serde_json::json!({
            "type": "finished",
            "outcome": outcome,
        }),
    }
}

/// Which conversation `sphere chat` talks in.
enum ChatTarget {
    Sample(ConversationId),
    New(String),
}

impl ChatTarget {
    fn conversation(self) -> Result<Conversation, String> {
        match self {
            Self::Sample(id) => sample::conversations(Utc::now())
                .into_iter()
                .find(|c| c.id() == &id)
                .ok_or_else(|| format!("No sample conversation with id {id}")),
            Self::New(name) => {
                let handle = name.to_lowercase().replace(' ', "-");
                Ok(Conversation::start(Contact::new(handle, name)))
            }
        }
    }
}

async fn cmd_chat(
    config: EngineConfig,
    target: ChatTarget,
    want_reply: bool,
    mime: Option<String>,
    text: String,
) -> Result<(), String> {
    let delivery = config.delivery.clone();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (handle, task) = start_pipeline(&config, Box::new(ObjectUrlSource::default()), event_tx);

    let conversation = target.conversation()?;
    let id = conversation.id().clone();
    debug!(conversation = %id, "Opening conversation");
    handle
        .open_conversation(conversation)
        .await
        .map_err(|e| e.to_string())?;

    let has_attachment = mime.is_some();
    let message = match mime {
        Some(mime) => {
            let receipt = handle
                .submit_attachment(id.clone(), Attachment::new(text, mime))
                .await
                .map_err(|e| e.to_string())?;
            receipt.message
        }
        None => handle
            .submit_text(id.clone(), text)
            .await
            .map_err(|e| e.to_string())?,
    };
    if want_reply {
        handle
            .request_simulated_reply(id.clone())
            .await
            .map_err(|e| e.to_string())?;
    }

    let mut settle = delivery.delivered_after();
    if want_reply {
        settle = settle.max(delivery.reply_after());
    }
    if has_attachment {
        settle = settle.max(config.toast.dismiss_after());
    }
    let deadline = tokio::time::Instant::now() + settle + Duration::from_millis(100);
    let mut reported = ChatReport::new(message);
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, event_rx.recv()).await {
        reported.print(&event);
    }

    handle.shutdown().await;
    let stats = task.await.map_err(|e| e.to_string())?;
    println!(
        "{} transition(s) applied, {} stale discarded",
        stats.transitions_applied, stats.stale_discarded
    );
    Ok(())
}

/// Prints only what changed between consecutive snapshots.
struct ChatReport {
    message: MessageId,
    last_status: Option<String>,
    seen: usize,
}

impl ChatReport {
    fn new(message: MessageId) -> Self {
        Self {
            message,
            last_status: None,
            seen: 0,
        }
    }

    fn print(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::ConversationChanged(snapshot) => {
                for message in snapshot.messages.iter().skip(self.seen) {
                    if !message.is_own() {
                        let preview = message.body.preview(message.kind);
                        println!("{}: {preview}", message.sender.display_name);
                    }
                }
                self.seen = snapshot.messages.len();

                if let Some(message) = snapshot.message(self.message) {
                    let status = message.status.to_string();
                    if self.last_status.as_deref() != Some(status.as_str()) {
                        println!("  {} {status}", message.id);
                        self.last_status = Some(status);
                    }
                }
            }
            PipelineEvent::TypingChanged { visible, .. } => {
                if *visible {
                    println!("  ...typing");
                }
            }
            PipelineEvent::Notification(toast) => println!("[{}] {}", toast.level, toast.message),
            PipelineEvent::ToastShown(toast) => println!("[{}] {}", toast.level, toast.message),
            PipelineEvent::ToastDismissed(toast) => println!("  (dismissed) {}", toast.message),
        }
    }
}

fn cmd_conversations(config: &EngineConfig, search: Option<&str>, json: bool) {
    let mut pipeline = MessagePipeline::new(config.delivery.clone());
    for conversation in sample::conversations(Utc::now()) {
        if let Err(e) = pipeline.open_conversation(conversation) {
            fail(&e.to_string());
        }
    }
    let summaries = pipeline.summaries(search);

    if json {
        match serde_json::to_string_pretty(&summaries) {
            Ok(text) => println!("{text}"),
            Err(e) => fail(&e.to_string()),
        }
        return;
    }

    if summaries.is_empty() {
        println!("No conversations found");
        return;
    }
    for summary in &summaries {
        let online = if summary.is_online { "*" } else { " " };
        let badge = summary.badge().map(|b| format!(" ({b})")).unwrap_or_default();
        println!("{online} [{}] {}{badge}", summary.id, summary.name);
        if let Some(last) = &summary.last_message {
            println!("      {last}");
        }
    }
}

fn cmd_config(config: &EngineConfig, init: Option<&Path>) {
    if let Some(path) = init {
        if path.exists() {
            println!("Config already exists at {}", path.display());
            return;
        }
        if let Err(e) = EngineConfig::default().save(path) {
            fail(&format!("Failed to write {}: {e}", path.display()));
        }
        println!("Created {}", path.display());
        return;
    }

    match serde_json::to_string_pretty(config) {
        Ok(text) => println!("{text}"),
        Err(e) => fail(&e.to_string()),
    }
}
