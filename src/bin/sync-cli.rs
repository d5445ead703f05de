use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveTime, Weekday};
use syncdesk_lib::config::ClientConfig;
use syncdesk_lib::connection::ConnectionState;
use syncdesk_lib::logging::{init_tracing, LogEntry};
use syncdesk_lib::patch::PatchTreeNode;
use syncdesk_lib::remote_tree::{NodeId, RemoteTree, RemoteLister};
use syncdesk_lib::schedule::{
    make_iso8601, parse_iso8601, readable, Frequency, ScheduleForm, ScheduleLabels,
};
use syncdesk_lib::status::{OutboundMessage, TaskCommand, TaskRegistry};
use syncdesk_lib::SyncClient;

/// Quiet period after which a freshly connected registry counts as settled.
const SETTLE: Duration = Duration::from_millis(800);

#[derive(Parser)]
#[command(name = "sync-cli")]
#[command(about = "Command-line client for the sync agent", long_about = None)]
struct Cli {
    /// YAML client configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Agent base URL, overrides the configuration file
    #[arg(short, long)]
    agent: Option<String>,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List tasks and their status
    Tasks,
    /// Send a command to a task
    Cmd {
        #[arg(value_enum)]
        command: CmdArg,
        #[arg(short, long)]
        task: String,
    },
    /// Browse an endpoint's folders down to a path
    Tree {
        #[arg(short, long)]
        endpoint: String,
        /// Folder to reveal; defaults to the endpoint's default folder
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Show sync history of a task, newest first
    History {
        #[arg(short, long)]
        task: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print every operation
        #[arg(short, long)]
        details: bool,
    },
    /// Convert schedules to and from their wire form
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
    /// Print agent logs
    Logs {
        #[arg(short, long)]
        follow: bool,
    },
    /// Print the agent's application settings
    Settings,
}

#[derive(Subcommand)]
enum ScheduleAction {
    Decode {
        value: String,
    },
    Encode {
        #[arg(value_enum)]
        frequency: FrequencyArg,
        #[arg(long)]
        monthday: Option<u32>,
        #[arg(long)]
        weekday: Option<Weekday>,
        /// Time of day as HH:MM
        #[arg(long, value_parser = parse_daytime)]
        time: Option<NaiveTime>,
        #[arg(long)]
        minutes: Option<u32>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CmdArg {
    Loop,
    Resync,
    Pause,
    Resume,
    Interrupt,
    Delete,
}

impl From<CmdArg> for TaskCommand {
    fn from(arg: CmdArg) -> Self {
        match arg {
            CmdArg::Loop => TaskCommand::Loop,
            CmdArg::Resync => TaskCommand::Resync,
            CmdArg::Pause => TaskCommand::Pause,
            CmdArg::Resume => TaskCommand::Resume,
            CmdArg::Interrupt => TaskCommand::Interrupt,
            CmdArg::Delete => TaskCommand::Delete,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FrequencyArg {
    Manual,
    Monthly,
    Weekly,
    Daily,
    Timely,
}

impl From<FrequencyArg> for Frequency {
    fn from(arg: FrequencyArg) -> Self {
        match arg {
            FrequencyArg::Manual => Frequency::Manual,
            FrequencyArg::Monthly => Frequency::Monthly,
            FrequencyArg::Weekly => Frequency::Weekly,
            FrequencyArg::Daily => Frequency::Daily,
            FrequencyArg::Timely => Frequency::Timely,
        }
    }
}

fn parse_daytime(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| format!("expected HH:MM: {e}"))
}

fn spinner(message: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn build_client(path: Option<PathBuf>, agent: Option<String>) -> anyhow::Result<SyncClient> {
    let mut config = match path {
        Some(path) => ClientConfig::load(&path)?,
        None => ClientConfig::default(),
    };
    if let Some(agent) = agent {
        config.agent_url = agent;
    }
    Ok(SyncClient::new(config)?)
}

/// Connects to `/status` and returns the registry once updates settle.
async fn fetch_tasks(client: &SyncClient) -> anyhow::Result<TaskRegistry> {
    let pb = spinner("Connecting to agent...")?;
    let mut channel = client.status_channel();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    channel.subscribe_tasks(move |tasks| {
        let _ = tx.send(tasks.clone());
    });
    let (mut handle, task) = client.spawn_status(channel)?;

    let timeout = client.config.connect_timeout();
    let opened = tokio::time::timeout(timeout, handle.wait_for_state(ConnectionState::Open)).await;
    if !matches!(opened, Ok(Ok(()))) {
        pb.abandon_with_message("❌ Agent unreachable");
        handle.close()?;
        anyhow::bail!("Cannot reach agent at {}", client.config.agent_url);
    }

    pb.set_message("Waiting for task states...");
    let mut registry = TaskRegistry::new();
    while let Ok(Some(update)) = tokio::time::timeout(SETTLE, rx.recv()).await {
        registry = update;
    }
    handle.close()?;
    let _ = task.await;
    pb.finish_and_clear();
    Ok(registry)
}

async fn print_tasks(client: &SyncClient) -> anyhow::Result<()> {
    let registry = fetch_tasks(client).await?;
    if registry.is_empty() {
        println!("No tasks configured.");
        return Ok(());
    }
    println!("{:<38} {:<24} {:<12} {:<20}", "UUID", "LABEL", "STATUS", "LAST SYNC");
    println!("{}", "-".repeat(96));
    for (uuid, state) in &registry {
        let last_sync = state
            .last_sync_time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<38} {:<24} {:<12} {:<20}",
            uuid,
            state.config.label,
            state.status.label(),
            last_sync
        );
        if let Some(process) = &state.last_process_status {
            if process.is_error {
                println!("   ⚠️  {}", process.status_string);
            }
        }
    }
    Ok(())
}

async fn send_command(client: &SyncClient, command: TaskCommand, uuid: String) -> anyhow::Result<()> {
    let pb = spinner("Connecting to agent...")?;
    let (mut handle, task) = client.spawn_status(client.status_channel())?;
    let timeout = client.config.connect_timeout();
    let opened = tokio::time::timeout(timeout, handle.wait_for_state(ConnectionState::Open)).await;
    if !matches!(opened, Ok(Ok(()))) {
        pb.abandon_with_message("❌ Agent unreachable");
        handle.close()?;
        anyhow::bail!("Cannot reach agent at {}", client.config.agent_url);
    }
    handle.send_message(&OutboundMessage::Cmd {
        uuid: Some(uuid.clone()),
        cmd: command,
    })?;
    handle.close()?;
    let _ = task.await;
    pb.finish_with_message(format!("✅ Sent {command:?} to {uuid}"));
    Ok(())
}

fn print_tree<L: RemoteLister>(tree: &RemoteTree<L>, id: NodeId, depth: usize) {
    let Some(node) = tree.node(id) else { return };
    let marker = if node.is_collapsed() { "▸" } else { "▾" };
    println!(
        "{}{} {}",
        "  ".repeat(depth),
        marker,
        tree.get_name(id).unwrap_or_default()
    );
    if !node.is_collapsed() {
        for child in node.children() {
            print_tree(tree, *child, depth + 1);
        }
    }
}

async fn browse(client: &SyncClient, endpoint: String, path: Option<String>) -> anyhow::Result<()> {
    let pb = spinner("Listing folders...")?;
    let target = match path {
        Some(path) => path,
        None => client.api.default_path(&endpoint).await?,
    };
    let mut tree = client.remote_tree(endpoint.as_str(), "").with_root_label(endpoint.as_str());
    let root = RemoteTree::<syncdesk_lib::api::AgentClient>::ROOT;
    let initial = (!target.is_empty()).then_some(target.as_str());
    if let Err(e) = tree.load(root, initial).await {
        pb.abandon_with_message("❌ Listing failed");
        return Err(e.into());
    }
    pb.finish_and_clear();
    print_tree(&tree, root, 0);
    Ok(())
}

fn print_operations(node: &PatchTreeNode) {
    node.walk(&mut |n| {
        if let Some(op) = n.data_operation.as_ref().or(n.path_operation.as_ref()) {
            let error = op
                .error_string
                .as_deref()
                .map(|e| format!(" ({e})"))
                .unwrap_or_default();
            println!("     {} {:<14} {}{}", op.dir.arrow(), op.op_type.label(), n.node.path, error);
        }
        if let Some(conflict) = &n.conflict {
            println!("     ⚡ {} {}", conflict.conflict_type.label(), n.node.path);
        }
    });
}

async fn print_history(
    client: &SyncClient,
    uuid: String,
    offset: usize,
    limit: usize,
    details: bool,
) -> anyhow::Result<()> {
    let registry = fetch_tasks(client).await?;
    let state = registry
        .get(&uuid)
        .ok_or_else(|| anyhow::anyhow!("Unknown task: {uuid}"))?;

    let pb = spinner("Loading history...")?;
    let patches = client.history(&state.config, offset, limit).await?;
    pb.finish_and_clear();

    if patches.is_empty() {
        println!("No history for {}.", state.config.label);
        return Ok(());
    }
    println!("📜 History of {}", state.config.label);
    for patch in &patches {
        let stamp = patch
            .stamp()
            .map(|s| s.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| patch.timestamp.clone());
        println!(
            "   {}  {} operation(s)  from {}",
            stamp,
            patch.operation_count(),
            patch.stats.source
        );
        if let Some(error) = &patch.error {
            println!("   ⚠️  {error}");
        }
        if details {
            print_operations(&patch.root);
        }
    }
    Ok(())
}

fn schedule(action: ScheduleAction) -> anyhow::Result<()> {
    let labels = ScheduleLabels::default();
    match action {
        ScheduleAction::Decode { value } => {
            let schedule = parse_iso8601(&value)?;
            println!("{}", readable(&schedule, &labels, false));
            println!("{schedule:?}");
        }
        ScheduleAction::Encode {
            frequency,
            monthday,
            weekday,
            time,
            minutes,
        } => {
            let mut form = ScheduleForm::default();
            form.change_frequency(frequency.into());
            form.monthday = monthday.or(form.monthday);
            form.weekday = weekday.or(form.weekday);
            form.daytime = time.or(form.daytime);
            form.everyminutes = minutes.or(form.everyminutes);
            let schedule = form.to_schedule();
            println!("{}", make_iso8601(&schedule)?);
            println!("{}", readable(&schedule, &labels, true));
        }
    }
    Ok(())
}

fn print_log_entry(entry: &LogEntry) {
    match &entry.logger {
        Some(logger) => println!(
            "{} {:<5} [{}] {}",
            entry.timestamp.as_deref().unwrap_or("-"),
            entry.level.to_uppercase(),
            logger,
            entry.message
        ),
        None => println!("{:<5} {}", entry.level.to_uppercase(), entry.message),
    }
}

async fn logs(client: &SyncClient, follow: bool) -> anyhow::Result<()> {
    let (handle, task) = client.spawn_logs()?;
    let mut last_id = 0;
    if follow {
        println!("📡 Following agent logs, Ctrl-C to stop");
        let mut tick = tokio::time::interval(Duration::from_millis(250));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    for entry in client.log_manager.get_logs_since(last_id) {
                        print_log_entry(&entry);
                        last_id = entry.id;
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    } else {
        let pb = spinner("Fetching logs...")?;
        tokio::time::sleep(SETTLE).await;
        pb.finish_and_clear();
        for entry in client.log_manager.get_logs(None) {
            print_log_entry(&entry);
        }
    }
    handle.close()?;
    let _ = task.await;
    Ok(())
}

async fn settings(client: &SyncClient) -> anyhow::Result<()> {
    let settings = client.api.get_settings().await?;
    print!("{}", serde_yaml::to_string(&settings)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli {
        config,
        agent,
        verbose,
        command,
    } = Cli::parse();
    init_tracing(verbose.then_some("syncdesk_lib=debug"));

    if let Command::Schedule { action } = command {
        return schedule(action);
    }

    let client = build_client(config, agent)?;
    match command {
        Command::Tasks => print_tasks(&client).await,
        Command::Cmd { command, task } => send_command(&client, command.into(), task).await,
        Command::Tree { endpoint, path } => browse(&client, endpoint, path).await,
        Command::History {
            task,
            offset,
            limit,
            details,
        } => print_history(&client, task, offset, limit, details).await,
        Command::Logs { follow } => logs(&client, follow).await,
        Command::Settings => settings(&client).await,
        Command::Schedule { .. } => Ok(()),
    }
}
