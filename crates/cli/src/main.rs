// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! haku - operator CLI for the HAKU cluster manager.

mod client;
mod color;
mod output;
mod table;

use std::collections::HashMap;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use haku_core::TaskId;
use haku_proto::{parse_target, SubmitRequest, TargetSpec};

use client::{ClientError, HostClient};
use output::OutputFormat;
use table::{Column, Table};

#[derive(Parser)]
#[command(
    name = "haku",
    version,
    about = "Operator CLI for the HAKU cluster manager",
    styles = color::styles()
)]
struct Cli {
    /// Host HTTP control surface, e.g. http://node0:7780
    #[arg(long = "host", global = true, env = "HAKU_HOST", default_value = "http://127.0.0.1:7780")]
    host: String,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a task (command or vps)
    Submit(SubmitArgs),
    /// Show a task's current record
    Status { task_id: u64 },
    /// Stop a task (best-effort)
    Kill { task_id: u64 },
    /// Pause a running task
    Pause { task_id: u64 },
    /// Resume a paused task
    Resume { task_id: u64 },
    /// Fetch a task's captured stdout/stderr
    Logs {
        task_id: u64,
        /// Read stderr instead of stdout
        #[arg(long)]
        stderr: bool,
        /// Re-fetch and print again every second until interrupted
        #[arg(long, short)]
        follow: bool,
    },
    /// List registered nodes and their liveness
    Nodes,
    /// Cluster-wide health summary
    Health,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliTaskType {
    Command,
    Vps,
}

impl From<CliTaskType> for haku_core::TaskType {
    fn from(t: CliTaskType) -> Self {
        match t {
            CliTaskType::Command => haku_core::TaskType::Command,
            CliTaskType::Vps => haku_core::TaskType::Vps,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliPrivileged {
    True,
    False,
    Inherit,
}

impl From<CliPrivileged> for haku_core::Privileged {
    fn from(p: CliPrivileged) -> Self {
        match p {
            CliPrivileged::True => haku_core::Privileged::True,
            CliPrivileged::False => haku_core::Privileged::False,
            CliPrivileged::Inherit => haku_core::Privileged::Inherit,
        }
    }
}

#[derive(clap::Args)]
struct SubmitArgs {
    /// command: runs to completion; vps: long-lived, exposes ssh
    #[arg(value_enum)]
    task_type: CliTaskType,

    /// Executable (command) or submitted public key (vps)
    command: String,

    /// Arguments passed to the command (ignored for vps)
    arguments: Vec<String>,

    /// Target: `hostname`, `hostname:numa_id`, or `hostname::gpu,gpu,...`.
    /// Repeatable; omit entirely to auto-select any online node that fits.
    #[arg(long = "target")]
    targets: Vec<String>,

    /// `KEY=VALUE`, repeatable
    #[arg(long = "env")]
    env: Vec<String>,

    /// Requested cores (0 = auto)
    #[arg(long, default_value_t = 0)]
    cores: u32,

    /// Requested memory in bytes
    #[arg(long = "memory-bytes")]
    memory_bytes: Option<u64>,

    /// Named environment to run in; omit for the host default, "NONE" for
    /// the OS-service-unit fallback
    #[arg(long = "env-name")]
    env_name: Option<String>,

    #[arg(long, value_enum, default_value_t = CliPrivileged::Inherit)]
    privileged: CliPrivileged,

    /// `host:container[:mode]`, repeatable
    #[arg(long = "mount")]
    mounts: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = HostClient::new(cli.host);
    match run(client, cli.output, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(client: HostClient, output: OutputFormat, command: Commands) -> Result<()> {
    match command {
        Commands::Submit(args) => submit(&client, output, args).await,
        Commands::Status { task_id } => status(&client, output, TaskId(task_id)).await,
        Commands::Kill { task_id } => {
            let resp = client.kill(TaskId(task_id)).await.map_err(render_client_error)?;
            report_lifecycle("kill", TaskId(task_id), resp)
        }
        Commands::Pause { task_id } => {
            let resp = client.pause(TaskId(task_id)).await.map_err(render_client_error)?;
            report_lifecycle("pause", TaskId(task_id), resp)
        }
        Commands::Resume { task_id } => {
            let resp = client.resume(TaskId(task_id)).await.map_err(render_client_error)?;
            report_lifecycle("resume", TaskId(task_id), resp)
        }
        Commands::Logs { task_id, stderr, follow } => {
            logs(&client, output, TaskId(task_id), stderr, follow).await
        }
        Commands::Nodes => nodes(&client, output).await,
        Commands::Health => health(&client, output).await,
    }
}

async fn submit(client: &HostClient, output: OutputFormat, args: SubmitArgs) -> Result<()> {
    let mut env_vars = HashMap::new();
    for kv in &args.env {
        let (k, v) = kv
            .split_once('=')
            .with_context(|| format!("--env expects KEY=VALUE, got {kv:?}"))?;
        env_vars.insert(k.to_string(), v.to_string());
    }

    let targets: Vec<TargetSpec> = args
        .targets
        .iter()
        .map(|raw| parse_target(raw).map_err(|e| anyhow::anyhow!(e)))
        .collect::<Result<_>>()?;

    let req = SubmitRequest {
        task_type: args.task_type.into(),
        command: args.command,
        arguments: args.arguments,
        env_vars,
        required_cores: args.cores,
        required_memory_bytes: args.memory_bytes,
        container_env_name: args.env_name,
        privileged: args.privileged.into(),
        additional_mounts: args.mounts,
        targets,
    };

    let resp = client.submit(&req).await.map_err(render_client_error)?;

    match output {
        OutputFormat::Text => {
            for id in &resp.created_task_ids {
                println!("{id}");
            }
            for failed in &resp.failed_targets {
                eprintln!("target {} rejected: {}", failed.target, failed.reason);
            }
            if resp.created_task_ids.is_empty() {
                bail!("no tasks created");
            }
        }
        OutputFormat::Json => print_json(&resp)?,
    }
    Ok(())
}

async fn status(client: &HostClient, output: OutputFormat, task_id: TaskId) -> Result<()> {
    let resp = client.status(task_id).await.map_err(render_client_error)?;
    match output {
        OutputFormat::Text => print_task(&resp.task),
        OutputFormat::Json => print_json(&resp)?,
    }
    Ok(())
}

fn report_lifecycle(verb: &str, task_id: TaskId, resp: haku_proto::LifecycleResponse) -> Result<()> {
    if resp.ok {
        println!("task {task_id} {verb} accepted");
        Ok(())
    } else {
        bail!(resp.message.unwrap_or_else(|| format!("{verb} rejected")))
    }
}

async fn logs(
    client: &HostClient,
    output: OutputFormat,
    task_id: TaskId,
    want_stderr: bool,
    follow: bool,
) -> Result<()> {
    let label = if want_stderr { "stderr" } else { "stdout" };
    loop {
        let content = if want_stderr {
            client.stderr(task_id).await
        } else {
            client.stdout(task_id).await
        }
        .map_err(render_client_error)?;
        let task_id_str = task_id.to_string();
        output::print_log_snapshot(&content, output, label, &task_id_str);
        if !follow {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}

async fn nodes(client: &HostClient, output: OutputFormat) -> Result<()> {
    let resp = client.nodes().await.map_err(render_client_error)?;
    match output {
        OutputFormat::Text => {
            let mut table = Table::new(vec![
                Column::left("HOSTNAME"),
                Column::status("LIVENESS"),
                Column::right("CORES"),
                Column::right("MEM_PCT"),
                Column::right("CPU_PCT"),
                Column::right("GPUS"),
                Column::left("ENDPOINT"),
            ]);
            for n in &resp.nodes {
                table.row(vec![
                    n.hostname.to_string(),
                    liveness_label(n.liveness).to_string(),
                    n.total_cores.to_string(),
                    format!("{:.0}", n.last_memory_pct),
                    format!("{:.0}", n.last_cpu_pct),
                    n.gpu_count.to_string(),
                    n.endpoint.clone(),
                ]);
            }
            table.render(&mut std::io::stdout());
        }
        OutputFormat::Json => print_json(&resp)?,
    }
    Ok(())
}

async fn health(client: &HostClient, output: OutputFormat) -> Result<()> {
    let resp = client.health().await.map_err(render_client_error)?;
    match output {
        OutputFormat::Text => {
            println!(
                "nodes: {} online, {} offline, {} lost",
                resp.nodes_online, resp.nodes_offline, resp.nodes_lost
            );
            println!(
                "tasks: {} pending, {} running, {} terminal",
                resp.tasks_pending, resp.tasks_running, resp.tasks_terminal
            );
        }
        OutputFormat::Json => print_json(&resp)?,
    }
    Ok(())
}

fn print_task(task: &haku_core::Task) {
    let mut table = Table::new(vec![Column::left("FIELD"), Column::left("VALUE")]);
    table.row(vec!["task_id".into(), task.task_id.to_string()]);
    if let Some(batch_id) = task.batch_id {
        table.row(vec!["batch_id".into(), batch_id.to_string()]);
    }
    table.row(vec!["status".into(), liveness_status_label(task.status).to_string()]);
    table.row(vec!["target_hostname".into(), task.target_hostname.to_string()]);
    table.row(vec!["command".into(), task.command.clone()]);
    if let Some(code) = task.exit_code {
        table.row(vec!["exit_code".into(), code.to_string()]);
    }
    if let Some(msg) = &task.error_message {
        table.row(vec!["error".into(), msg.clone()]);
    }
    if let Some(port) = task.ssh_port {
        table.row(vec!["ssh_port".into(), port.to_string()]);
    }
    table.render(&mut std::io::stdout());
}

fn liveness_label(l: haku_core::NodeLiveness) -> &'static str {
    match l {
        haku_core::NodeLiveness::Online => "online",
        haku_core::NodeLiveness::Offline => "offline",
        haku_core::NodeLiveness::Lost => "lost",
    }
}

fn liveness_status_label(s: haku_core::TaskStatus) -> &'static str {
    use haku_core::TaskStatus::*;
    match s {
        Pending => "pending",
        Assigning => "assigning",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Killed => "killed",
        KilledOom => "killed_oom",
        Lost => "lost",
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_client_error(e: ClientError) -> anyhow::Error {
    anyhow::anyhow!(e)
}
