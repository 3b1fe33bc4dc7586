//! `nap app`: deploy and operate applications.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{ArgGroup, Args, Subcommand, ValueEnum};
use nap_control::apps::{self, AppReport};
use nap_control::volumes::{self, VolumeSpec};
use nap_control::{ControlError, DeployRequest, DeploySettings, publish};
use nap_core::StrategyKind;
use nap_core::config::parse_memory;
use nap_engine::{DockerClient, LogOptions, StreamKind};
use nap_rollout::ScaleRequest;
use nap_state::{AppStatus, Application, VolumeType};
use serde_json::json;
use tokio::task::JoinSet;

use super::output::{confirm, or_dash, print_json, print_table, timestamp};
use super::{open_context, progress, registries};

#[derive(Subcommand)]
pub enum AppCommand {
    /// Build (or pull) and deploy an app
    Deploy(DeployArgs),
    /// List apps
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show an app and its instances
    Status {
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Stop every instance
    Stop { name: String },
    /// Start stopped instances
    Start { name: String },
    /// Recreate every instance in place
    Restart { name: String },
    /// Remove the app, its containers and its links (volumes are kept)
    Destroy {
        name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Change the instance count
    Scale(ScaleArgs),
    /// Print container output
    Logs {
        name: String,
        /// Only this instance (1-based)
        #[arg(short, long)]
        instance: Option<usize>,
        #[arg(short, long)]
        follow: bool,
        /// Lines from the end of each log
        #[arg(long)]
        tail: Option<u32>,
    },
    /// Run a command inside an instance
    Console {
        name: String,
        #[arg(short, long, default_value_t = 1)]
        instance: usize,
        /// Command to run (default: print the environment)
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Manage environment variables
    Env {
        #[command(subcommand)]
        action: EnvCommand,
    },
    /// Databases linked to the app
    Databases { name: String },
    /// Inject a database's connection env into the app
    Link { app: String, db: String },
    /// Remove a database link
    Unlink {
        app: String,
        db: String,
        #[arg(short, long)]
        force: bool,
    },
    /// Route public HTTPS traffic to the app
    Publish {
        name: String,
        /// Domain to publish on (default: {app}.nap.{base_domain})
        #[arg(long)]
        domain: Option<String>,
    },
    /// Stop routing public traffic to the app
    Unpublish { name: String },
    /// Manage custom domains
    Domain {
        #[command(subcommand)]
        action: DomainCommand,
    },
    /// Manage persistent volumes
    Volume {
        #[command(subcommand)]
        action: VolumeCommand,
    },
    /// Deployment history
    Deployments { name: String },
    /// Blue-green deployment control
    Deployment {
        #[command(subcommand)]
        action: DeploymentCommand,
    },
    /// Redeploy an earlier image from the history
    Rollback {
        name: String,
        /// History entry to restore (0 = the previous one)
        #[arg(long, default_value_t = 0)]
        version: usize,
    },
}

#[derive(Args)]
pub struct DeployArgs {
    name: String,
    /// Source directory with nap.toml and a Dockerfile
    #[arg(default_value = ".")]
    path: PathBuf,
    /// Deploy this image instead of building the source
    #[arg(long)]
    image: Option<String>,
    #[arg(long)]
    vpc: Option<String>,
    #[arg(long)]
    instances: Option<u32>,
    /// Memory limit, e.g. 512m or 1g
    #[arg(long)]
    memory: Option<String>,
    #[arg(long)]
    cpu: Option<f64>,
    /// Port the app listens on
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    health_path: Option<String>,
    /// recreate, rolling or blue-green
    #[arg(long)]
    strategy: Option<String>,
    #[arg(long)]
    max_surge: Option<u32>,
    /// Seconds between rolling replacements
    #[arg(long)]
    rolling_interval: Option<u32>,
    /// Seconds to wait for an instance to become healthy
    #[arg(long)]
    health_timeout: Option<u32>,
    /// Switch blue-green traffic without waiting for confirmation
    #[arg(long)]
    auto_confirm: bool,
}

impl DeployArgs {
    fn settings(&self) -> anyhow::Result<DeploySettings> {
        let memory_mb = match &self.memory {
            Some(m) => Some(parse_memory(m).map_err(ControlError::from)?),
            None => None,
        };
        let strategy = match &self.strategy {
            Some(s) => Some(s.parse::<StrategyKind>().map_err(ControlError::from)?),
            None => None,
        };
        Ok(DeploySettings {
            vpc: self.vpc.clone(),
            instances: self.instances,
            memory_mb,
            cpu: self.cpu,
            port: self.port,
            health_path: self.health_path.clone(),
            strategy,
            max_surge: self.max_surge,
            rolling_interval: self.rolling_interval,
            health_timeout: self.health_timeout,
            auto_confirm: self.auto_confirm.then_some(true),
        })
    }
}

#[derive(Args)]
#[command(group(ArgGroup::new("count").required(true).args(["instances", "add", "remove"])))]
pub struct ScaleArgs {
    name: String,
    /// Set the instance count
    #[arg(long)]
    instances: Option<u32>,
    /// Add this many instances
    #[arg(long)]
    add: Option<u32>,
    /// Remove this many instances
    #[arg(long)]
    remove: Option<u32>,
}

impl ScaleArgs {
    fn request(&self) -> ScaleRequest {
        match (self.instances, self.add, self.remove) {
            (Some(n), _, _) => ScaleRequest::Instances(n),
            (_, Some(n), _) => ScaleRequest::Add(n),
            (_, _, Some(n)) => ScaleRequest::Remove(n),
            (None, None, None) => ScaleRequest::Add(0),
        }
    }
}

#[derive(Subcommand)]
pub enum EnvCommand {
    /// Set KEY=VALUE pairs
    Set {
        name: String,
        #[arg(required = true)]
        vars: Vec<String>,
    },
    /// Remove keys
    Unset {
        name: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Print the app's variables
    List { name: String },
    /// Merge variables from a .env file
    Import { name: String, file: PathBuf },
    /// Write the variables as a .env file
    Export {
        name: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum DomainCommand {
    Add { name: String, domain: String },
    Remove { name: String, domain: String },
    List { name: String },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum VolumeKind {
    Volume,
    Bind,
}

impl From<VolumeKind> for VolumeType {
    fn from(kind: VolumeKind) -> Self {
        match kind {
            VolumeKind::Volume => VolumeType::Volume,
            VolumeKind::Bind => VolumeType::Bind,
        }
    }
}

#[derive(Subcommand)]
pub enum VolumeCommand {
    /// Attach a volume; running instances are recreated
    Add {
        name: String,
        volume: String,
        /// Absolute path inside the container
        mount: String,
        #[arg(long = "type", value_enum, default_value = "volume")]
        kind: VolumeKind,
        /// Host path for bind mounts
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        read_only: bool,
        #[arg(long)]
        size: Option<String>,
    },
    /// Detach a volume
    Remove {
        name: String,
        volume: String,
        /// Also delete the engine volume and its data
        #[arg(long)]
        delete_data: bool,
    },
    List { name: String },
    Inspect { name: String, volume: String },
    /// Recorded backups
    Backups { name: String, volume: Option<String> },
}

#[derive(Subcommand)]
pub enum DeploymentCommand {
    /// Show the blue-green environments
    Status { name: String },
    /// Switch traffic to the standby environment
    Confirm { name: String },
    /// Discard the standby environment
    Rollback { name: String },
}

pub async fn run(command: AppCommand) -> anyhow::Result<ExitCode> {
    match command {
        AppCommand::Deploy(args) => deploy(args).await?,
        AppCommand::List { json } => list(json)?,
        AppCommand::Status { name, json } => status(&name, json).await?,
        AppCommand::Stop { name } => {
            let ctx = open_context()?;
            apps::stop_app(&ctx, &name).await?;
            println!("✓ Stopped {name}");
        }
        AppCommand::Start { name } => {
            let ctx = open_context()?;
            apps::start_app(&ctx, &name).await?;
            println!("✓ Started {name}");
        }
        AppCommand::Restart { name } => {
            let ctx = open_context()?;
            let app = apps::restart_app(&ctx, &name).await?;
            println!("✓ Restarted {name} ({} instances)", app.container_ids.len());
        }
        AppCommand::Destroy { name, force } => {
            if !force && !confirm(&format!("Destroy app '{name}'? Volumes are kept."))? {
                println!("Aborted.");
                return Ok(ExitCode::SUCCESS);
            }
            let ctx = open_context()?;
            apps::destroy_app(&ctx, &name).await?;
            println!("✓ Destroyed {name}");
        }
        AppCommand::Scale(args) => {
            let ctx = open_context()?;
            let app = apps::scale_app(&ctx, &args.name, args.request()).await?;
            println!("✓ Scaled {} to {} instances", app.name, app.instances);
        }
        AppCommand::Logs { name, instance, follow, tail } => logs(&name, instance, follow, tail).await?,
        AppCommand::Console { name, instance, command } => return console(&name, instance, command).await,
        AppCommand::Env { action } => env(action).await?,
        AppCommand::Databases { name } => {
            let ctx = open_context()?;
            let dbs = apps::linked_databases(&ctx, &name)?;
            if dbs.is_empty() {
                println!("{name} has no linked databases");
            }
            for db in dbs {
                println!("{db}");
            }
        }
        AppCommand::Link { app, db } => {
            let ctx = open_context()?;
            let linked = nap_control::link(&ctx, &app, &db).await?;
            println!("✓ Linked {db} to {app}");
            println!("  {} instances recreated with the connection env", linked.container_ids.len());
        }
        AppCommand::Unlink { app, db, force } => {
            if !force && !confirm(&format!("Unlink '{db}' from '{app}'? Its connection env is removed."))? {
                println!("Aborted.");
                return Ok(ExitCode::SUCCESS);
            }
            let ctx = open_context()?;
            nap_control::unlink(&ctx, &app, &db).await?;
            println!("✓ Unlinked {db} from {app}");
        }
        AppCommand::Publish { name, domain } => {
            let ctx = open_context()?;
            let app = publish::publish(&ctx, &name, domain.as_deref(), &progress).await?;
            println!("✓ Published {name} at {}", app.published_url);
        }
        AppCommand::Unpublish { name } => {
            let ctx = open_context()?;
            let app = publish::unpublish(&ctx, &name, &progress).await?;
            println!("✓ Unpublished {name}; reachable at {}", app.published_url);
        }
        AppCommand::Domain { action } => domain(action).await?,
        AppCommand::Volume { action } => volume(action).await?,
        AppCommand::Deployments { name } => deployments(&name)?,
        AppCommand::Deployment { action } => deployment(action).await?,
        AppCommand::Rollback { name, version } => {
            let ctx = open_context()?;
            let app = apps::rollback_version(&ctx, &name, version).await?;
            println!("✓ Rolled {name} back to {}", app.image_id);
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ── Deploy ─────────────────────────────────────────────────────────

async fn deploy(args: DeployArgs) -> anyhow::Result<()> {
    let settings = args.settings()?;
    let ctx = open_context()?;
    let mut request = DeployRequest::new(&args.name, &args.path);
    if let Some(image) = &args.image {
        request = request.with_image(image);
    }
    request.settings = settings;

    println!("Deploying {}...", args.name);
    let app = nap_control::deploy(&ctx, &request, &progress).await?;

    println!(
        "✓ Deployed {} ({} instances, {})",
        app.name,
        app.container_ids.len(),
        app.deployment_strategy
    );
    println!("  {}", app.published_url);
    if app.deployment_state.live_standby().is_some() {
        println!("  New version is running on standby. Switch traffic with:");
        println!("    nap app deployment confirm {}", app.name);
    }
    Ok(())
}

// ── Listing ────────────────────────────────────────────────────────

fn list(json: bool) -> anyhow::Result<()> {
    let apps = registries()?.apps.list().map_err(ControlError::from)?;
    if json {
        return print_json(&apps);
    }
    if apps.is_empty() {
        println!("No apps. Deploy one with 'nap app deploy <name>'.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = apps
        .iter()
        .map(|a| {
            vec![
                a.name.clone(),
                a.status.to_string(),
                format!("{}/{}", a.container_ids.len(), a.instances),
                a.vpc.clone(),
                a.deployment_strategy.to_string(),
                a.published_url.clone(),
            ]
        })
        .collect();
    print_table(&["NAME", "STATUS", "INSTANCES", "VPC", "STRATEGY", "URL"], &rows);
    Ok(())
}

async fn status(name: &str, json: bool) -> anyhow::Result<()> {
    let ctx = open_context()?;
    let report = apps::app_status(&ctx, name).await?;
    if json {
        return print_json(&report_json(&report));
    }

    let app = &report.app;
    println!("App:        {}", app.name);
    println!("Status:     {}", app.status);
    println!("VPC:        {}", app.vpc);
    println!("Image:      {}", or_dash(&app.image_id));
    println!("Strategy:   {}", app.deployment_strategy);
    println!("Resources:  {} MB, {} CPU", app.memory, app.cpu);
    println!("URL:        {}", app.published_url);
    if !app.custom_domains.is_empty() {
        println!("Domains:    {}", app.custom_domains.join(", "));
    }
    if let Some(at) = &app.last_deployed_at {
        println!("Deployed:   {}", timestamp(at));
    }
    println!();

    let rows: Vec<Vec<String>> = report
        .instances
        .iter()
        .map(|i| {
            vec![
                i.instance.to_string(),
                i.name.clone(),
                nap_engine::short_id(&i.container_id).to_string(),
                i.state.as_ref().map_or_else(|| "missing".to_string(), |s| s.status.clone()),
            ]
        })
        .collect();
    print_table(&["#", "CONTAINER", "ID", "STATE"], &rows);
    if app.status == AppStatus::Failed {
        println!();
        println!("The last deploy failed. Check 'nap app logs {}'.", app.name);
    }
    Ok(())
}

fn report_json(report: &AppReport) -> serde_json::Value {
    let instances: Vec<serde_json::Value> = report
        .instances
        .iter()
        .map(|i| {
            json!({
                "instance": i.instance,
                "container_id": i.container_id,
                "name": i.name,
                "state": i.state.as_ref().map(|s| s.status.clone()),
                "running": i.state.as_ref().is_some_and(|s| s.running),
            })
        })
        .collect();
    json!({ "app": report.app, "instances": instances })
}

// ── Logs and console ───────────────────────────────────────────────

/// Writes output chunks with a prefix at the start of every line.
struct PrefixedWriter {
    prefix: String,
    at_line_start: bool,
}

impl PrefixedWriter {
    fn write(&mut self, kind: StreamKind, chunk: &[u8]) {
        let mut buf = Vec::with_capacity(chunk.len() + self.prefix.len());
        for &byte in chunk {
            if self.at_line_start {
                buf.extend_from_slice(self.prefix.as_bytes());
            }
            buf.push(byte);
            self.at_line_start = byte == b'\n';
        }
        // Broken pipes (e.g. `| head`) just end the output.
        let _ = match kind {
            StreamKind::Stderr => std::io::stderr().lock().write_all(&buf),
            _ => std::io::stdout().lock().write_all(&buf),
        };
    }
}

async fn logs(name: &str, instance: Option<usize>, follow: bool, tail: Option<u32>) -> anyhow::Result<()> {
    let ctx = open_context()?;
    let targets = apps::instance_containers(&ctx, name, instance)?;
    let options = LogOptions { follow, tail };
    let prefixed = targets.len() > 1;

    let mut tasks = JoinSet::new();
    for (n, id) in targets {
        let client = DockerClient::new(ctx.engine.runtime().clone());
        let options = options.clone();
        let mut writer = PrefixedWriter {
            prefix: if prefixed { format!("[{n}] ") } else { String::new() },
            at_line_start: true,
        };
        tasks.spawn(async move {
            let mut sink = |kind: StreamKind, chunk: &[u8]| writer.write(kind, chunk);
            client.logs(&id, &options, &mut sink).await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.context("log stream task")?.map_err(ControlError::from)?;
    }
    Ok(())
}

async fn console(name: &str, instance: usize, command: Vec<String>) -> anyhow::Result<ExitCode> {
    let ctx = open_context()?;
    let targets = apps::instance_containers(&ctx, name, Some(instance))?;
    let command = if command.is_empty() {
        vec!["/bin/sh".to_string(), "-c".to_string(), "env".to_string()]
    } else {
        command
    };

    let mut exit = ExitCode::SUCCESS;
    for (_, id) in targets {
        let output = ctx.engine.exec(&id, &command, &[]).await.map_err(ControlError::from)?;
        std::io::stdout().write_all(&output.stdout)?;
        std::io::stderr().write_all(&output.stderr)?;
        if output.exit_code != 0 {
            exit = ExitCode::from(u8::try_from(output.exit_code).unwrap_or(1));
        }
    }
    Ok(exit)
}

// ── Env ────────────────────────────────────────────────────────────

fn parse_assignments(vars: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for var in vars {
        let Some((key, value)) = var.split_once('=') else {
            return Err(ControlError::Validation(format!("expected KEY=VALUE, got '{var}'")).into());
        };
        out.insert(key.to_string(), value.to_string());
    }
    Ok(out)
}

async fn env(action: EnvCommand) -> anyhow::Result<()> {
    match action {
        EnvCommand::Set { name, vars } => {
            let vars = parse_assignments(&vars)?;
            let ctx = open_context()?;
            let keys: Vec<String> = vars.keys().cloned().collect();
            apps::env_set(&ctx, &name, vars).await?;
            println!("✓ Set {} on {name}", keys.join(", "));
        }
        EnvCommand::Unset { name, keys } => {
            let ctx = open_context()?;
            apps::env_unset(&ctx, &name, &keys).await?;
            println!("✓ Removed {} from {name}", keys.join(", "));
        }
        EnvCommand::List { name } => {
            let app: Application = registries()?.apps.get(&name).map_err(ControlError::from)?;
            if app.env_vars.is_empty() {
                println!("{name} has no environment variables");
            }
            for (key, value) in &app.env_vars {
                println!("{key}={value}");
            }
        }
        EnvCommand::Import { name, file } => {
            let ctx = open_context()?;
            let app = apps::env_import(&ctx, &name, &file).await?;
            println!("✓ Imported {} into {name} ({} variables)", file.display(), app.env_vars.len());
        }
        EnvCommand::Export { name, output } => {
            let ctx = open_context()?;
            let rendered = apps::env_export(&ctx, &name)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered).with_context(|| format!("writing {}", path.display()))?;
                    println!("✓ Exported {name} env to {}", path.display());
                }
                None => print!("{rendered}"),
            }
        }
    }
    Ok(())
}

// ── Domains ────────────────────────────────────────────────────────

async fn domain(action: DomainCommand) -> anyhow::Result<()> {
    match action {
        DomainCommand::Add { name, domain } => {
            let ctx = open_context()?;
            publish::domain_add(&ctx, &name, &domain, &progress).await?;
            println!("✓ {name} now answers on https://{domain}");
        }
        DomainCommand::Remove { name, domain } => {
            let ctx = open_context()?;
            publish::domain_remove(&ctx, &name, &domain, &progress).await?;
            println!("✓ Removed {domain} from {name}");
        }
        DomainCommand::List { name } => {
            let app = registries()?.apps.get(&name).map_err(ControlError::from)?;
            let domains = app.routed_domains();
            if domains.is_empty() {
                println!("{name} is not published");
            }
            for (i, domain) in domains.iter().enumerate() {
                let role = if i == 0 { "primary" } else { "custom" };
                println!("{domain}  ({role})");
            }
        }
    }
    Ok(())
}

// ── Volumes ────────────────────────────────────────────────────────

async fn volume(action: VolumeCommand) -> anyhow::Result<()> {
    match action {
        VolumeCommand::Add { name, volume, mount, kind, source, read_only, size } => {
            let ctx = open_context()?;
            let spec = VolumeSpec {
                name: volume,
                mount_path: mount,
                kind: kind.into(),
                source,
                read_only,
                size,
            };
            let added = volumes::add_volume(&ctx, &name, spec).await?;
            println!("✓ Mounted {} at {} on {name}", added.name, added.mount_path);
        }
        VolumeCommand::Remove { name, volume, delete_data } => {
            let ctx = open_context()?;
            volumes::remove_volume(&ctx, &name, &volume, delete_data).await?;
            if delete_data {
                println!("✓ Removed {volume} from {name} and deleted its data");
            } else {
                println!("✓ Detached {volume} from {name}; data kept");
            }
        }
        VolumeCommand::List { name } => {
            let app = registries()?.apps.get(&name).map_err(ControlError::from)?;
            let rows: Vec<Vec<String>> = app
                .volumes
                .iter()
                .map(|v| {
                    vec![
                        v.name.clone(),
                        v.kind.to_string(),
                        v.mount_path.clone(),
                        v.mount_source(&app.name),
                        if v.read_only { "ro" } else { "rw" }.to_string(),
                    ]
                })
                .collect();
            print_table(&["NAME", "TYPE", "MOUNT", "SOURCE", "MODE"], &rows);
        }
        VolumeCommand::Inspect { name, volume } => {
            let ctx = open_context()?;
            let report = volumes::inspect_volume(&ctx, &name, &volume).await?;
            let v = &report.volume;
            println!("Volume:     {}", v.name);
            println!("Type:       {}", v.kind);
            println!("Mount:      {}", v.mount_path);
            println!("Source:     {}", report.source);
            println!("Read-only:  {}", v.read_only);
            println!("Size:       {}", or_dash(&v.size));
            println!("Created:    {}", timestamp(&v.created_at));
            if let Some(info) = &report.engine {
                println!("Driver:     {}", info.driver);
                println!("Host path:  {}", info.mountpoint);
            }
            println!("Mounted by: {} containers", report.mounted_by);
        }
        VolumeCommand::Backups { name, volume } => {
            let ctx = open_context()?;
            let backups = volumes::list_backups(&ctx, &name, volume.as_deref())?;
            let rows: Vec<Vec<String>> = backups
                .iter()
                .map(|b| {
                    vec![
                        b.id.clone(),
                        b.volume_name.clone(),
                        timestamp(&b.created_at),
                        b.status.clone(),
                        b.file_path.clone(),
                    ]
                })
                .collect();
            print_table(&["ID", "VOLUME", "CREATED", "STATUS", "FILE"], &rows);
        }
    }
    Ok(())
}

// ── Deployments ────────────────────────────────────────────────────

fn deployments(name: &str) -> anyhow::Result<()> {
    let app = registries()?.apps.get(name).map_err(ControlError::from)?;
    if app.deployment_history.is_empty() {
        println!("{name} has not been deployed");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = app
        .deployment_history
        .iter()
        .enumerate()
        .rev()
        .map(|(i, r)| {
            vec![
                (i + 1).to_string(),
                r.image_id.clone(),
                r.strategy.to_string(),
                timestamp(&r.deployed_at),
                r.status.to_string(),
            ]
        })
        .collect();
    print_table(&["VERSION", "IMAGE", "STRATEGY", "DEPLOYED", "STATUS"], &rows);
    Ok(())
}

async fn deployment(action: DeploymentCommand) -> anyhow::Result<()> {
    match action {
        DeploymentCommand::Status { name } => {
            let app = registries()?.apps.get(&name).map_err(ControlError::from)?;
            let state = &app.deployment_state;
            let Some(active) = state.active else {
                println!("{name} has no blue-green environments");
                return Ok(());
            };
            println!("Active:  {active}");
            if let Some(env) = state.environment(active) {
                println!("  image {} ({} containers)", env.image_id, env.container_ids.len());
            }
            match state.live_standby() {
                Some((color, env)) => {
                    println!("Standby: {color}");
                    println!("  image {} ({} containers)", env.image_id, env.container_ids.len());
                    println!("  deployed {}", timestamp(&env.deployed_at));
                    println!();
                    println!("Confirm with 'nap app deployment confirm {name}'");
                    println!("or discard with 'nap app deployment rollback {name}'.");
                }
                None => println!("Standby: none"),
            }
        }
        DeploymentCommand::Confirm { name } => {
            let ctx = open_context()?;
            let app = apps::confirm_deployment(&ctx, &name).await?;
            let color = app.deployment_state.active.map_or_else(String::new, |c| c.to_string());
            println!("✓ Traffic for {name} switched to {color}");
        }
        DeploymentCommand::Rollback { name } => {
            let ctx = open_context()?;
            apps::rollback_deployment(&ctx, &name).await?;
            println!("✓ Discarded the standby environment of {name}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_split_on_first_equals() {
        let vars = parse_assignments(&["A=1".into(), "URL=x=y".into()]).unwrap();
        assert_eq!(vars["A"], "1");
        assert_eq!(vars["URL"], "x=y");
        assert!(parse_assignments(&["BROKEN".into()]).is_err());
    }

    #[test]
    fn scale_args_pick_the_given_flag() {
        let args = ScaleArgs { name: "web".into(), instances: None, add: Some(2), remove: None };
        assert_eq!(args.request(), ScaleRequest::Add(2));
    }

    #[test]
    fn prefixed_writer_prefixes_each_line() {
        let mut w = PrefixedWriter { prefix: "[2] ".into(), at_line_start: true };
        w.write(StreamKind::Stdout, b"");
        assert!(w.at_line_start);
        w.write(StreamKind::Stdout, b"partial");
        assert!(!w.at_line_start);
        w.write(StreamKind::Stdout, b" line\n");
        assert!(w.at_line_start);
    }

    #[test]
    fn deploy_flags_convert_units() {
        let args = DeployArgs {
            name: "web".into(),
            path: PathBuf::from("."),
            image: None,
            vpc: None,
            instances: Some(2),
            memory: Some("1g".into()),
            cpu: None,
            port: None,
            health_path: None,
            strategy: Some("blue-green".into()),
            max_surge: None,
            rolling_interval: None,
            health_timeout: None,
            auto_confirm: false,
        };
        let settings = args.settings().unwrap();
        assert_eq!(settings.memory_mb, Some(1024));
        assert_eq!(settings.strategy, Some(StrategyKind::BlueGreen));
        assert_eq!(settings.auto_confirm, None);
    }
}
