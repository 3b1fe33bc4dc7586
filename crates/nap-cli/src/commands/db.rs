//! `nap db`: managed Postgres and Valkey instances.

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Subcommand;
use nap_control::databases::{self, CreateDatabase, shell_command};
use nap_control::ControlError;
use nap_core::naming::DEFAULT_VPC;
use nap_engine::{DockerClient, LogOptions, StreamKind};
use nap_state::DbType;

use super::output::{confirm, or_dash, print_json, print_table, timestamp};
use super::{open_context, progress, registries};

#[derive(Subcommand)]
pub enum DbCommand {
    /// Provision a database container with its own volume
    Create {
        /// postgres or valkey
        kind: String,
        name: String,
        #[arg(long, default_value = DEFAULT_VPC)]
        vpc: String,
        /// Use this password instead of a generated one
        #[arg(long)]
        password: Option<String>,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Status { name: String },
    /// Print connection details
    Credentials { name: String },
    Start { name: String },
    Stop { name: String },
    /// Remove the container and its data volume
    Destroy {
        name: String,
        /// Skip the prompt and destroy even when apps are linked
        #[arg(short, long)]
        force: bool,
    },
    Logs {
        name: String,
        #[arg(short, long)]
        follow: bool,
        #[arg(long)]
        tail: Option<u32>,
    },
    /// Run one client command inside the database container
    Shell {
        name: String,
        #[arg(short, long, num_args = 1.., required = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Apps linked to the database
    Apps { name: String },
    /// Bind the database port on the host
    Publish {
        name: String,
        #[arg(long)]
        port: u16,
    },
    /// Remove the host port binding
    Unpublish { name: String },
}

pub async fn run(command: DbCommand) -> anyhow::Result<ExitCode> {
    match command {
        DbCommand::Create { kind, name, vpc, password } => {
            let kind: DbType = kind.parse().map_err(ControlError::from)?;
            let ctx = open_context()?;
            println!("Creating {kind} database {name}...");
            let db = databases::create_database(&ctx, CreateDatabase { name, kind, vpc, password }, &progress).await?;
            println!("✓ Created {} in VPC {}", db.name, db.vpc);
            println!("  {}", db.connection_string);
            println!("  Link it to an app with 'nap app link <app> {}'", db.name);
        }
        DbCommand::List { json } => {
            let dbs = registries()?.databases.list().map_err(ControlError::from)?;
            if json {
                print_json(&dbs)?;
                return Ok(ExitCode::SUCCESS);
            }
            let rows: Vec<Vec<String>> = dbs
                .iter()
                .map(|d| {
                    vec![
                        d.name.clone(),
                        d.kind.to_string(),
                        d.status.to_string(),
                        d.vpc.clone(),
                        if d.published { d.published_port.to_string() } else { "-".to_string() },
                        d.linked_apps.len().to_string(),
                    ]
                })
                .collect();
            print_table(&["NAME", "TYPE", "STATUS", "VPC", "HOST PORT", "APPS"], &rows);
        }
        DbCommand::Status { name } => {
            let ctx = open_context()?;
            let report = databases::database_status(&ctx, &name).await?;
            let db = &report.database;
            println!("Database:   {}", db.name);
            println!("Type:       {}", db.kind);
            println!("Status:     {}", db.status);
            println!("VPC:        {}", db.vpc);
            println!("Container:  {}", db.container_name);
            println!("Volume:     {}", db.volume_name);
            println!(
                "Engine:     {}",
                report.container.as_ref().map_or("missing", |s| s.status.as_str())
            );
            println!("Created:    {}", timestamp(&db.created_at));
        }
        DbCommand::Credentials { name } => {
            let db = registries()?.databases.get(&name).map_err(ControlError::from)?;
            println!("Host:       {}", db.host);
            println!("Port:       {}", db.internal_port);
            println!("Username:   {}", db.username);
            println!("Password:   {}", db.password);
            println!("Database:   {}", or_dash(&db.database));
            println!("URL:        {}", db.connection_string);
            if db.published {
                println!("Host URL:   {}", db.published_connection_string);
            }
        }
        DbCommand::Start { name } => {
            let ctx = open_context()?;
            databases::start_database(&ctx, &name).await?;
            println!("✓ Started {name}");
        }
        DbCommand::Stop { name } => {
            let ctx = open_context()?;
            databases::stop_database(&ctx, &name).await?;
            println!("✓ Stopped {name}");
        }
        DbCommand::Destroy { name, force } => {
            if !force && !confirm(&format!("Destroy database '{name}' and delete its data?"))? {
                println!("Aborted.");
                return Ok(ExitCode::SUCCESS);
            }
            let ctx = open_context()?;
            databases::destroy_database(&ctx, &name, force).await?;
            println!("✓ Destroyed {name}");
        }
        DbCommand::Logs { name, follow, tail } => {
            let ctx = open_context()?;
            let db = databases::database(&ctx, &name)?;
            let client = DockerClient::new(ctx.engine.runtime().clone());
            let mut sink = |kind: StreamKind, chunk: &[u8]| {
                let _ = match kind {
                    StreamKind::Stderr => std::io::stderr().write_all(chunk),
                    _ => std::io::stdout().write_all(chunk),
                };
            };
            client
                .logs(&db.container_id, &LogOptions { follow, tail }, &mut sink)
                .await
                .map_err(ControlError::from)
                .with_context(|| format!("reading logs of {name}"))?;
        }
        DbCommand::Shell { name, command } => {
            let ctx = open_context()?;
            let db = databases::database(&ctx, &name)?;
            let output = ctx
                .engine
                .exec(&db.container_id, &shell_command(&db, &command), &[])
                .await
                .map_err(ControlError::from)?;
            std::io::stdout().write_all(&output.stdout)?;
            std::io::stderr().write_all(&output.stderr)?;
            if output.exit_code != 0 {
                return Ok(ExitCode::from(u8::try_from(output.exit_code).unwrap_or(1)));
            }
        }
        DbCommand::Apps { name } => {
            let ctx = open_context()?;
            let apps = databases::linked_apps(&ctx, &name)?;
            if apps.is_empty() {
                println!("No apps are linked to {name}");
            }
            for app in apps {
                println!("{app}");
            }
        }
        DbCommand::Publish { name, port } => {
            let ctx = open_context()?;
            let db = databases::publish_database(&ctx, &name, port).await?;
            println!("✓ {name} reachable on the host at port {port}");
            println!("  {}", db.published_connection_string);
        }
        DbCommand::Unpublish { name } => {
            let ctx = open_context()?;
            databases::unpublish_database(&ctx, &name).await?;
            println!("✓ {name} is reachable only inside VPC");
        }
    }
    Ok(ExitCode::SUCCESS)
}
