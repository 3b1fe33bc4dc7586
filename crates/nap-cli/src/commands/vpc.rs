//! `nap vpc`: private bridge networks.

use std::process::ExitCode;

use clap::Subcommand;
use nap_control::{ControlError, vpcs};

use super::output::{print_table, timestamp};
use super::{open_context, registries};

#[derive(Subcommand)]
pub enum VpcCommand {
    Create { name: String },
    List,
    /// Show a VPC's network and members
    Inspect { name: String },
    Delete {
        name: String,
        /// Delete even when apps or databases still use it
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn run(command: VpcCommand) -> anyhow::Result<ExitCode> {
    match command {
        VpcCommand::Create { name } => {
            let ctx = open_context()?;
            let vpc = vpcs::create_vpc(&ctx, &name).await?;
            println!("✓ Created VPC {} ({})", vpc.name, vpc.subnet);
        }
        VpcCommand::List => {
            let list = registries()?.vpcs.list().map_err(ControlError::from)?;
            let rows: Vec<Vec<String>> = list
                .iter()
                .map(|v| {
                    vec![
                        v.name.clone(),
                        v.subnet.clone(),
                        v.apps.len().to_string(),
                        v.databases.len().to_string(),
                        timestamp(&v.created_at),
                    ]
                })
                .collect();
            print_table(&["NAME", "SUBNET", "APPS", "DATABASES", "CREATED"], &rows);
        }
        VpcCommand::Inspect { name } => {
            let ctx = open_context()?;
            let details = vpcs::inspect_vpc(&ctx, &name)?;
            let vpc = &details.vpc;
            println!("VPC:        {}", vpc.name);
            println!("Network:    {}", vpc.network_name);
            println!("Subnet:     {}", vpc.subnet);
            println!("Created:    {}", timestamp(&vpc.created_at));
            println!("Apps:       {}", list_or_none(&details.apps));
            println!("Databases:  {}", list_or_none(&details.databases));
        }
        VpcCommand::Delete { name, force } => {
            let ctx = open_context()?;
            vpcs::delete_vpc(&ctx, &name, force).await?;
            println!("✓ Deleted VPC {name}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() { "none".to_string() } else { names.join(", ") }
}
