//! VPCs: one engine bridge network per named private network.

use chrono::Utc;
use nap_core::naming::vpc_network_name;
use nap_core::validation::validate_name;
use nap_engine::Engine;
use nap_engine::vpc::{allocate_subnet, vpc_network_spec};
use nap_health::Prober;
use nap_state::Vpc;
use tracing::{info, warn};

use crate::context::Context;
use crate::error::{ControlError, ControlResult};

/// Label printed for a reference whose target no longer exists.
pub const DANGLING: &str = "(not found)";

/// A VPC with its attachments resolved to names.
#[derive(Debug, Clone)]
pub struct VpcDetails {
    pub vpc: Vpc,
    pub apps: Vec<String>,
    pub databases: Vec<String>,
}

/// Return the VPC, creating it on first use.
pub async fn ensure_vpc<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<Vpc> {
    if let Some(vpc) = ctx.registries.vpcs.find(name)? {
        return Ok(vpc);
    }
    create_vpc(ctx, name).await
}

pub async fn create_vpc<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<Vpc> {
    validate_name("vpc", name)?;
    if ctx.registries.vpcs.exists(name)? {
        return Err(ControlError::Conflict(format!("vpc '{name}' already exists")));
    }

    let network_name = vpc_network_name(name);
    let networks = ctx.engine.list_networks().await?;

    // A network left behind by a lost registry is adopted as-is.
    let (network_id, subnet) = match networks.iter().find(|n| n.name == network_name) {
        Some(existing) => {
            warn!(vpc = %name, network = %network_name, "adopting existing network");
            let subnet = existing
                .ipam
                .config
                .first()
                .map(|c| c.subnet.clone())
                .unwrap_or_default();
            (existing.id.clone(), subnet)
        }
        None => {
            let registered = ctx.registries.vpcs.list()?;
            let in_use = registered
                .iter()
                .map(|v| v.subnet.as_str())
                .chain(networks.iter().flat_map(|n| n.ipam.config.iter().map(|c| c.subnet.as_str())));
            let subnet = allocate_subnet(in_use).ok_or(ControlError::NoSubnetAvailable)?;
            let id = ctx.engine.create_network(&vpc_network_spec(name, &subnet)).await?;
            (id, subnet)
        }
    };

    let vpc = Vpc {
        name: name.to_string(),
        network_id,
        network_name,
        subnet,
        created_at: Utc::now(),
        databases: Vec::new(),
        apps: Vec::new(),
    };
    ctx.registries.vpcs.add(vpc.clone())?;
    info!(vpc = %name, subnet = %vpc.subnet, "vpc created");
    Ok(vpc)
}

pub fn list_vpcs<E: Engine, P: Prober>(ctx: &Context<E, P>) -> ControlResult<Vec<Vpc>> {
    Ok(ctx.registries.vpcs.list()?)
}

pub fn inspect_vpc<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<VpcDetails> {
    let vpc = ctx.registries.vpcs.get(name)?;
    let apps = ctx.registries.apps.list()?;
    let databases = ctx.registries.databases.list()?;

    let app_names = vpc
        .apps
        .iter()
        .map(|id| {
            apps.iter()
                .find(|a| &a.id == id)
                .map_or_else(|| format!("{id} {DANGLING}"), |a| a.name.clone())
        })
        .collect();
    let db_names = vpc
        .databases
        .iter()
        .map(|id| {
            databases
                .iter()
                .find(|d| &d.id == id)
                .map_or_else(|| format!("{id} {DANGLING}"), |d| d.name.clone())
        })
        .collect();

    Ok(VpcDetails {
        vpc,
        apps: app_names,
        databases: db_names,
    })
}

/// Delete a VPC and its network. Attached apps or databases block the
/// delete unless `force`.
pub async fn delete_vpc<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str, force: bool) -> ControlResult<()> {
    let _lock = ctx.lock_vpc(name).await?;
    let details = inspect_vpc(ctx, name)?;
    let vpc = &details.vpc;
    if !force && !vpc.is_empty() {
        let mut hints: Vec<String> = details.apps.iter().map(|a| format!("nap app destroy {a}")).collect();
        hints.extend(details.databases.iter().map(|d| format!("nap db destroy {d}")));
        hints.push(format!("nap vpc delete {name} --force"));
        return Err(ControlError::Precondition {
            message: format!(
                "vpc '{name}' still has {} app(s) and {} database(s) attached",
                vpc.apps.len(),
                vpc.databases.len()
            ),
            hints,
        });
    }

    let target = if vpc.network_id.is_empty() { &vpc.network_name } else { &vpc.network_id };
    match ctx.engine.remove_network(target).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => warn!(vpc = %name, "network already gone"),
        Err(e) => return Err(e.into()),
    }
    ctx.registries.vpcs.delete(name)?;
    info!(vpc = %name, "vpc deleted");
    Ok(())
}

// ── Attachment lists ───────────────────────────────────────────────

async fn edit_vpc<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    name: &str,
    edit: impl FnOnce(&mut Vpc) -> bool,
) -> ControlResult<()> {
    let _lock = ctx.lock_vpc(name).await?;
    let Some(mut vpc) = ctx.registries.vpcs.find(name)? else {
        warn!(vpc = %name, "vpc missing from registry");
        return Ok(());
    };
    if edit(&mut vpc) {
        ctx.registries.vpcs.update(&vpc)?;
    }
    Ok(())
}

fn add_unique(list: &mut Vec<String>, id: &str) -> bool {
    if list.iter().any(|x| x == id) {
        return false;
    }
    list.push(id.to_string());
    true
}

fn remove_all(list: &mut Vec<String>, id: &str) -> bool {
    let before = list.len();
    list.retain(|x| x != id);
    list.len() != before
}

pub(crate) async fn attach_app<E: Engine, P: Prober>(ctx: &Context<E, P>, vpc: &str, app_id: &str) -> ControlResult<()> {
    edit_vpc(ctx, vpc, |v| add_unique(&mut v.apps, app_id)).await
}

pub(crate) async fn detach_app<E: Engine, P: Prober>(ctx: &Context<E, P>, vpc: &str, app_id: &str) -> ControlResult<()> {
    edit_vpc(ctx, vpc, |v| remove_all(&mut v.apps, app_id)).await
}

pub(crate) async fn attach_database<E: Engine, P: Prober>(ctx: &Context<E, P>, vpc: &str, db_id: &str) -> ControlResult<()> {
    edit_vpc(ctx, vpc, |v| add_unique(&mut v.databases, db_id)).await
}

pub(crate) async fn detach_database<E: Engine, P: Prober>(ctx: &Context<E, P>, vpc: &str, db_id: &str) -> ControlResult<()> {
    edit_vpc(ctx, vpc, |v| remove_all(&mut v.databases, db_id)).await
}
