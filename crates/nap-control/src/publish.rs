//! Publishing apps on public domains through the proxy.
//!
//! Routing lives in container labels, so every change here ends with the
//! app's containers being recreated.

use nap_core::naming::{local_url, published_domain, vpc_network_name};
use nap_core::validation::validate_domain;
use nap_engine::{Engine, Progress};
use nap_health::Prober;
use nap_state::{Application, LONG_LOCK_TIMEOUT};
use tracing::{info, warn};

use crate::context::Context;
use crate::error::{ControlError, ControlResult};

fn require_published(app: &Application) -> ControlResult<()> {
    if app.published {
        return Ok(());
    }
    Err(ControlError::Precondition {
        message: format!("{} is not published", app.name),
        hints: vec![format!("nap app publish {}", app.name)],
    })
}

/// Persist `app`, then recreate its containers with the new routing
/// labels. If the recreate fails the routing fields of `previous` are
/// restored in the registry.
async fn apply_routing<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    app: &mut Application,
    previous: &Application,
    progress: Progress<'_>,
) -> ControlResult<()> {
    ctx.save_app(app)?;

    let result: ControlResult<()> = async {
        ctx.proxy().ensure_running(progress).await?;
        ctx.proxy().connect_to_network(&vpc_network_name(&app.vpc)).await?;
        ctx.recreate_containers(app).await
    }
    .await;

    match result {
        Ok(()) => {
            ctx.save_app(app)?;
            Ok(())
        }
        Err(e) => {
            let mut reverted = previous.clone();
            reverted.container_ids = app.container_ids.clone();
            reverted.deployment_state = app.deployment_state.clone();
            if let Err(save) = ctx.save_app(&mut reverted) {
                warn!(app = %app.name, error = %save, "failed to revert routing change");
            }
            Err(e)
        }
    }
}

/// Publish `app` on `domain`, or on `{app}.nap.{base_domain}` by default.
pub async fn publish<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    app_name: &str,
    domain: Option<&str>,
    progress: Progress<'_>,
) -> ControlResult<Application> {
    ctx.config.validate_publishing()?;
    let domain = match domain {
        Some(d) => d.to_string(),
        None => published_domain(app_name, &ctx.config.publishing.base_domain),
    };
    validate_domain(&domain)?;

    let _lock = ctx.lock_app(app_name, LONG_LOCK_TIMEOUT).await?;
    let previous = ctx.app(app_name)?;
    if previous.published {
        return Err(ControlError::Conflict(format!(
            "{app_name} is already published at {}",
            previous.published_url
        )));
    }

    let mut app = previous.clone();
    app.published = true;
    app.published_url = format!("https://{domain}");
    app.published_domain = domain;
    app.ssl_enabled = true;
    app.ssl_cert_issuer = "letsencrypt".to_string();

    apply_routing(ctx, &mut app, &previous, progress).await?;
    info!(app = %app_name, domain = %app.published_domain, "published");
    Ok(app)
}

pub async fn unpublish<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    app_name: &str,
    progress: Progress<'_>,
) -> ControlResult<Application> {
    let _lock = ctx.lock_app(app_name, LONG_LOCK_TIMEOUT).await?;
    let previous = ctx.app(app_name)?;
    require_published(&previous)?;

    let mut app = previous.clone();
    app.published = false;
    app.published_domain.clear();
    app.custom_domains.clear();
    app.published_url = local_url(app_name);
    app.ssl_enabled = false;
    app.ssl_cert_issuer.clear();
    app.ssl_cert_expiry.clear();

    apply_routing(ctx, &mut app, &previous, progress).await?;
    info!(app = %app_name, "unpublished");
    Ok(app)
}

pub async fn domain_add<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    app_name: &str,
    domain: &str,
    progress: Progress<'_>,
) -> ControlResult<Application> {
    validate_domain(domain)?;
    let _lock = ctx.lock_app(app_name, LONG_LOCK_TIMEOUT).await?;
    let previous = ctx.app(app_name)?;
    require_published(&previous)?;
    if previous.routed_domains().iter().any(|d| d == domain) {
        return Err(ControlError::Conflict(format!("{app_name} already serves {domain}")));
    }

    let mut app = previous.clone();
    app.custom_domains.push(domain.to_string());
    apply_routing(ctx, &mut app, &previous, progress).await?;
    info!(app = %app_name, %domain, "domain added");
    Ok(app)
}

pub async fn domain_remove<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    app_name: &str,
    domain: &str,
    progress: Progress<'_>,
) -> ControlResult<Application> {
    let _lock = ctx.lock_app(app_name, LONG_LOCK_TIMEOUT).await?;
    let previous = ctx.app(app_name)?;
    require_published(&previous)?;
    if previous.published_domain == domain {
        return Err(ControlError::Precondition {
            message: format!("{domain} is the primary domain of {app_name}"),
            hints: vec![format!("nap app unpublish {app_name}")],
        });
    }
    if !previous.custom_domains.iter().any(|d| d == domain) {
        return Err(ControlError::NotFound(format!("{app_name} has no custom domain {domain}")));
    }

    let mut app = previous.clone();
    app.custom_domains.retain(|d| d != domain);
    apply_routing(ctx, &mut app, &previous, progress).await?;
    info!(app = %app_name, %domain, "domain removed");
    Ok(app)
}
