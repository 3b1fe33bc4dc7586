//! Naming and labelling rules for engine objects.
//!
//! Engine names are global, so every container, volume, and network the
//! controller creates is derived from the entity name through the functions
//! below. Names are joined with `-`, so two entities whose names share a
//! prefix can derive the same engine name (`web` + `api-data` and
//! `web-api` + `data`). Callers check the ownership labels on an existing
//! object before reusing or removing it.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::types::Color;

/// Namespace prefix for files, labels, and engine objects.
pub const PREFIX: &str = "nap";

/// Well-known name of the edge proxy container.
pub const PROXY_CONTAINER: &str = "nap-traefik";

/// Local development domain suffix for unpublished apps.
pub const LOCAL_DOMAIN_SUFFIX: &str = "nap.local";

/// Default VPC used when none is given.
pub const DEFAULT_VPC: &str = "primary";

/// Container label keys.
pub mod labels {
    pub const MANAGED: &str = "nap.managed";
    pub const TYPE: &str = "nap.type";
    pub const VPC: &str = "nap.vpc";
    pub const APP_NAME: &str = "nap.app.name";
    pub const APP_ID: &str = "nap.app.id";
    pub const APP_INSTANCE: &str = "nap.app.instance";
    pub const APP_COLOR: &str = "nap.app.color";
    pub const DB_TYPE: &str = "nap.db.type";
    pub const DB_NAME: &str = "nap.db.name";
    pub const DB_ID: &str = "nap.db.id";
    pub const VPC_NAME: &str = "nap.vpc.name";
    pub const VOL_NAME: &str = "nap.vol.name";

    pub const TYPE_APP: &str = "app";
    pub const TYPE_DATABASE: &str = "database";
    pub const TYPE_VPC: &str = "vpc";
    pub const TYPE_PROXY: &str = "traefik";
    pub const TYPE_VOLUME: &str = "volume";

    /// `key=value` filter selecting every object the controller manages.
    pub fn managed_filter() -> String {
        format!("{MANAGED}=true")
    }
}

/// Environment variables injected into every app container.
pub mod env {
    pub const APP_ID: &str = "NAP_APP_ID";
    pub const INSTANCE_ID: &str = "NAP_INSTANCE_ID";
    pub const REGION: &str = "NAP_REGION";
    pub const REGION_VALUE: &str = "local";
}

// ── Engine object names ────────────────────────────────────────────

/// `nap-app-{app}`: the internal hostname of an app.
pub fn app_hostname(app: &str) -> String {
    format!("{PREFIX}-app-{app}")
}

/// `nap-app-{app}-{instance}` for recreate and scaled instances.
pub fn app_container_name(app: &str, instance: usize) -> String {
    format!("{PREFIX}-app-{app}-{instance}")
}

/// `nap-app-{app}-{color}-{instance}` for blue-green staging.
pub fn app_color_container_name(app: &str, color: Color, instance: usize) -> String {
    format!("{PREFIX}-app-{app}-{color}-{instance}")
}

/// Rolling instances get a timestamp suffix while the old set still exists.
pub fn app_rolling_container_name(app: &str, instance: usize, stamp: i64) -> String {
    format!("{PREFIX}-app-{app}-{instance}-{stamp}")
}

/// `nap-vol-{app}-{volume}`: engine volume backing an app volume.
pub fn app_volume_name(app: &str, volume: &str) -> String {
    format!("{PREFIX}-vol-{app}-{volume}")
}

/// `nap-db-{name}`: database container, also its DNS name on the VPC.
pub fn db_container_name(db: &str) -> String {
    format!("{PREFIX}-db-{db}")
}

/// `nap-vol-{db_id}`: data volume of a database.
pub fn db_volume_name(db_id: &str) -> String {
    format!("{PREFIX}-vol-{db_id}")
}

/// `{vpc}.nap-vpc-network`: engine network backing a VPC.
pub fn vpc_network_name(vpc: &str) -> String {
    format!("{vpc}.{PREFIX}-vpc-network")
}

/// `{app}.nap.local`
pub fn local_domain(app: &str) -> String {
    format!("{app}.{LOCAL_DOMAIN_SUFFIX}")
}

/// `http://{app}.nap.local`
pub fn local_url(app: &str) -> String {
    format!("http://{}", local_domain(app))
}

/// `{app}.nap.{base_domain}`: default published domain.
pub fn published_domain(app: &str, base_domain: &str) -> String {
    format!("{app}.{PREFIX}.{base_domain}")
}

/// Image tag for a source build: `nap-{app}:{unix-ts}`.
pub fn build_tag(app: &str, now: DateTime<Utc>) -> String {
    format!("{PREFIX}-{app}:{}", now.timestamp())
}

// ── Identifiers ────────────────────────────────────────────────────

fn random_bytes<const N: usize>() -> CoreResult<[u8; N]> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).map_err(|e| CoreError::Entropy(e.to_string()))?;
    Ok(buf)
}

/// `app-` followed by 16 hex chars.
pub fn new_app_id() -> CoreResult<String> {
    Ok(format!("app-{}", hex::encode(random_bytes::<8>()?)))
}

/// `db-` followed by 16 hex chars.
pub fn new_db_id() -> CoreResult<String> {
    Ok(format!("db-{}", hex::encode(random_bytes::<8>()?)))
}

/// 32 URL-safe characters for generated database passwords.
pub fn new_password() -> CoreResult<String> {
    let mut encoded = URL_SAFE_NO_PAD.encode(random_bytes::<32>()?);
    encoded.truncate(32);
    Ok(encoded)
}

/// `dep-YYYYMMDD-HHMMSS` in UTC.
pub fn deployment_record_id(now: DateTime<Utc>) -> String {
    format!("dep-{}", now.format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dashed_names_can_derive_the_same_engine_name() {
        assert_eq!(app_container_name("web", 1), "nap-app-web-1");
        assert_eq!(app_container_name("web-1", 1), "nap-app-web-1-1");
        assert_eq!(app_volume_name("web", "api-data"), app_volume_name("web-api", "data"));
        assert_eq!(
            app_color_container_name("web", Color::Green, 1),
            app_container_name("web-green", 1)
        );
    }

    #[test]
    fn color_and_network_names() {
        assert_eq!(
            app_color_container_name("web", Color::Green, 2),
            "nap-app-web-green-2"
        );
        assert_eq!(vpc_network_name("primary"), "primary.nap-vpc-network");
        assert_eq!(db_container_name("pg"), "nap-db-pg");
        assert_eq!(local_url("web"), "http://web.nap.local");
        assert_eq!(published_domain("web", "example.com"), "web.nap.example.com");
    }

    #[test]
    fn ids_have_expected_shape() {
        let id = new_app_id().unwrap();
        assert!(id.starts_with("app-"));
        assert_eq!(id.len(), 4 + 16);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));

        let db = new_db_id().unwrap();
        assert!(db.starts_with("db-"));
        assert_ne!(new_app_id().unwrap(), id);
    }

    #[test]
    fn passwords_are_url_safe() {
        let pw = new_password().unwrap();
        assert_eq!(pw.len(), 32);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn record_ids_use_utc_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(deployment_record_id(now), "dep-20260304-050607");
        assert_eq!(build_tag("web", now), format!("nap-web:{}", now.timestamp()));
    }
}
