//! Routing labels consumed by the proxy's docker provider.

use nap_core::naming::local_domain;
use nap_engine::models::Labels;
use nap_state::Application;

/// Certificate resolver defined in the proxy config.
pub const CERT_RESOLVER: &str = "letsencrypt";

const REDIRECT_MIDDLEWARE: &str = "redirect-to-https";

/// `Host(`a`) || Host(`b`)`
pub fn host_rule<S: AsRef<str>>(domains: &[S]) -> String {
    domains
        .iter()
        .map(|d| format!("Host(`{}`)", d.as_ref()))
        .collect::<Vec<_>>()
        .join(" || ")
}

/// Full routing label set for `app`'s containers.
///
/// Unpublished apps get one HTTP router on `{app}.nap.local`. Published
/// apps get an HTTPS router over the primary and custom domains plus an
/// HTTP router on the same rule that redirects to HTTPS.
pub fn proxy_labels(app: &Application) -> Labels {
    let name = &app.name;
    let mut labels = Labels::new();
    let mut put = |key: String, value: String| {
        labels.insert(key, value);
    };

    put("traefik.enable".into(), "true".into());
    put(
        format!("traefik.http.services.{name}.loadbalancer.server.port"),
        app.port.to_string(),
    );
    put(
        format!("traefik.http.services.{name}.loadbalancer.healthcheck.path"),
        app.health_check_path.clone(),
    );
    put(
        format!("traefik.http.services.{name}.loadbalancer.healthcheck.interval"),
        format!("{}s", app.health_check_interval),
    );
    put(
        format!("traefik.http.services.{name}.loadbalancer.healthcheck.timeout"),
        format!("{}s", app.health_check_timeout),
    );

    let domains = app.routed_domains();
    if app.published && !domains.is_empty() {
        let rule = host_rule(domains.as_slice());
        put(format!("traefik.http.routers.{name}-secure.rule"), rule.clone());
        put(format!("traefik.http.routers.{name}-secure.entrypoints"), "websecure".into());
        put(format!("traefik.http.routers.{name}-secure.tls"), "true".into());
        put(
            format!("traefik.http.routers.{name}-secure.tls.certresolver"),
            CERT_RESOLVER.into(),
        );

        put(format!("traefik.http.routers.{name}.rule"), rule);
        put(format!("traefik.http.routers.{name}.entrypoints"), "web".into());
        put(
            format!("traefik.http.routers.{name}.middlewares"),
            REDIRECT_MIDDLEWARE.into(),
        );
        put(
            format!("traefik.http.middlewares.{REDIRECT_MIDDLEWARE}.redirectscheme.scheme"),
            "https".into(),
        );
        put(
            format!("traefik.http.middlewares.{REDIRECT_MIDDLEWARE}.redirectscheme.permanent"),
            "true".into(),
        );
    } else {
        put(
            format!("traefik.http.routers.{name}.rule"),
            host_rule(&[local_domain(name)]),
        );
        put(format!("traefik.http.routers.{name}.entrypoints"), "web".into());
    }

    labels
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn app() -> Application {
        let mut app = Application::new("app-1".into(), "web", "primary", Utc::now());
        app.port = 8080;
        app.health_check_path = "/".into();
        app
    }

    #[test]
    fn unpublished_routes_local_domain() {
        let labels = proxy_labels(&app());
        assert_eq!(labels["traefik.http.routers.web.rule"], "Host(`web.nap.local`)");
        assert_eq!(labels["traefik.http.routers.web.entrypoints"], "web");
        assert_eq!(labels["traefik.http.services.web.loadbalancer.server.port"], "8080");
        assert_eq!(labels["traefik.http.services.web.loadbalancer.healthcheck.interval"], "10s");
        assert!(!labels.contains_key("traefik.http.routers.web-secure.rule"));
    }

    #[test]
    fn published_routes_every_domain() {
        let mut app = app();
        app.published = true;
        app.published_domain = "web.nap.example.com".into();
        app.custom_domains = vec!["www.example.com".into()];
        let labels = proxy_labels(&app);

        let rule = "Host(`web.nap.example.com`) || Host(`www.example.com`)";
        assert_eq!(labels["traefik.http.routers.web-secure.rule"], rule);
        assert_eq!(labels["traefik.http.routers.web.rule"], rule);
        assert_eq!(labels["traefik.http.routers.web-secure.tls.certresolver"], "letsencrypt");
        assert_eq!(labels["traefik.http.routers.web.middlewares"], "redirect-to-https");
        assert_eq!(
            labels["traefik.http.middlewares.redirect-to-https.redirectscheme.scheme"],
            "https"
        );
    }
}
