use std::net::IpAddr;

use axum::http::HeaderMap;
use owo_colors::OwoColorize;

pub mod args;
pub mod auth;
pub mod channels;
pub mod cors;
pub mod error;
pub mod metrics;
pub mod redis;
pub mod request_context;
pub mod response;
pub mod shutdown;
pub mod types;
pub mod wait;
pub mod wait_registry;

pub use request_context::*;

/// Process-wide setup: color override + rustls crypto provider install.
/// Mirrors `eosin_common::init` — called once at the top of every binary's
/// `main`, before any args are parsed or connections opened.
pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_else(|_| String::new())
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);

    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("install aws-lc-rs provider");
}

/// Prefers `X-Forwarded-For`'s first hop, falls back to `X-Real-IP`.
pub fn get_source_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded_for) = headers.get("x-forwarded-for")
        && let Ok(forwarded_for) = forwarded_for.to_str()
        && let Some(ip_str) = forwarded_for.split(',').next()
        && let Ok(ip) = ip_str.trim().parse()
    {
        return Some(ip);
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(ip_str) = real_ip.to_str()
        && let Ok(ip) = ip_str.trim().parse()
    {
        return Some(ip);
    }

    None
}

/// Per-route access logging, applied as middleware on both the
/// executor-facing and agent/admin-facing sub-routers.
pub mod access_log {
    use super::*;

    pub async fn request(
        req: axum::extract::Request,
        next: axum::middleware::Next,
    ) -> axum::response::Response {
        let ip = get_source_ip(req.headers())
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".into());
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let start = std::time::Instant::now();
        let response = next.run(req).await;
        let duration = start.elapsed();
        let is_success =
            response.status().is_success() || response.status() == reqwest::StatusCode::SWITCHING_PROTOCOLS;
        let (a, b) = if is_success {
            ((20, 163, 73), (25, 163, 118))
        } else {
            ((230, 126, 16), (171, 85, 17))
        };
        tracing::info!(
            %method,
            %path,
            status = response.status().as_u16(),
            elapsed = ?duration,
            client_ip = %ip,
            "request",
        );
        println!(
            "{} {} {} {} {}{}{}{} {}{}",
            method.truecolor(b.0, b.1, b.2),
            path.truecolor(b.0, b.1, b.2),
            "→".truecolor(a.0, a.1, a.2),
            response.status().truecolor(b.0, b.1, b.2),
            "(".truecolor(a.0, a.1, a.2),
            format!("{duration:?}").truecolor(b.0, b.1, b.2),
            ")".truecolor(a.0, a.1, a.2),
            " xff=".magenta(),
            ip.magenta().dimmed(),
            "",
        );
        response
    }
}
