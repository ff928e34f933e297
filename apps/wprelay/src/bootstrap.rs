use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use wprelay_common::{AllowList, RelayConfig, RelayConfigPatch};
use wprelay_core::{UpstreamClientConfig, WreqUpstreamClient};
use wprelay_router::RelayState;

use crate::cli::CliArgs;

pub(crate) struct Bootstrap {
    pub(crate) config: RelayConfig,
    pub(crate) state: RelayState,
}

pub(crate) fn bootstrap(args: CliArgs) -> anyhow::Result<Bootstrap> {
    let config = resolve_config(args, |name| std::env::var(name).ok())?;
    log_config(&config);

    let client = WreqUpstreamClient::new(UpstreamClientConfig::from_relay(&config))
        .context("build upstream http client")?;
    let state = RelayState::from_config(&config, Arc::new(client));
    Ok(Bootstrap { config, state })
}

/// Layers, lowest first: defaults, the site's legacy variables, then
/// `WPRELAY_*` values (clap already applies CLI > ENV for each of those).
pub(crate) fn resolve_config(
    args: CliArgs,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<RelayConfig> {
    let mut patch = legacy_env_patch(&lookup)?;
    patch.overlay(args_patch(args)?);
    patch.into_config().context("finalize relay config")
}

fn legacy_env_patch(lookup: &impl Fn(&str) -> Option<String>) -> anyhow::Result<RelayConfigPatch> {
    Ok(RelayConfigPatch {
        port: parse_u16_env_value(lookup("PORT"), "PORT")?,
        graphql_url: sanitize_optional_env_value(lookup("NEXT_PUBLIC_WORDPRESS_GRAPHQL_URL")),
        graphql_username: sanitize_optional_env_value(lookup("WP_APP_USERNAME")),
        graphql_password: sanitize_optional_env_value(lookup("WP_APP_PASSWORD")),
        ..Default::default()
    })
}

fn args_patch(args: CliArgs) -> anyhow::Result<RelayConfigPatch> {
    let graphql_timeout = parse_u64_env_value(
        args.graphql_timeout_secs,
        "WPRELAY_GRAPHQL_TIMEOUT_SECS",
    )?
    .map(Duration::from_secs);
    Ok(RelayConfigPatch {
        host: sanitize_optional_env_value(args.host),
        port: parse_u16_env_value(args.port, "WPRELAY_PORT")?,
        proxy: sanitize_optional_env_value(args.proxy),
        graphql_url: sanitize_optional_env_value(args.graphql_url),
        graphql_username: sanitize_optional_env_value(args.graphql_username),
        graphql_password: sanitize_optional_env_value(args.graphql_password),
        graphql_timeout,
        image_allowed_hosts: sanitize_optional_env_value(args.image_allowed_hosts)
            .map(|raw| AllowList::parse_list(&raw)),
    })
}

fn log_config(config: &RelayConfig) {
    let allowed_hosts = config.image.allow_list.iter().collect::<Vec<_>>();
    info!(
        host = %config.host,
        port = config.port,
        proxy = %config.proxy.as_deref().unwrap_or(""),
        graphql_url = %config.graphql.url.as_deref().unwrap_or(""),
        graphql_username = %config.graphql.username.as_deref().unwrap_or(""),
        graphql_timeout_ms = config.graphql.timeout.as_millis(),
        image_allowed_hosts = ?allowed_hosts,
        "config loaded"
    );

    let missing = config.graphql.missing_fields();
    if !missing.is_empty() {
        warn!(
            missing = ?missing,
            "graphql relay is not configured; requests will fail with configuration_error"
        );
    }
}

fn sanitize_optional_env_value(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        return None;
    }
    // Unresolved `${VAR}` placeholders injected by some hosts count as unset.
    if trimmed.starts_with("${") && trimmed.ends_with('}') {
        return None;
    }
    Some(trimmed)
}

fn parse_u16_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<u16>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = raw
        .parse::<u16>()
        .with_context(|| format!("invalid {env_name} value: {raw}"))?;
    Ok(Some(parsed))
}

fn parse_u64_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<u64>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = raw
        .parse::<u64>()
        .with_context(|| format!("invalid {env_name} value: {raw}"))?;
    Ok(Some(parsed))
}
