use crate::cli::actions::{server::Args, Action};
use crate::garita::auth::AuthConfig;
use anyhow::{Context, Result};
use std::path::PathBuf;
use url::Url;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let users_file = matches
        .get_one::<String>("users-file")
        .map(PathBuf::from)
        .context("missing required argument: --users-file")?;
    let clients_file = matches.get_one::<String>("clients-file").map(PathBuf::from);
    let sms_webhook_url = matches.get_one::<Url>("sms-webhook-url").cloned();

    Ok(Action::Server(Args {
        port,
        users_file,
        clients_file,
        sms_webhook_url,
        auth_config: auth_config(matches),
    }))
}

fn auth_config(matches: &clap::ArgMatches) -> AuthConfig {
    let mut config = AuthConfig::new();

    if let Some(path) = matches.get_one::<String>("login-path") {
        config = config.with_login_path(path.clone());
    }
    if let Some(length) = matches.get_one::<u8>("image-code-length") {
        config = config.with_image_code_length(usize::from(*length));
    }
    if let Some(seconds) = matches.get_one::<u64>("image-code-ttl") {
        config = config.with_image_code_ttl_seconds(*seconds);
    }
    if let Some(length) = matches.get_one::<u8>("sms-code-length") {
        config = config.with_sms_code_length(usize::from(*length));
    }
    if let Some(seconds) = matches.get_one::<u64>("sms-code-ttl") {
        config = config.with_sms_code_ttl_seconds(*seconds);
    }
    if let Some(max_sessions) = matches.get_one::<u16>("max-sessions") {
        config = config.with_max_sessions(usize::from(*max_sessions));
    }
    if let Some(policy) = matches.get_one::<String>("session-policy") {
        config = config.with_max_sessions_prevents_login(policy != "evict");
    }
    if let Some(seconds) = matches.get_one::<u64>("session-ttl") {
        config = config.with_session_ttl_seconds(*seconds);
    }
    if let Some(url) = matches.get_one::<String>("session-invalid-url") {
        config = config.with_session_invalid_url(url.clone());
    }
    if let Some(mode) = matches.get_one::<String>("client-credentials") {
        config = config.with_required_client_credentials(mode == "required");
    }
    if let Some(seconds) = matches.get_one::<u64>("token-ttl") {
        config = config.with_token_ttl_seconds(*seconds);
    }

    config
}
