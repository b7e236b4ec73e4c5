use crate::garita::{
    self,
    auth::{
        AuthConfig, AuthState, InMemoryClientStore, InMemoryUserStore, LogSmsSender, SmsSender,
        WebhookSmsSender,
    },
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub users_file: PathBuf,
    pub clients_file: Option<PathBuf>,
    pub sms_webhook_url: Option<Url>,
    pub auth_config: AuthConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the user or client files cannot be loaded, the
/// authenticator wiring is incomplete, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let users = InMemoryUserStore::from_json_file(&args.users_file)?;
    info!(users = users.len(), "Loaded user directory");

    let clients = match &args.clients_file {
        Some(path) => InMemoryClientStore::from_json_file(path)?,
        None => {
            warn!("No clients file configured, every client handshake will fail");
            InMemoryClientStore::default()
        }
    };
    info!(clients = clients.len(), "Loaded registered clients");

    let sms: Arc<dyn SmsSender> = match args.sms_webhook_url {
        Some(url) => Arc::new(WebhookSmsSender::new(url)?),
        None => Arc::new(LogSmsSender),
    };

    let auth_state = AuthState::new(args.auth_config, Arc::new(users), Arc::new(clients), sms)
        .context("Failed to wire authenticators")?;

    garita::new(args.port, Arc::new(auth_state)).await
}

fn log_startup_args(args: &Args) {
    debug!(
        port = args.port,
        users_file = %args.users_file.display(),
        clients_file = ?args.clients_file,
        sms_webhook = args.sms_webhook_url.as_ref().map_or("none", Url::as_str),
        login_path = args.auth_config.login_path(),
        max_sessions = args.auth_config.session_policy().max_sessions(),
        prevents_login = args.auth_config.session_policy().prevents_login(),
        "Startup configuration"
    );
}
