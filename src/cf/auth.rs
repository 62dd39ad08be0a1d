//! Session commands
//!
//! Login and logout go through `cf` itself; this crate never stores
//! credentials.

use super::client::CfClient;
use super::to_args;
use crate::error::Result;
use tokio_util::sync::CancellationToken;

/// Parameters of `cf_login`
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    pub endpoint: String,
    pub user: String,
    pub password: String,
    /// Identity provider origin key
    pub origin: Option<String>,
    pub skip_ssl_validation: bool,
}

/// Point `cf` at an endpoint and authenticate
///
/// Runs `cf api <endpoint>` then `cf auth <user> <password>`. The lookup cache
/// is cleared since the new session may see different resources.
pub async fn cf_login(
    client: &CfClient,
    options: &LoginOptions,
    token: Option<&CancellationToken>,
) -> Result<String> {
    let mut api = to_args(&["api", &options.endpoint]);
    if options.skip_ssl_validation {
        api.push("--skip-ssl-validation".to_string());
    }
    client.execute(&api, token).await?;

    let mut auth = to_args(&["auth", &options.user, &options.password]);
    if let Some(origin) = &options.origin {
        auth.extend(to_args(&["--origin", origin]));
    }
    client.execute(&auth, token).await?;

    client.clear_cache();
    tracing::info!("Logged in to {} as {}", options.endpoint, options.user);

    Ok("OK".to_string())
}

/// `cf logout`
pub async fn cf_logout(client: &CfClient, token: Option<&CancellationToken>) -> Result<()> {
    client.execute(&to_args(&["logout"]), token).await?;
    client.clear_cache();
    Ok(())
}

/// `cf api [url]`: show or set the API endpoint
pub async fn cf_api(
    client: &CfClient,
    url: Option<&str>,
    token: Option<&CancellationToken>,
) -> Result<String> {
    let mut args = to_args(&["api"]);
    if let Some(url) = url {
        args.push(url.to_string());
    }
    client.execute(&args, token).await
}

/// `cf oauth-token`, trimmed
pub async fn cf_get_auth_token(
    client: &CfClient,
    token: Option<&CancellationToken>,
) -> Result<String> {
    let stdout = client.execute(&to_args(&["oauth-token"]), token).await?;
    Ok(stdout.trim().to_string())
}
