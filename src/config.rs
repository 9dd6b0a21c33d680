use crate::auth::{TokenError, mint_token};
use crate::harness::DEFAULT_TIMEOUT;
use std::time::Duration;
use thiserror::Error;

pub const USAGE_HINT: &str = "\
Set environment variables:
  export CUBE_API_URL=\"https://your-instance.cubecloudapp.dev/cubejs-api/v1\"
  export CUBE_API_TOKEN=\"your-api-token\"   (or CUBE_API_SECRET to sign one)

Or use command-line arguments:
  cubecheck --url <URL> --token <TOKEN> run";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing API URL (--url or CUBE_API_URL)")]
    MissingUrl,
    #[error("missing API credentials (--token/CUBE_API_TOKEN or --secret/CUBE_API_SECRET)")]
    MissingCredentials,
    #[error("API URL must start with http:// or https://: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub url: String,
    pub token: String,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// An explicit token wins; otherwise one is signed from the API secret.
pub fn resolve_connection(
    url: Option<&str>,
    token: Option<&str>,
    secret: Option<&str>,
    now: i64,
) -> Result<Connection, ConfigError> {
    let url = present(url).ok_or(ConfigError::MissingUrl)?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidUrl(url.to_string()));
    }

    let token = match (present(token), present(secret)) {
        (Some(token), _) => token.to_string(),
        (None, Some(secret)) => {
            tracing::debug!("signing API token from secret");
            mint_token(secret, now)?
        }
        (None, None) => return Err(ConfigError::MissingCredentials),
    };

    Ok(Connection {
        url: url.to_string(),
        token,
    })
}

/// Command line first, then the suite file, then the 30 second default.
pub fn resolve_timeout(cli_secs: Option<u64>, suite_secs: Option<u64>) -> Duration {
    cli_secs
        .or(suite_secs)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT)
}
