//! Server settings loaded from the environment.
//!
//! | variable | meaning | default |
//! |---|---|---|
//! | `DUELRELAY_BIND` | listen address | `0.0.0.0:$PORT` |
//! | `PORT` | listen port when `DUELRELAY_BIND` is unset | `8080` |
//! | `DUELRELAY_TEARDOWN` | `room-collapse` or `partner-notify` | `room-collapse` |
//! | `DUELRELAY_SCORE_SCOPE` | `peers-only` or `all-members` for `scoreAndStrength` | `peers-only` |
//! | `DUELRELAY_WAIT_TIMEOUT_SECS` | waiting-pool timeout | off |
//! | `DUELRELAY_IDLE_TIMEOUT_SECS` | per-connection idle timeout | off |

use std::str::FromStr;
use std::time::Duration;

use duelrelay_broker::{BrokerConfig, RelayPolicy, RelayScope, TeardownPolicy};
use duelrelay_protocol::EventKind;

/// Port used when neither `DUELRELAY_BIND` nor `PORT` is set.
pub const DEFAULT_PORT: u16 = 8080;

/// An environment variable held a value that couldn't be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}=`{value}`: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the binary needs to start a server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub broker: BrokerConfig,
    pub idle_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for the first variable that fails
    /// to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = match lookup("DUELRELAY_BIND") {
            Some(addr) => addr,
            None => {
                let port = parse_var::<u16>(&lookup, "PORT")?.unwrap_or(DEFAULT_PORT);
                format!("0.0.0.0:{port}")
            }
        };

        let teardown =
            parse_var::<TeardownPolicy>(&lookup, "DUELRELAY_TEARDOWN")?.unwrap_or_default();
        let score_scope =
            parse_var::<RelayScope>(&lookup, "DUELRELAY_SCORE_SCOPE")?.unwrap_or_default();

        let mut broker = BrokerConfig::default()
            .with_teardown(teardown)
            .with_relay(RelayPolicy::default().with_scope(EventKind::ScoreAndStrength, score_scope));
        if let Some(timeout) = parse_secs(&lookup, "DUELRELAY_WAIT_TIMEOUT_SECS")? {
            broker = broker.with_wait_timeout(timeout);
        }

        let idle_timeout = parse_secs(&lookup, "DUELRELAY_IDLE_TIMEOUT_SECS")?;

        Ok(Self {
            bind,
            broker,
            idle_timeout,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::Invalid {
            var,
            value: value.clone(),
            reason: e.to_string(),
        })
}

/// Parses a whole number of seconds. Zero means "off".
fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_var::<u64>(lookup, var)?
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs))
}
