//! Service configuration parsed from environment variables.
//!
//! All values have defaults, so an empty environment yields a working
//! local server on `0.0.0.0:8000`. Parsing runs against a lookup function
//! so tests can feed a map instead of touching the process environment.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::services::dispatch::MIN_SINK_CAPACITY;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_ROOM: &str = "default";
pub const DEFAULT_CLIENT_BUFFER: usize = 256;
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_ROOM_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_STROKE_POINTS: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid HOST: {0}")]
    InvalidHost(String),
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    /// Room joined when a connection names none.
    pub default_room: String,
    /// Outbound queue capacity per connection. A full queue gets the member evicted.
    pub client_buffer: usize,
    pub send_timeout: Duration,
    pub max_message_bytes: usize,
    /// `None` disables keepalive pings.
    pub ping_interval: Option<Duration>,
    pub room_queue_capacity: usize,
    pub max_stroke_points: usize,
    /// Relay `cursor` / `draw_progress` frames between room members.
    pub relay_ephemeral: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            default_room: DEFAULT_ROOM.to_string(),
            client_buffer: DEFAULT_CLIENT_BUFFER,
            send_timeout: Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            ping_interval: Some(Duration::from_secs(DEFAULT_PING_INTERVAL_SECS)),
            room_queue_capacity: DEFAULT_ROOM_QUEUE_CAPACITY,
            max_stroke_points: DEFAULT_MAX_STROKE_POINTS,
            relay_ephemeral: false,
        }
    }
}

impl Config {
    /// Build config from the process environment.
    ///
    /// Optional:
    /// - `HOST`, `PORT`: bind address (default `0.0.0.0:8000`)
    /// - `DEFAULT_ROOM`: default `default`
    /// - `WS_CLIENT_BUFFER`: default 256, at least 2
    /// - `WS_SEND_TIMEOUT_MS`: default 5000
    /// - `WS_MAX_MESSAGE_BYTES`: default 1 MiB
    /// - `WS_PING_INTERVAL_SECS`: default 30, `0` disables
    /// - `ROOM_QUEUE_CAPACITY`: default 1024
    /// - `MAX_STROKE_POINTS`: default 10000
    /// - `RELAY_EPHEMERAL`: `true`/`1` enables cursor and progress relay
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = match lookup("HOST") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidHost(raw))?,
            None => DEFAULT_HOST.parse().map_err(|_| ConfigError::InvalidHost(DEFAULT_HOST.into()))?,
        };

        let default_room = match lookup("DEFAULT_ROOM") {
            Some(raw) if crate::services::registry::is_valid_ident(raw.trim()) => raw.trim().to_string(),
            Some(raw) => {
                return Err(ConfigError::Invalid { var: "DEFAULT_ROOM", reason: format!("not a valid room name: {raw}") });
            }
            None => DEFAULT_ROOM.to_string(),
        };

        let client_buffer = parse_or(&lookup, "WS_CLIENT_BUFFER", DEFAULT_CLIENT_BUFFER);
        if client_buffer < MIN_SINK_CAPACITY {
            return Err(ConfigError::Invalid {
                var: "WS_CLIENT_BUFFER",
                reason: format!("must be at least {MIN_SINK_CAPACITY} (init plus the join notice)"),
            });
        }
        let room_queue_capacity = parse_or(&lookup, "ROOM_QUEUE_CAPACITY", DEFAULT_ROOM_QUEUE_CAPACITY);
        if room_queue_capacity == 0 {
            return Err(ConfigError::Invalid { var: "ROOM_QUEUE_CAPACITY", reason: "must be at least 1".into() });
        }

        let ping_secs = parse_or(&lookup, "WS_PING_INTERVAL_SECS", DEFAULT_PING_INTERVAL_SECS);

        Ok(Self {
            host,
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            default_room,
            client_buffer,
            send_timeout: Duration::from_millis(parse_or(&lookup, "WS_SEND_TIMEOUT_MS", DEFAULT_SEND_TIMEOUT_MS)),
            max_message_bytes: parse_or(&lookup, "WS_MAX_MESSAGE_BYTES", DEFAULT_MAX_MESSAGE_BYTES),
            ping_interval: (ping_secs > 0).then(|| Duration::from_secs(ping_secs)),
            room_queue_capacity,
            max_stroke_points: parse_or(&lookup, "MAX_STROKE_POINTS", DEFAULT_MAX_STROKE_POINTS).max(2),
            relay_ephemeral: lookup("RELAY_EPHEMERAL").is_some_and(|v| parse_flag(&v)),
        })
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
