//! Process configuration gathered from the environment.

use std::net::SocketAddr;

use anyhow::{Context, bail};

use rawsy_observability::LogFormat;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";
const DEFAULT_REALTIME_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// True when `JWT_SECRET` was absent and the dev default is in use.
    pub insecure_jwt_secret: bool,
    pub log_format: LogFormat,
    /// Buffered messages per realtime (SSE) subscriber before it lags.
    pub realtime_capacity: usize,
}

impl ApiConfig {
    /// Defaults with an explicit secret (tests, embedding).
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: jwt_secret.into(),
            insecure_jwt_secret: false,
            log_format: LogFormat::Json,
            realtime_capacity: DEFAULT_REALTIME_CAPACITY,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be a socket address such as 0.0.0.0:8080")?;

        let (jwt_secret, insecure_jwt_secret) = match get("JWT_SECRET") {
            Some(secret) => (secret, false),
            None => (DEV_JWT_SECRET.to_string(), true),
        };

        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>()?,
            None => LogFormat::Json,
        };

        let realtime_capacity = match get("REALTIME_CAPACITY") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("REALTIME_CAPACITY must be a positive integer (got '{raw}')"))?,
            None => DEFAULT_REALTIME_CAPACITY,
        };
        if realtime_capacity == 0 {
            bail!("REALTIME_CAPACITY must be greater than 0");
        }

        Ok(Self {
            bind_addr,
            jwt_secret,
            insecure_jwt_secret,
            log_format,
            realtime_capacity,
        })
    }
}
