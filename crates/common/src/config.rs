use crate::error::{Error, Result};
use faststr::FastStr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(1000);
pub const DEFAULT_TENANT_CACHE_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_TENANT_CACHE_CAPACITY: u64 = 100;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MOLD_ORDER_MASTER_ID: u64 = 1;

/// Runtime settings, read from the process environment (after `.env` is
/// loaded by the binary).
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url:          FastStr,
    pub tenant_id:             Option<FastStr>,
    pub grace_period:          Duration,
    pub tenant_cache_ttl:      Duration,
    pub tenant_cache_capacity: u64,
    pub http_timeout:          Duration,
    /// Master whose detail pages the binary's coalescing burst requests.
    pub mold_order_master_id:  u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let api_base_url = lookup("API_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(Error::ConfigError("API_BASE_URL", "missing".into()))?;

        let tenant_id = lookup("TENANT_ID")
            .filter(|v| !v.trim().is_empty())
            .map(FastStr::from);

        let grace_period = parse_opt(&lookup, "FLIGHT_GRACE_PERIOD_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_GRACE_PERIOD);
        let tenant_cache_ttl = parse_opt(&lookup, "TENANT_CACHE_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TENANT_CACHE_TTL);
        let tenant_cache_capacity =
            parse_opt(&lookup, "TENANT_CACHE_CAPACITY")?.unwrap_or(DEFAULT_TENANT_CACHE_CAPACITY);
        let http_timeout = parse_opt(&lookup, "HTTP_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);
        let mold_order_master_id =
            parse_opt(&lookup, "MOLD_ORDER_MASTER_ID")?.unwrap_or(DEFAULT_MOLD_ORDER_MASTER_ID);

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_owned().into(),
            tenant_id,
            grace_period,
            tenant_cache_ttl,
            tenant_cache_capacity,
            http_timeout,
            mold_order_master_id,
        })
    }
}

fn parse_opt<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>>
where
    F: Fn(&'static str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::ConfigError(name, raw.into())),
        None => Ok(None),
    }
}
