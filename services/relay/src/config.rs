use anyhow::{bail, Context};
use courier_shared::logger::LogFormat;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Header carrying the webhook shared secret.
pub const SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// When set, ingest requests must present this value in [`SECRET_HEADER`].
    pub webhook_secret: Option<String>,
    pub sim_total: Duration,
    pub sim_tick: Duration,
    pub subscriber_buffer: usize,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            webhook_secret: None,
            sim_total: Duration::from_secs(12 * 60),
            sim_tick: Duration::from_secs(1),
            subscriber_buffer: 64,
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let webhook_secret = env::var("WEBHOOK_SHARED_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        let log_format = match env::var("LOG_FORMAT") {
            Ok(raw) => raw.parse::<LogFormat>().map_err(anyhow::Error::msg)?,
            Err(_) => defaults.log_format,
        };

        let config = Config {
            port: parse_var("PORT", defaults.port)?,
            webhook_secret,
            sim_total: Duration::from_secs(parse_var("SIM_TOTAL_SECS", defaults.sim_total.as_secs())?),
            sim_tick: Duration::from_millis(parse_var("SIM_TICK_MS", 1000u64)?),
            subscriber_buffer: parse_var("SUBSCRIBER_BUFFER", defaults.subscriber_buffer)?,
            log_format,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sim_total.is_zero() {
            bail!("SIM_TOTAL_SECS must be greater than zero");
        }
        if self.sim_tick.is_zero() {
            bail!("SIM_TICK_MS must be greater than zero");
        }
        if self.subscriber_buffer == 0 {
            bail!("SUBSCRIBER_BUFFER must be greater than zero");
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}
