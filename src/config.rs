use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_UPDATE_URL: &str =
    "https://ucarecdn.com/02ca4cac-d237-43f8-ae1f-f9e724b46280/setup.exe";
pub const DEFAULT_ADMIN_USERS_CAP: usize = 1000;

/// Which tracker backs the endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerMode {
    /// Constants only, nothing persisted.
    Stateless,
    Persistent,
}

impl TrackerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerMode::Stateless => "stateless",
            TrackerMode::Persistent => "persistent",
        }
    }
}

impl FromStr for TrackerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stateless" => Ok(TrackerMode::Stateless),
            "persistent" => Ok(TrackerMode::Persistent),
            other => Err(anyhow!("unknown TRACKER_MODE {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Rest,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" | "supabase" => Ok(StoreBackend::Rest),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!("unknown STORE_BACKEND {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCredentials {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub mode: TrackerMode,
    pub backend: StoreBackend,
    /// Set when `backend` is `Rest` and `mode` is `Persistent`.
    pub store: Option<StoreCredentials>,
    pub current_version: String,
    pub update_url: String,
    pub admin_users_cap: usize,
}

impl Config {
    /// Reads the process environment, honouring a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("invalid PORT {raw:?}"))?,
            None => DEFAULT_PORT,
        };

        let mode = var("TRACKER_MODE")
            .map(|m| m.parse::<TrackerMode>())
            .transpose()?
            .unwrap_or(TrackerMode::Persistent);

        let backend = var("STORE_BACKEND")
            .map(|b| b.parse::<StoreBackend>())
            .transpose()?
            .unwrap_or(StoreBackend::Rest);

        let store = if mode == TrackerMode::Persistent && backend == StoreBackend::Rest {
            let url = var("SUPABASE_URL").context("SUPABASE_URL is required for the rest store")?;
            let key = var("SUPABASE_KEY").context("SUPABASE_KEY is required for the rest store")?;
            Some(StoreCredentials { url, key })
        } else {
            None
        };

        let current_version = var("CURRENT_VERSION").unwrap_or_else(|| DEFAULT_VERSION.into());
        let update_url = var("UPDATE_URL").unwrap_or_else(|| DEFAULT_UPDATE_URL.into());

        let admin_users_cap = match var("ADMIN_USERS_CAP") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("invalid ADMIN_USERS_CAP {raw:?}"))?,
            None => DEFAULT_ADMIN_USERS_CAP,
        };
        if admin_users_cap == 0 {
            bail!("ADMIN_USERS_CAP must be positive");
        }

        Ok(Self {
            port,
            mode,
            backend,
            store,
            current_version,
            update_url,
            admin_users_cap,
        })
    }
}
