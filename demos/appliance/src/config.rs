//! Host configuration: an optional TOML file, overridden from the command line.

use anyhow::Context;
use castline_control::ControlConfig;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Streaming appliance host: remote control channel and ingest listener.
#[derive(Debug, Parser)]
#[command(name = "castline", version)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "CASTLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Ingest listener port (0 for any free port).
    #[arg(long, env = "CASTLINE_INGEST_PORT")]
    pub port: Option<u16>,

    /// Remote controller WebSocket URL.
    #[arg(long, env = "CASTLINE_CONTROL_URL")]
    pub control_url: Option<String>,

    /// Remote controller password.
    #[arg(long, env = "CASTLINE_CONTROL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Do not start the ingest listener.
    #[arg(long)]
    pub no_ingest: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub control: Option<ControlSection>,
    pub ingest: IngestSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlSection {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            password: String::new(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_retry_delay_secs() -> u64 {
    castline_control::DEFAULT_RETRY_DELAY.as_secs()
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestSection {
    pub enabled: bool,
    pub port: u16,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            enabled: true,
            port: castline_ingest::DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    /// Load the file named on the command line (if any) and apply overrides.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(cli);
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.ingest.port = port;
        }
        if cli.no_ingest {
            self.ingest.enabled = false;
        }
        if let Some(url) = &cli.control_url {
            self.control.get_or_insert_with(Default::default).url = url.clone();
        }
        if let Some(password) = &cli.password {
            self.control.get_or_insert_with(Default::default).password = password.clone();
        }
    }

    /// The validated control channel settings, if one is configured.
    pub fn control_config(&self) -> anyhow::Result<Option<ControlConfig>> {
        let Some(section) = &self.control else {
            return Ok(None);
        };
        let config = ControlConfig::new(&section.url, &section.password)
            .with_retry_delay(Duration::from_secs(section.retry_delay_secs));
        config.validate().context("invalid [control] settings")?;
        Ok(Some(config))
    }
}
