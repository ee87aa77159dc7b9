pub mod apply;
pub mod destroy;
pub mod fingerprint;
pub mod plan;
pub mod status;

use anyhow::{Context as AnyhowContext, Result, bail};
use queryapi::{ApiClient, ClientConfig};
use reconcile::{DeclarationSet, Namespace, PassReport, RemoteClient};
use std::path::PathBuf;

use crate::Context;
use crate::config::Config;
use crate::state::SyncState;
use crate::ui;

/// Everything a command needs from disk before talking to the remote
pub struct Workspace {
    pub config: Config,
    pub namespace: Namespace,
    pub state_path: PathBuf,
    pub state: SyncState,
}

impl Workspace {
    pub fn load(ctx: &Context) -> Result<Self> {
        let config = Config::load(&ctx.config)?;
        let namespace = config.namespace()?;
        let state_path = config.state_path();
        let state = SyncState::load(&state_path)?;
        Ok(Self {
            config,
            namespace,
            state_path,
            state,
        })
    }

    /// Parse and validate the declarations; invalid sets never reach the remote
    pub fn declarations(&self) -> Result<DeclarationSet> {
        let set = self.config.declarations()?;
        set.validate()
            .with_context(|| format!("Invalid declarations in {}", self.config.path.display()))?;
        Ok(set)
    }

    /// Build the HTTP client, or `None` when no API key is configured
    pub fn client(&self, ctx: &Context, timeout: Option<u64>) -> Result<Option<ApiClient>> {
        let Some(api_key) = ctx
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
        else {
            log::warn!("No API key configured (--api-key or QUERYSYNC_API_KEY)");
            return Ok(None);
        };

        let mut client_config =
            ClientConfig::new(api_key).with_timeout(self.config.timeout(timeout));
        if let Some(url) = &self.config.settings().api_url {
            client_config = client_config.with_base_url(url);
        }

        let client = ApiClient::new(client_config).context("Failed to configure API client")?;
        log::debug!("Using API at {}", client.base_url());
        Ok(Some(client))
    }
}

/// Borrow a concrete client as the engine's capability trait
pub fn as_remote(client: Option<&ApiClient>) -> Option<&dyn RemoteClient> {
    client.map(|c| c as &dyn RemoteClient)
}

/// Print the end of a pass and turn failed keys into a non-zero exit
pub fn finish(ctx: &Context, report: &PassReport) -> Result<()> {
    if ctx.json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize report")?
        );
    } else if !ctx.quiet {
        ui::summary(&report.summary);
    }

    let failures = report.failures();
    if !failures.is_empty() {
        bail!("{} of {} keys failed", failures.len(), report.summary.total());
    }
    Ok(())
}
