use std::path::Path;

use testpilot_client::ClientConfig;
use testpilot_core::WorkbenchConfig;

/// Loads `.env` from the crate directory, then from the working directory.
/// Values already in the environment win.
pub fn init() {
    let _ = dotenvy::from_path(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/.env")));
    dotenvy::dotenv().ok();
}

/// Client and workbench settings from the environment, with the base URL
/// optionally overridden from the command line.
pub fn load(
    api_base: Option<String>,
) -> Result<(ClientConfig, WorkbenchConfig), Box<dyn std::error::Error>> {
    let mut client = ClientConfig::from_env()?;
    if let Some(base) = api_base {
        client = client.base_url(base);
    }
    let workbench = WorkbenchConfig::from_env()?;
    tracing::debug!(
        event = "cli.config_loaded",
        domain = "cli",
        base_url = %client.base_url,
        poll_interval_ms = workbench.poll_interval_ms
    );
    Ok((client, workbench))
}
