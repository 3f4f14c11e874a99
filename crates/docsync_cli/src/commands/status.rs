//! Status command implementation.

use super::Connection;
use docsync_engine::{DeviceIdentity, LocalMetadataStore, SyncTransport};
use serde::Serialize;
use std::sync::Arc;

/// Local and remote view of one app.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// App name.
    pub app: String,
    /// This device's id.
    pub device_id: String,
    /// Last server-confirmed version held locally.
    pub local_version: u64,
    /// Current server version, if a document exists.
    pub remote_version: Option<u64>,
    /// Device that wrote the server copy.
    pub remote_device_id: Option<String>,
    /// Versions retained by the server, newest first.
    pub available_versions: Vec<u64>,
}

impl StatusReport {
    /// Human-readable verdict.
    pub fn verdict(&self) -> &'static str {
        match self.remote_version {
            None => "no remote document",
            Some(remote) if remote > self.local_version => "behind server",
            Some(remote) if remote == self.local_version => "up to date",
            Some(_) => "ahead of server",
        }
    }
}

/// Runs the status command.
pub async fn run(connection: &Connection, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (store, _lock) = connection.open_store()?;
    let store = Arc::new(store);
    let identity = DeviceIdentity::new(store.clone());
    let local = LocalMetadataStore::new(store).get_local(&connection.app);

    let token = connection
        .token
        .as_deref()
        .ok_or("a token is required (--token or DOCSYNC_TOKEN)")?;
    let meta = connection
        .transport()
        .fetch_meta(&connection.app, token)
        .await?;

    let remote = meta.remote();
    let report = StatusReport {
        app: connection.app.to_string(),
        device_id: identity.device_id(&connection.app),
        local_version: local.map(|m| m.version).unwrap_or(0),
        remote_version: remote.map(|m| m.version),
        remote_device_id: remote.map(|m| m.device_id.clone()),
        available_versions: meta.available_versions.clone(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &StatusReport) {
    println!("Sync Status");
    println!("===========");
    println!("  App:            {}", report.app);
    println!("  Device:         {}", report.device_id);
    println!("  Local version:  {}", report.local_version);
    match (report.remote_version, &report.remote_device_id) {
        (Some(version), Some(device)) => println!("  Remote version: {version} (by {device})"),
        _ => println!("  Remote version: -"),
    }
    if !report.available_versions.is_empty() {
        let versions: Vec<String> = report.available_versions.iter().map(u64::to_string).collect();
        println!("  History:        {}", versions.join(", "));
    }
    println!("  State:          {}", report.verdict());
}
