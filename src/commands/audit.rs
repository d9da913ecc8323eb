// ABOUTME: Audit command: list recent clusteradm invocations and how they ended.

use clusteradm::config::Config;
use clusteradm::error::Result;
use clusteradm::output::{Output, OutputMode};
use clusteradm::storage::Storage;

pub async fn audit(config: &Config, limit: u32, output: &Output) -> Result<()> {
    let storage = Storage::open(&config.store_url()).await?;
    let entries = storage.list_audit(limit).await?;
    for entry in &entries {
        if output.mode() == OutputMode::Json {
            if let Ok(json) = serde_json::to_string(entry) {
                println!("{json}");
            }
            continue;
        }
        println!(
            "{:>5}  {}  {:<9}  {:06}  {}  ({})",
            entry.id,
            entry.execute_time.format("%Y-%m-%d %H:%M:%S"),
            entry.status.to_string(),
            entry.error_code,
            entry.command,
            entry.work_directory
        );
    }
    storage.close().await?;
    Ok(())
}
