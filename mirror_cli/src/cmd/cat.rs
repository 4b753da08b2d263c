use std::io::Write;

use anyhow::{Context, Result};
use mirror_sync::{Mirror, Transform};

pub async fn run_cat(mirror: &Mirror, path: &str, json: bool) -> Result<()> {
    if json {
        let value = mirror
            .one_off_read_with(path, &Transform::<serde_json::Result<serde_json::Value>>::json())
            .await?
            .with_context(|| format!("{path} is not valid JSON"))?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let payload = mirror.one_off_read(path).await?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&payload)?;
    stdout.flush()?;
    Ok(())
}
