//! Local cache inspection commands: `draftsync cache`.

use anyhow::{Context, Result};

use draftsync::cache::LocalCache;
use draftsync::config::DraftsyncConfig;

use super::super::CacheCommands;

pub fn cmd_cache(config: &DraftsyncConfig, command: CacheCommands) -> Result<()> {
    match command {
        CacheCommands::Show { session } => {
            let cache = LocalCache::new(&config.cache_dir(), &session);
            match cache.load()? {
                Some(snapshot) => {
                    let json = serde_json::to_string_pretty(&snapshot)
                        .context("Failed to serialize cached snapshot")?;
                    println!("{}", json);
                }
                None => println!("No cached draft for session '{}'", session),
            }
        }
        CacheCommands::Discard { session } => {
            let cache = LocalCache::new(&config.cache_dir(), &session);
            let existed = cache.exists();
            cache.clear()?;
            if existed {
                println!("Discarded cached draft for session '{}'", session);
            } else {
                println!("No cached draft for session '{}'", session);
            }
        }
    }
    Ok(())
}
