//! Project bootstrap command: `draftsync init`.

use anyhow::Result;

pub fn cmd_init(project_dir: &std::path::Path) -> Result<()> {
    use draftsync::init::{init_project, is_initialized};

    let was_initialized = is_initialized(project_dir);
    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized draftsync project at {}",
            result.config_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .draftsync/");
        println!("  ├── draftsync.toml  # Remote, auto-save and validation settings");
        println!("  ├── cache/          # Recovery records for unsaved drafts");
        println!("  └── logs/           # draftsync.log");
        println!();
        println!("Next steps:");
        println!("  1. Set [remote].base_url in draftsync.toml (or DRAFTSYNC_BASE_URL)");
        println!("  2. Export the bearer token as DRAFTSYNC_TOKEN");
        println!("  3. Run `draftsync sync --draft draft.json --dry-run` to preview a cycle");
    } else if was_initialized {
        println!(
            "draftsync project already initialized at {}",
            result.config_dir.display()
        );
        if result.wrote_config {
            println!("Restored missing draftsync.toml with defaults.");
        } else {
            println!("Directory structure verified.");
        }
    } else {
        println!(
            "Completed draftsync initialization at {}",
            result.config_dir.display()
        );
    }

    Ok(())
}
