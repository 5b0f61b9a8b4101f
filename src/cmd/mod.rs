//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                 |
//! |------------|----------------------------------|
//! | `init`     | `Init`                           |
//! | `config`   | `Config`                         |
//! | `classify` | `Classify`                       |
//! | `cache`    | `Cache`                          |
//! | `draft`    | `Save`, `Publish`, `Sync`        |

pub mod cache;
pub mod classify;
pub mod config;
pub mod draft;
pub mod init;

pub use cache::cmd_cache;
pub use classify::cmd_classify;
pub use config::cmd_config;
pub use draft::{cmd_publish, cmd_save, cmd_sync};
pub use init::cmd_init;
