//! CLI command implementations.
//!
//! | Module      | Commands handled |
//! |-------------|------------------|
//! | `run`       | `Run`            |
//! | `sessions`  | `Sessions`       |
//! | `config`    | `Config`         |

pub mod config;
pub mod run;
pub mod sessions;

pub use config::cmd_config;
pub use run::cmd_run;
pub use sessions::cmd_sessions;
