//! # Autocall
//!
//! Automatic redialing with optional call-screen termination.
//!
//! This crate ties together [`autocall_redial_core`] and
//! [`autocall_call_ui_watcher`]: it loads a TOML configuration, installs the
//! tracing subscriber and wires both components to a phone host. A
//! [`SimulatedPhone`] host is included so runs can be exercised without a
//! device.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use autocall::{Autocall, AutocallConfig, PhoneScript};
//!
//! # async fn example() -> autocall::AutocallResult<()> {
//! let config = AutocallConfig::new().with_target_number("5551234").with_max_attempts(5);
//! let (app, _phone) = Autocall::builder(config.clone()).build_simulated(PhoneScript::default().answer_on(3))?;
//!
//! let report = app.run(config.retry_config()?).await?;
//! println!("{:?} after {} dials", report.outcome, report.dials_placed);
//! app.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod simulation;

pub use app::{Autocall, AutocallBuilder, RunReport};
pub use config::{AutocallConfig, LoggingSettings, RedialSettings};
pub use error::{AutocallError, AutocallResult};
pub use logging::{log_welcome, parse_log_level, setup_logging, LoggingConfig};
pub use simulation::{PhoneScript, SimulatedPhone};

pub use autocall_call_ui_watcher as watcher;
pub use autocall_redial_core as redial;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
