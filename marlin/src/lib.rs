//! Scripted motion control for Marlin-firmware printers over a serial link.
//!
//! The [`Printer`] session turns high-level motion calls into G-code lines,
//! checks them against configured soft limits, and writes them to the serial
//! transport. Calls chain:
//!
//! ```ignore
//! let config = Arc::new(Config::from_file("config.json")?);
//! let mut printer = Printer::connect(config).await?;
//! printer.home_all().await?
//!     .move_z(20.0).await?
//!     .move_xy(60.0, 60.0).await?;
//! ```
//!
//! Position tracking is open loop: the firmware sends no feedback for
//! ordinary moves, so [`Printer::home`] is the only resynchronization point.

pub mod config;
pub mod connection;
pub mod gcode;
pub mod printer;

pub use config::{Config, ConfigError};
pub use gcode::{Axis, CoordinateMode, Orientation, Plane, Unit};
pub use printer::{Printer, PrinterError};
