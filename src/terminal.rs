//! Terminal handling module
//!
//! Groups all terminal-related functionality:
//! - ANSI escape sequences
//! - Input encoding
//! - Host terminal attachment
//! - Status and error panels
//! - The surface that renders a remote session

pub mod escape;
pub mod host;
pub mod input;
pub mod panel;
pub mod surface;

pub use host::{CrosstermHost, Host, Viewport};
pub use surface::TerminalSurface;
