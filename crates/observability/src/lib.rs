//! sprachrohr-observability – Logging-Bootstrap
//!
//! Initialisiert tracing-subscriber fuer den Voice-Kern. Das
//! Schluesselmaterial der Sessions erscheint per Konstruktion nie in
//! Logs (redacted `Debug`); dieses Crate konfiguriert nur Level und
//! Format.

pub mod logging;

pub use logging::{logging_initialisieren, LoggingBootstrap};
