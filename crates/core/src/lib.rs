//! sprachrohr-core – Gemeinsame Typen, Traits und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Sprachrohr-Crates gemeinsam genutzt werden: ID-Newtypes, der
//! Session-Zustandsautomat, die Fehlertaxonomie, Session-Ereignisse, die
//! Gateway-Kollaborator-Schnittstelle und die TOML-Konfiguration.

pub mod config;
pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use config::SprachrohrConfig;
pub use error::{Result, SprachrohrError};
pub use event::{GatewayRueckkanal, SessionEvent};
pub use types::{ChannelId, SessionId, SessionZustand};
