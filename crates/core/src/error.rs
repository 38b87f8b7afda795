//! Fehlertypen fuer Sprachrohr
//!
//! Zentraler Fehler-Enum der die Fehlertaxonomie des Voice-Kerns abdeckt.
//! Untermodule definieren eigene Fehler und konvertieren via `#[from]`.
//!
//! Fehlerklassen nach Auswirkung:
//! - fatal fuer die Session: `Handshake`, `Socket`, `Zeitlimit`
//! - fatal nur fuer die aktuelle Anfrage: `Transcode`, `SessionBereitsAktiv`
//! - pro Paket/Frame absorbiert: `Authentifizierung`, `Sequenz`, `Codec`

use crate::types::{ChannelId, SessionZustand};
use thiserror::Error;

/// Globaler Result-Alias fuer Sprachrohr
pub type Result<T> = std::result::Result<T, SprachrohrError>;

/// Alle moeglichen Fehler im Sprachrohr-System
#[derive(Debug, Error)]
pub enum SprachrohrError {
    // --- Session-Aufbau ---
    #[error("Handshake fehlgeschlagen: {0}")]
    Handshake(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    #[error("Session fuer {0} ist bereits aktiv")]
    SessionBereitsAktiv(ChannelId),

    #[error("Keine aktive Session fuer {0}")]
    SessionNichtGefunden(ChannelId),

    #[error("Operation im Zustand '{zustand}' nicht erlaubt")]
    NichtBereit { zustand: SessionZustand },

    // --- Paket-Pfad (nicht fatal fuer die Session) ---
    #[error("Paket-Authentifizierung fehlgeschlagen")]
    Authentifizierung,

    #[error("Sequenz ausserhalb des Akzeptanzfensters: erwartet nahe {erwartet}, erhalten {erhalten}")]
    Sequenz { erwartet: u16, erhalten: u16 },

    // --- Audio-Pfad ---
    #[error("Codec-Fehler: {0}")]
    Codec(String),

    #[error("Transcode-Fehler: {0}")]
    Transcode(String),

    // --- Schluessel ---
    #[error("Nonce-Budget erschoepft, Schluessel-Rotation erforderlich")]
    SchluesselRotationNoetig,

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Transport ---
    #[error("Socket-Fehler: {0}")]
    Socket(#[from] std::io::Error),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl SprachrohrError {
    /// Gibt true zurueck wenn der Fehler nur das aktuelle Paket betrifft
    /// und die Session weiterlaufen darf
    pub fn ist_paket_lokal(&self) -> bool {
        matches!(
            self,
            Self::Authentifizierung | Self::Sequenz { .. } | Self::Codec(_)
        )
    }

    /// Gibt true zurueck wenn der Fehler die gesamte Session beendet
    pub fn ist_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::Handshake(_) | Self::Zeitlimit(_) | Self::Socket(_)
        )
    }
}
