//! Gemeinsame Identifikations- und Zustandstypen fuer Sprachrohr
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Die Kanal-ID
//! kommt als numerische Snowflake vom Chat-Plattform-Gateway; die
//! Session-ID ist eine lokal erzeugte UUID pro Voice-Verbindung.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige Kanal-ID (Snowflake der Chat-Plattform)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl ChannelId {
    /// Gibt den inneren Snowflake-Wert zurueck
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kanal:{}", self.0)
    }
}

impl From<u64> for ChannelId {
    fn from(roh: u64) -> Self {
        Self(roh)
    }
}

/// Eindeutige Session-ID (eine pro aufgebauter Voice-Verbindung)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionZustand
// ---------------------------------------------------------------------------

/// Zustandsautomat einer Voice-Session
///
/// ```text
/// Connecting -> Handshaking -> Ready <-> Speaking
///                                 |
///                                 v
///                             Closing -> Closed
/// ```
///
/// `Closing` ist von jedem Zustand aus erreichbar (expliziter Stop oder
/// fataler Fehler); `Closed` ist terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionZustand {
    /// Socket geoeffnet, UDP-Endpunkt-Ermittlung laeuft
    Connecting,
    /// Schluessel-Austausch mit dem Transport laeuft; kein Audio
    Handshaking,
    /// Verbunden und empfangsbereit; Decode-Pfad aktiv
    Ready,
    /// Ausgehende Frames werden im Takt versiegelt und gesendet
    Speaking,
    /// Teardown angefordert; laufende Sends duerfen abschliessen
    Closing,
    /// Terminal: Socket geschlossen, Schluessel geloescht
    Closed,
}

impl SessionZustand {
    /// Prueft ob in diesem Zustand Audio fliessen darf
    pub fn audio_erlaubt(&self) -> bool {
        matches!(self, Self::Ready | Self::Speaking)
    }

    /// Prueft ob der Zustand terminal ist
    pub fn ist_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for SessionZustand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Speaking => "speaking",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_eindeutig() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b, "Zwei neue SessionIds muessen verschieden sein");
    }

    #[test]
    fn channel_id_display() {
        let id = ChannelId(123456789);
        assert_eq!(id.to_string(), "kanal:123456789");
    }

    #[test]
    fn ids_sind_serde_kompatibel() {
        let kid = ChannelId(42);
        let json = serde_json::to_string(&kid).unwrap();
        let kid2: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(kid, kid2);
    }

    #[test]
    fn zustand_audio_erlaubt() {
        assert!(SessionZustand::Ready.audio_erlaubt());
        assert!(SessionZustand::Speaking.audio_erlaubt());
        assert!(!SessionZustand::Handshaking.audio_erlaubt());
        assert!(!SessionZustand::Closing.audio_erlaubt());
    }

    #[test]
    fn zustand_terminal() {
        assert!(SessionZustand::Closed.ist_terminal());
        assert!(!SessionZustand::Ready.ist_terminal());
    }
}
