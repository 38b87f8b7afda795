//! Session-Ereignisse und die Gateway-Kollaborator-Schnittstelle
//!
//! Der Voice-Kern besitzt den Signaling-Handshake mit der Chat-Plattform
//! NICHT selbst – ein externer Gateway-Client liefert Zugangsdaten und
//! Endpunkt und nimmt Benachrichtigungen entgegen. Dieses Modul definiert
//! die schmale Schnittstelle dazwischen.

use crate::types::{ChannelId, SessionId, SessionZustand};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Ereignisse die eine Voice-Session an den Bot-Layer meldet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Die Session hat einen neuen Zustand erreicht
    ZustandGewechselt {
        session_id: SessionId,
        kanal_id: ChannelId,
        von: SessionZustand,
        nach: SessionZustand,
        zeitpunkt: DateTime<Utc>,
    },

    /// Ein entfernter Sprecher hat begonnen oder aufgehoert zu sprechen
    SprecherAktivitaet {
        kanal_id: ChannelId,
        ssrc: u32,
        spricht: bool,
        zeitpunkt: DateTime<Utc>,
    },

    /// Die Session ist mit einem Fehlergrund beendet worden
    SessionFehlgeschlagen {
        session_id: SessionId,
        kanal_id: ChannelId,
        grund: String,
        zeitpunkt: DateTime<Utc>,
    },
}

/// Rueckkanal zum externen Gateway-Client
///
/// Der Gateway-Client haelt die Control-Plane-Verbindung zur Plattform und
/// ist die einzige Quelle fuer Schluesselmaterial. Die Session ruft:
/// - `schluessel_austausch` einmalig waehrend HANDSHAKING (nachdem die
///   eigene externe Adresse per UDP-Discovery ermittelt wurde),
/// - `schluessel_rotieren` wenn das Nonce-Budget eines Schluessels
///   erschoepft ist (forcierte Rotation, Zaehler laufen weiter),
/// - `speaking_geaendert` bei jedem Wechsel des eigenen Sprech-Status.
#[async_trait::async_trait]
pub trait GatewayRueckkanal: Send + Sync + 'static {
    /// Fordert das 32-Byte Sessionschluessel-Material an.
    ///
    /// `externe_adresse` ist die per Endpunkt-Ermittlung festgestellte
    /// oeffentliche Adresse des lokalen Sockets; der Gateway meldet sie
    /// der Plattform, die daraufhin den Schluessel liefert.
    async fn schluessel_austausch(
        &self,
        kanal_id: ChannelId,
        externe_adresse: SocketAddr,
    ) -> crate::Result<[u8; 32]>;

    /// Fordert einen frischen Schluessel fuer eine laufende Session an
    async fn schluessel_rotieren(&self, kanal_id: ChannelId) -> crate::Result<[u8; 32]>;

    /// Meldet der Plattform den eigenen Sprech-Status (Notifikation,
    /// Fehler werden vom Aufrufer ignoriert)
    async fn speaking_geaendert(&self, kanal_id: ChannelId, spricht: bool);
}
