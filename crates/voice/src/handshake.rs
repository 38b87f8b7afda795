//! UDP-Endpunkt-Ermittlung (Hole-Punch) waehrend CONNECTING
//!
//! Sendet das Discovery-Paket an den verbundenen Voice-Endpunkt und
//! wartet auf die Antwort mit der eigenen oeffentlichen Adresse. Erst
//! mit dieser Adresse kann der Gateway den Schluessel-Austausch
//! abschliessen.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use sprachrohr_core::{Result, SprachrohrError};
use sprachrohr_protocol::discovery::{discovery_anfrage, discovery_antwort_parsen};

/// Anzahl der Discovery-Versuche bevor der Handshake als gescheitert gilt
pub const DISCOVERY_VERSUCHE: u32 = 3;

/// Wartezeit auf eine Discovery-Antwort pro Versuch
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Ermittelt die eigene oeffentliche Adresse ueber den Voice-Endpunkt
///
/// Der Socket muss bereits mit dem Endpunkt verbunden sein. Nicht
/// parsbare Antworten werden verworfen und der Versuch wiederholt.
///
/// # Fehler
/// - `Socket` bei IO-Fehlern
/// - `Handshake` wenn nach allen Versuchen keine gueltige Antwort kam
pub async fn endpunkt_ermitteln(
    socket: &UdpSocket,
    ssrc: u32,
    versuche: u32,
    timeout: Duration,
) -> Result<SocketAddr> {
    let anfrage = discovery_anfrage(ssrc);
    let mut buf = [0u8; 128];

    for versuch in 1..=versuche {
        socket.send(&anfrage).await?;

        match tokio::time::timeout(timeout, socket.recv(&mut buf)).await {
            Ok(Ok(laenge)) => match discovery_antwort_parsen(&buf[..laenge]) {
                Ok(adresse) => {
                    tracing::debug!(adresse = %adresse, versuch, "Externe Adresse ermittelt");
                    return Ok(adresse);
                }
                Err(e) => {
                    tracing::debug!(fehler = %e, versuch, "Ungueltige Discovery-Antwort");
                }
            },
            Ok(Err(e)) => return Err(SprachrohrError::Socket(e)),
            Err(_) => {
                tracing::debug!(versuch, "Discovery-Antwort-Timeout");
            }
        }
    }

    Err(SprachrohrError::Handshake(format!(
        "Endpunkt-Ermittlung ohne gueltige Antwort nach {versuche} Versuchen"
    )))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
