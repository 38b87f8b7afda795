//! Session-Schluesselmaterial
//!
//! Der 32-Byte Sessionschluessel gehoert exklusiv der Voice-Session.
//! Er wird nie geloggt, nie serialisiert und beim Teardown sowie bei
//! jeder Rotation ueberschrieben. Sende- und Empfangspfad teilen sich
//! den Schluessel ueber das [`SchluesselLager`] (RwLock, Leser im Hot
//! Path, Schreiber nur bei Rotation/Teardown).

use crate::error::{CryptoError, CryptoResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// Laenge des Sessionschluessels in Bytes
pub const SCHLUESSEL_LAENGE: usize = 32;

// ---------------------------------------------------------------------------
// SessionKey
// ---------------------------------------------------------------------------

/// Exklusiv gehaltenes 32-Byte Schluesselmaterial
///
/// `Debug` gibt das Material nicht preis; `Drop` ueberschreibt es.
pub struct SessionKey {
    bytes: [u8; SCHLUESSEL_LAENGE],
}

impl SessionKey {
    /// Erstellt einen SessionKey aus einem 32-Byte-Array
    pub fn neu(bytes: [u8; SCHLUESSEL_LAENGE]) -> Self {
        Self { bytes }
    }

    /// Erstellt einen SessionKey aus einem Slice
    ///
    /// # Fehler
    /// `UngueltigeSchluesselLaenge` wenn das Slice nicht 32 Bytes lang ist
    pub fn aus_slice(slice: &[u8]) -> CryptoResult<Self> {
        if slice.len() != SCHLUESSEL_LAENGE {
            return Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: SCHLUESSEL_LAENGE,
                erhalten: slice.len(),
            });
        }
        let mut bytes = [0u8; SCHLUESSEL_LAENGE];
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    /// Gibt das rohe Schluesselmaterial zurueck (nur fuer die
    /// Cipher-Initialisierung im selben Crate gedacht)
    pub fn as_bytes(&self) -> &[u8; SCHLUESSEL_LAENGE] {
        &self.bytes
    }

    /// Ueberschreibt das Material mit Nullen
    fn loeschen(&mut self) {
        for b in self.bytes.iter_mut() {
            *b = 0;
        }
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.loeschen();
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Schluesselmaterial darf nie in Logs landen
        write!(f, "SessionKey(***)")
    }
}

// ---------------------------------------------------------------------------
// SchluesselLager
// ---------------------------------------------------------------------------

/// Gemeinsamer Schluessel-Speicher fuer Sende- und Empfangspfad
///
/// Clonen teilt das innere Material (Arc). Nach [`SchluesselLager::leeren`]
/// schlagen alle weiteren Krypto-Operationen fehl.
#[derive(Clone)]
pub struct SchluesselLager {
    inner: Arc<RwLock<Option<SessionKey>>>,
}

impl SchluesselLager {
    /// Erstellt ein Lager mit initialem Schlusselmaterial
    pub fn neu(schluessel: SessionKey) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(schluessel))),
        }
    }

    /// Fuehrt eine Operation mit dem aktuellen Schluessel aus
    ///
    /// # Fehler
    /// `Verschluesselung` wenn das Lager bereits geleert wurde
    pub fn mit_schluessel<T>(&self, f: impl FnOnce(&SessionKey) -> CryptoResult<T>) -> CryptoResult<T> {
        let guard = self.inner.read();
        match guard.as_ref() {
            Some(schluessel) => f(schluessel),
            None => Err(CryptoError::Verschluesselung(
                "Schluessel bereits geloescht (Session beendet)".into(),
            )),
        }
    }

    /// Rotiert den Schluessel: das alte Material wird beim Drop
    /// ueberschrieben, das neue uebernommen
    pub fn rotieren(&self, neu: SessionKey) {
        let mut guard = self.inner.write();
        *guard = Some(neu);
        tracing::info!("Sessionschluessel rotiert");
    }

    /// Loescht das Schluesselmaterial endgueltig (Teardown)
    pub fn leeren(&self) {
        let mut guard = self.inner.write();
        *guard = None;
    }

    /// Prueft ob noch Schluesselmaterial vorhanden ist
    pub fn ist_aktiv(&self) -> bool {
        self.inner.read().is_some()
    }
}
