//! Session-Registry – prozessweite Tabelle aktiver Voice-Sessions
//!
//! Erzwingt hoechstens eine aktive Session pro Kanal. Die Registry ist
//! eine explizit konstruierte, injizierte Instanz (kein verstecktes
//! Singleton) und serialisiert ihre Mutationen ueber einen einzelnen
//! Mutex – Joins und Leaves sind selten im Vergleich zur Frame-Rate.
//!
//! Der Verbindungsaufbau laeuft zweiphasig: erst wird der Kanal-Slot
//! reserviert (Lock kurz gehalten, nie ueber IO), dann ausserhalb des
//! Locks verbunden. Terminal gewordene Sessions (fataler Fehler) werden
//! beim naechsten Beitritt aus der Tabelle gefegt.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use sprachrohr_core::config::SprachrohrConfig;
use sprachrohr_core::event::GatewayRueckkanal;
use sprachrohr_core::{ChannelId, Result, SessionZustand, SprachrohrError};

use crate::session::{SessionCredentials, VoiceSession};

enum RegistryEintrag {
    /// Slot reserviert, Verbindungsaufbau laeuft
    ImAufbau,
    /// Aufgebaute Session
    Aktiv(Arc<VoiceSession>),
}

/// Prozessweite Tabelle aktiver Voice-Sessions, eine pro Kanal
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ChannelId, RegistryEintrag>>,
}

impl SessionRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self::default()
    }

    /// Tritt einem Kanal bei und baut die Voice-Session auf
    ///
    /// # Fehler
    /// - `SessionBereitsAktiv` wenn der Kanal bereits belegt ist (auch
    ///   waehrend eines laufenden Aufbaus)
    /// - Aufbau-Fehler von [`VoiceSession::verbinden`]; der Slot wird
    ///   dabei wieder freigegeben
    pub async fn beitreten(
        &self,
        kanal_id: ChannelId,
        credentials: SessionCredentials,
        config: SprachrohrConfig,
        gateway: Arc<dyn GatewayRueckkanal>,
    ) -> Result<Arc<VoiceSession>> {
        {
            let mut tabelle = self.sessions.lock();
            match tabelle.get(&kanal_id) {
                Some(RegistryEintrag::Aktiv(session)) if session.zustand().ist_terminal() => {
                    // Fatal beendete Session raeumt ihren Slot beim
                    // naechsten Beitritt
                    tabelle.remove(&kanal_id);
                }
                Some(_) => return Err(SprachrohrError::SessionBereitsAktiv(kanal_id)),
                None => {}
            }
            tabelle.insert(kanal_id, RegistryEintrag::ImAufbau);
        }

        match VoiceSession::verbinden(kanal_id, credentials, config, gateway).await {
            Ok(session) => {
                self.sessions
                    .lock()
                    .insert(kanal_id, RegistryEintrag::Aktiv(Arc::clone(&session)));
                tracing::info!(kanal = %kanal_id, "Session registriert");
                Ok(session)
            }
            Err(e) => {
                self.sessions.lock().remove(&kanal_id);
                Err(e)
            }
        }
    }

    /// Verlaesst einen Kanal: Session-Teardown und Slot-Freigabe
    ///
    /// # Fehler
    /// - `SessionNichtGefunden` wenn der Kanal nicht belegt ist
    /// - `NichtBereit` wenn der Aufbau noch laeuft
    pub async fn verlassen(&self, kanal_id: ChannelId) -> Result<()> {
        let eintrag = {
            let mut tabelle = self.sessions.lock();
            match tabelle.remove(&kanal_id) {
                Some(RegistryEintrag::ImAufbau) => {
                    // Aufbau laeuft noch – Slot zuruecklegen, der Aufrufer
                    // versucht es spaeter erneut
                    tabelle.insert(kanal_id, RegistryEintrag::ImAufbau);
                    return Err(SprachrohrError::NichtBereit {
                        zustand: SessionZustand::Connecting,
                    });
                }
                andere => andere,
            }
        };

        match eintrag {
            Some(RegistryEintrag::Aktiv(session)) => {
                session.schliessen().await;
                tracing::info!(kanal = %kanal_id, "Session entfernt");
                Ok(())
            }
            _ => Err(SprachrohrError::SessionNichtGefunden(kanal_id)),
        }
    }

    /// Sucht die aktive Session eines Kanals
    pub fn holen(&self, kanal_id: ChannelId) -> Option<Arc<VoiceSession>> {
        match self.sessions.lock().get(&kanal_id) {
            Some(RegistryEintrag::Aktiv(session)) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    /// Anzahl belegter Kanaele (inklusive laufender Aufbauten)
    pub fn anzahl(&self) -> usize {
        self.sessions.lock().len()
    }
}
