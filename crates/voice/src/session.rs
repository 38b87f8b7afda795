//! Voice-Session – Zustandsautomat und Sende-/Empfangs-Loops
//!
//! Eine Session besitzt genau eine Kanal-Verbindung: Schluessel-Lager,
//! Socket, Sende-Zaehler und die Decode-Kontexte aller entfernten
//! Sprecher. Die Phasen CONNECTING (Endpunkt-Ermittlung) und HANDSHAKING
//! (Schluessel-Austausch ueber den Gateway, hartes Zeitlimit) laufen in
//! [`VoiceSession::verbinden`]; die fertig aufgebaute Session startet in
//! READY.
//!
//! ## Nebenlaeufigkeit
//! Zwei unabhaengige Loops teilen sich nur disjunkten Zustand:
//! - Empfangs-Loop: blockiert auf dem Socket, besitzt die
//!   Sprecher-Kontexte exklusiv, blockiert nie auf Konsumenten
//!   (broadcast verwirft bei Rueckstau die aeltesten Frames)
//! - Sende-Loop: wacht im Frame-Takt auf, besitzt den PacketSealer
//!   (lokale Zaehler) exklusiv fuer die Dauer einer Wiedergabe
//!
//! Kein globaler Lock wird ueber Netzwerk-IO gehalten.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use sprachrohr_audio::activity::{AktivitaetsWechsel, SprachAktivitaet};
use sprachrohr_audio::codec::{OpusDecoder, OpusEncoder};
use sprachrohr_audio::error::AudioError;
use sprachrohr_audio::frame::{Frame, OPUS_STILLE_FRAME};
use sprachrohr_audio::transcode::{AudioQuelle, TranscodeBruecke};
use sprachrohr_core::config::SprachrohrConfig;
use sprachrohr_core::event::{GatewayRueckkanal, SessionEvent};
use sprachrohr_core::{ChannelId, Result, SessionId, SessionZustand, SprachrohrError};
use sprachrohr_crypto::session_key::SessionKey;
use sprachrohr_protocol::VoicePacket;

use crate::handshake::{endpunkt_ermitteln, DISCOVERY_TIMEOUT, DISCOVERY_VERSUCHE};
use crate::jitter::{JitterConfig, JitterErgebnis, ReorderJitterBuffer, SequenzEntroller};
use crate::pacing::{SendeTakt, TaktFrame};
use crate::packetizer::{self, PacketOpener, PacketSealer};

/// Maximale UDP-Paketgroesse (Header 12 + Max-Payload 1280 + Puffer)
const UDP_PUFFER: usize = 1400;

/// Kapazitaet des Konsumenten-Kanals fuer dekodierte Frames.
/// Bei anhaltendem Rueckstau verlieren langsame Konsumenten die
/// aeltesten Frames (broadcast-Lag), nie der Empfangs-Loop Zeit.
const GEHOERT_KAPAZITAET: usize = 128;

/// Kapazitaet des Ereignis-Kanals
const EREIGNIS_KAPAZITAET: usize = 64;

fn audio_fehler(e: AudioError) -> SprachrohrError {
    match e {
        AudioError::CodecFehler(m) => SprachrohrError::Codec(m),
        AudioError::UngueltigeFrameLaenge { erwartet, erhalten } => SprachrohrError::Codec(
            format!("Frame-Laenge {erhalten} statt {erwartet} Samples"),
        ),
        AudioError::Konfiguration(m) => SprachrohrError::Konfiguration(m),
        AudioError::TranscoderStart(m) => SprachrohrError::Transcode(m),
        AudioError::TranscoderBeendet { code } => {
            SprachrohrError::Transcode(format!("Transcoder beendet mit Status {code:?}"))
        }
        AudioError::Io(e) => SprachrohrError::Socket(e),
    }
}

// ---------------------------------------------------------------------------
// Zugangsdaten & Konsumenten-Typen
// ---------------------------------------------------------------------------

/// Vom externen Gateway gelieferte Zugangsdaten einer Kanal-Verbindung
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    /// Eigene SSRC (von der Plattform zugeteilt)
    pub ssrc: u32,
    /// UDP-Endpunkt des Voice-Servers
    pub endpunkt: SocketAddr,
}

/// Ein dekodierter Frame eines entfernten Sprechers
#[derive(Debug, Clone)]
pub struct GehoerterFrame {
    /// SSRC des Sprechers
    pub ssrc: u32,
    /// Dekodierter PCM-Frame (Stille-Frames stammen aus Luecken-Fuellung)
    pub frame: Frame,
}

/// Beobachtbarer Status eines entfernten Sprechers
#[derive(Debug, Clone, Copy, Default)]
pub struct SprecherStatus {
    /// Spricht der Sprecher gerade (Aktivitaets-Erkennung)?
    pub spricht: bool,
}

// ---------------------------------------------------------------------------
// SprecherKontext (exklusiv im Empfangs-Loop)
// ---------------------------------------------------------------------------

/// Decode-Zustand eines entfernten Sprechers
///
/// Wird beim ersten Paket einer neuen SSRC lazy angelegt und nach
/// Idle-Timeout vom Eviction-Sweep entfernt. Decoder und Jitter-Buffer
/// gehoeren exklusiv diesem Kontext.
struct SprecherKontext {
    entroller: SequenzEntroller,
    jitter: ReorderJitterBuffer,
    decoder: OpusDecoder,
    aktivitaet: SprachAktivitaet,
    letzte_aktivitaet: Instant,
}

impl SprecherKontext {
    fn neu(config: &SprachrohrConfig) -> Result<Self> {
        Ok(Self {
            entroller: SequenzEntroller::neu(),
            jitter: ReorderJitterBuffer::neu(JitterConfig {
                fenster: config.jitter.reorder_fenster,
                max_pakete: config.jitter.max_pakete,
            }),
            decoder: OpusDecoder::neu(&config.audio).map_err(audio_fehler)?,
            aktivitaet: SprachAktivitaet::standard(),
            letzte_aktivitaet: Instant::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// VoiceSession
// ---------------------------------------------------------------------------

/// Eine aufgebaute Voice-Kanal-Verbindung
pub struct VoiceSession {
    session_id: SessionId,
    kanal_id: ChannelId,
    config: SprachrohrConfig,
    zustand: RwLock<SessionZustand>,
    socket: Arc<UdpSocket>,
    lager: sprachrohr_crypto::SchluesselLager,
    sealer: Arc<AsyncMutex<PacketSealer>>,
    gateway: Arc<dyn GatewayRueckkanal>,
    sprecher_status: DashMap<u32, SprecherStatus>,
    gehoert_tx: broadcast::Sender<GehoerterFrame>,
    events_tx: broadcast::Sender<SessionEvent>,
    shutdown_tx: watch::Sender<bool>,
    empfangs_task: AsyncMutex<Option<JoinHandle<()>>>,
    sende_task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl VoiceSession {
    /// Baut eine Kanal-Verbindung auf: CONNECTING (Socket +
    /// Endpunkt-Ermittlung), dann HANDSHAKING (Schluessel-Austausch,
    /// hartes Zeitlimit), dann READY mit laufendem Empfangs-Loop.
    ///
    /// # Fehler
    /// - `Zeitlimit` wenn eine Handshake-Phase das Limit ueberschreitet
    /// - `Handshake` wenn die Endpunkt-Ermittlung scheitert
    /// - `Socket` bei IO-Fehlern waehrend des Aufbaus
    pub async fn verbinden(
        kanal_id: ChannelId,
        credentials: SessionCredentials,
        config: SprachrohrConfig,
        gateway: Arc<dyn GatewayRueckkanal>,
    ) -> Result<Arc<Self>> {
        config
            .audio
            .validieren()
            .map_err(SprachrohrError::Konfiguration)?;

        let session_id = SessionId::new();
        let handshake_limit = Duration::from_millis(config.session.handshake_timeout_ms);

        tracing::info!(
            session_id = %session_id,
            kanal = %kanal_id,
            endpunkt = %credentials.endpunkt,
            "Voice-Session: CONNECTING"
        );
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(credentials.endpunkt).await?;

        let externe = tokio::time::timeout(
            handshake_limit,
            endpunkt_ermitteln(&socket, credentials.ssrc, DISCOVERY_VERSUCHE, DISCOVERY_TIMEOUT),
        )
        .await
        .map_err(|_| SprachrohrError::Zeitlimit("Endpunkt-Ermittlung".into()))??;

        tracing::info!(
            session_id = %session_id,
            kanal = %kanal_id,
            externe_adresse = %externe,
            "Voice-Session: HANDSHAKING"
        );
        let material = tokio::time::timeout(
            handshake_limit,
            gateway.schluessel_austausch(kanal_id, externe),
        )
        .await
        .map_err(|_| SprachrohrError::Zeitlimit("Schluessel-Austausch".into()))??;

        let (sealer, opener, lager) = packetizer::paar(
            credentials.ssrc,
            SessionKey::neu(material),
            config.session.nonce_budget,
        );

        let (shutdown_tx, _) = watch::channel(false);
        let (events_tx, _) = broadcast::channel(EREIGNIS_KAPAZITAET);
        let (gehoert_tx, _) = broadcast::channel(GEHOERT_KAPAZITAET);

        let session = Arc::new(Self {
            session_id,
            kanal_id,
            config,
            zustand: RwLock::new(SessionZustand::Ready),
            socket: Arc::new(socket),
            lager,
            sealer: Arc::new(AsyncMutex::new(sealer)),
            gateway,
            sprecher_status: DashMap::new(),
            gehoert_tx,
            events_tx,
            shutdown_tx,
            empfangs_task: AsyncMutex::new(None),
            sende_task: AsyncMutex::new(None),
        });

        tracing::info!(session_id = %session_id, kanal = %kanal_id, "Voice-Session: READY");

        let loop_session = Arc::clone(&session);
        let handle = tokio::spawn(async move { loop_session.empfangs_loop(opener).await });
        *session.empfangs_task.lock().await = Some(handle);

        Ok(session)
    }

    /// Session-ID dieser Verbindung
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Kanal dieser Verbindung
    pub fn kanal_id(&self) -> ChannelId {
        self.kanal_id
    }

    /// Aktueller Zustand
    pub fn zustand(&self) -> SessionZustand {
        *self.zustand.read()
    }

    /// Abonniert die dekodierten Frames aller entfernten Sprecher
    ///
    /// Langsame Konsumenten verlieren bei Rueckstau die aeltesten Frames
    /// (`RecvError::Lagged`); der Empfangs-Loop blockiert nie.
    pub fn lauschen(&self) -> broadcast::Receiver<GehoerterFrame> {
        self.gehoert_tx.subscribe()
    }

    /// Abonniert Session-Ereignisse (Zustandswechsel, Sprecher-Aktivitaet)
    pub fn ereignisse(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Spricht der Sprecher mit dieser SSRC gerade?
    pub fn spricht_gerade(&self, ssrc: u32) -> bool {
        self.sprecher_status
            .get(&ssrc)
            .map(|status| status.spricht)
            .unwrap_or(false)
    }

    /// SSRCs aller aktuell getrackten Sprecher
    pub fn sprecher(&self) -> Vec<u32> {
        self.sprecher_status.iter().map(|eintrag| *eintrag.key()).collect()
    }

    /// Startet die Wiedergabe einer Audio-Quelle (SPEAKING)
    ///
    /// Kehrt sofort zurueck; die Wiedergabe laeuft im Sende-Loop und
    /// faellt nach Strom-Ende selbststaendig auf READY zurueck.
    ///
    /// # Fehler
    /// - `NichtBereit` wenn die Session nicht in READY ist (insbesondere
    ///   waehrend einer laufenden Wiedergabe)
    /// - `Transcode` wenn der Transcoder nicht startbar ist – fatal nur
    ///   fuer diese Anfrage, die Session bleibt READY
    pub async fn abspielen(self: &Arc<Self>, quelle: AudioQuelle) -> Result<()> {
        {
            let zustand = *self.zustand.read();
            if zustand != SessionZustand::Ready {
                return Err(SprachrohrError::NichtBereit { zustand });
            }
        }

        let mut encoder = OpusEncoder::neu(&self.config.audio).map_err(audio_fehler)?;
        let bruecke = TranscodeBruecke::neu(self.config.audio.clone());
        let mut strom = bruecke.zu_pcm(&quelle).await.map_err(audio_fehler)?;

        self.zustand_setzen(SessionZustand::Speaking);
        self.gateway.speaking_geaendert(self.kanal_id, true).await;

        let (tx, rx) = mpsc::channel::<Vec<u8>>(self.config.jitter.sende_queue_tiefe);

        // Feeder: Transcoder-Strom -> Opus -> Sende-Queue. Blockiert auf
        // der vollen Queue (Backpressure), nie umgekehrt der Takt auf ihm.
        let feeder = tokio::spawn(async move {
            while let Some(ergebnis) = strom.naechster().await {
                match ergebnis {
                    Ok(frame) => match encoder.encode(&frame) {
                        Ok(opus) => {
                            if tx.send(opus).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(fehler = %e, "Frame nicht kodierbar, uebersprungen");
                        }
                    },
                    Err(e) => {
                        tracing::warn!(fehler = %e, "Wiedergabe-Quelle abgebrochen");
                        break;
                    }
                }
            }
        });

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move { session.sende_loop(rx, feeder).await });
        *self.sende_task.lock().await = Some(handle);

        Ok(())
    }

    /// Beendet die Session: CLOSING (Loops laufen begrenzt aus), dann
    /// CLOSED (Socket zu, Schluessel geloescht). Idempotent.
    pub async fn schliessen(&self) {
        {
            let zustand = *self.zustand.read();
            if zustand.ist_terminal() {
                return;
            }
        }
        self.zustand_setzen(SessionZustand::Closing);
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.sende_task.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.empfangs_task.lock().await.take() {
            let _ = handle.await;
        }

        self.lager.leeren();
        self.zustand_setzen(SessionZustand::Closed);
        tracing::info!(
            session_id = %self.session_id,
            kanal = %self.kanal_id,
            "Session geschlossen"
        );
    }

    // -----------------------------------------------------------------------
    // Zustandsuebergaenge
    // -----------------------------------------------------------------------

    fn zustand_setzen(&self, nach: SessionZustand) {
        let von = {
            let mut guard = self.zustand.write();
            let von = *guard;
            if von == nach || von.ist_terminal() {
                return;
            }
            *guard = nach;
            von
        };
        tracing::debug!(
            session_id = %self.session_id,
            von = %von,
            nach = %nach,
            "Session-Zustand gewechselt"
        );
        let _ = self.events_tx.send(SessionEvent::ZustandGewechselt {
            session_id: self.session_id,
            kanal_id: self.kanal_id,
            von,
            nach,
            zeitpunkt: Utc::now(),
        });
    }

    /// Wechselt nur wenn der aktuelle Zustand `von` ist
    fn zustand_wechsel_wenn(&self, von: SessionZustand, nach: SessionZustand) {
        let wechseln = *self.zustand.read() == von;
        if wechseln {
            self.zustand_setzen(nach);
        }
    }

    /// Fataler Session-Fehler: Teardown ohne externen `schliessen`-Aufruf
    fn fatal_beenden(&self, grund: String) {
        tracing::error!(
            session_id = %self.session_id,
            kanal = %self.kanal_id,
            grund = %grund,
            "Session fatal beendet"
        );
        self.zustand_setzen(SessionZustand::Closing);
        let _ = self.events_tx.send(SessionEvent::SessionFehlgeschlagen {
            session_id: self.session_id,
            kanal_id: self.kanal_id,
            grund,
            zeitpunkt: Utc::now(),
        });
        let _ = self.shutdown_tx.send(true);
        self.lager.leeren();
        self.zustand_setzen(SessionZustand::Closed);
    }

    // -----------------------------------------------------------------------
    // Empfangs-Loop
    // -----------------------------------------------------------------------

    async fn empfangs_loop(self: Arc<Self>, opener: PacketOpener) {
        let mut kontexte: HashMap<u32, SprecherKontext> = HashMap::new();
        let idle = Duration::from_millis(self.config.session.sprecher_idle_ms);
        let mut eviction = tokio::time::interval(Duration::from_millis(
            self.config.session.eviction_intervall_ms,
        ));
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        // Stack-allokierter Empfangspuffer, wiederverwendet (kein Heap pro Paket)
        let mut buf = [0u8; UDP_PUFFER];

        tracing::debug!(session_id = %self.session_id, "Empfangs-Loop gestartet");

        loop {
            tokio::select! {
                ergebnis = self.socket.recv(&mut buf) => match ergebnis {
                    Ok(laenge) => self.paket_verarbeiten(&buf[..laenge], &opener, &mut kontexte),
                    Err(e) => {
                        // Socket-Fehler sind fatal fuer die Session, nicht
                        // fuer den Prozess
                        self.fatal_beenden(format!("Socket-Fehler: {e}"));
                        break;
                    }
                },
                _ = eviction.tick() => self.inaktive_bereinigen(&mut kontexte, idle),
                _ = shutdown_rx.changed() => break,
            }
        }

        tracing::debug!(session_id = %self.session_id, "Empfangs-Loop beendet");
    }

    /// Hot Path: ein eingehendes UDP-Paket, early return bei jedem Fehler
    fn paket_verarbeiten(
        &self,
        daten: &[u8],
        opener: &PacketOpener,
        kontexte: &mut HashMap<u32, SprecherKontext>,
    ) {
        let paket = match VoicePacket::decode(daten) {
            Ok(p) => p,
            Err(e) => {
                tracing::trace!(fehler = %e, "Ungueltiges Voice-Paket verworfen");
                return;
            }
        };
        let ssrc = paket.header.ssrc;

        let kontext = match kontexte.entry(ssrc) {
            std::collections::hash_map::Entry::Occupied(eintrag) => eintrag.into_mut(),
            std::collections::hash_map::Entry::Vacant(eintrag) => {
                match SprecherKontext::neu(&self.config) {
                    Ok(kontext) => {
                        tracing::debug!(ssrc, "Neuer Sprecher-Kontext angelegt");
                        self.sprecher_status.insert(ssrc, SprecherStatus::default());
                        eintrag.insert(kontext)
                    }
                    Err(e) => {
                        tracing::warn!(fehler = %e, ssrc, "Sprecher-Kontext nicht anlegbar");
                        return;
                    }
                }
            }
        };

        let letzte_seq = kontext.entroller.hoechste_sequenz();
        match opener.oeffnen(&paket.header, &paket.payload, letzte_seq) {
            Ok(opus) => {
                kontext.letzte_aktivitaet = Instant::now();
                let sequenz = kontext.entroller.entrollen(paket.header.sequence);
                kontext.jitter.einfuegen(sequenz, opus);
                self.jitter_abarbeiten(ssrc, kontext);
            }
            Err(e) if e.ist_paket_lokal() => {
                tracing::debug!(fehler = %e, ssrc, sequenz = paket.header.sequence, "Paket verworfen");
            }
            Err(e) => {
                tracing::warn!(fehler = %e, ssrc, "Paket nicht verarbeitbar");
            }
        }
    }

    /// Entnimmt alles Faellige aus dem Jitter-Buffer, dekodiert und
    /// reicht an Konsumenten weiter
    fn jitter_abarbeiten(&self, ssrc: u32, kontext: &mut SprecherKontext) {
        while let Some(ergebnis) = kontext.jitter.entnehmen() {
            let frame = match ergebnis {
                JitterErgebnis::Nutzdaten(opus) => match kontext.decoder.decode(&opus) {
                    Ok(frame) => frame,
                    Err(e) => {
                        // Korrupter Bitstream: Stille substituieren, Strom
                        // laeuft weiter
                        tracing::debug!(fehler = %e, ssrc, "Frame nicht dekodierbar");
                        kontext
                            .decoder
                            .decode_verlust()
                            .unwrap_or_else(|_| Frame::stille())
                    }
                },
                JitterErgebnis::Luecke => kontext
                    .decoder
                    .decode_verlust()
                    .unwrap_or_else(|_| Frame::stille()),
            };

            if let Some(wechsel) = kontext.aktivitaet.verarbeiten(&frame) {
                let spricht = wechsel == AktivitaetsWechsel::Begonnen;
                if let Some(mut status) = self.sprecher_status.get_mut(&ssrc) {
                    status.spricht = spricht;
                }
                let _ = self.events_tx.send(SessionEvent::SprecherAktivitaet {
                    kanal_id: self.kanal_id,
                    ssrc,
                    spricht,
                    zeitpunkt: Utc::now(),
                });
            }

            let _ = self.gehoert_tx.send(GehoerterFrame { ssrc, frame });
        }
    }

    fn inaktive_bereinigen(&self, kontexte: &mut HashMap<u32, SprecherKontext>, idle: Duration) {
        kontexte.retain(|&ssrc, kontext| {
            if kontext.letzte_aktivitaet.elapsed() > idle {
                self.sprecher_status.remove(&ssrc);
                tracing::debug!(ssrc, "Inaktiver Sprecher-Kontext entfernt");
                false
            } else {
                true
            }
        });
    }

    // -----------------------------------------------------------------------
    // Sende-Loop
    // -----------------------------------------------------------------------

    async fn sende_loop(self: Arc<Self>, rx: mpsc::Receiver<Vec<u8>>, feeder: JoinHandle<()>) {
        let frame_dauer = Duration::from_millis(self.config.audio.frame_ms as u64);
        let mut takt = SendeTakt::neu(rx, frame_dauer);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut schliessend = false;

        loop {
            tokio::select! {
                frame = takt.naechster() => {
                    let Some(takt_frame) = frame else { break };
                    let opus = match &takt_frame {
                        TaktFrame::Audio(daten) => daten.as_slice(),
                        TaktFrame::Stille => &OPUS_STILLE_FRAME[..],
                    };
                    if let Err(e) = self.versiegeln_und_senden(opus).await {
                        tracing::warn!(fehler = %e, "Senden abgebrochen");
                        break;
                    }
                }
                _ = shutdown_rx.changed(), if !schliessend => {
                    // CLOSING: Queue auslaufen lassen, begrenzt durch
                    // Queue-Tiefe + Nachlauf
                    schliessend = true;
                    takt.schliessen();
                }
            }
        }

        feeder.abort();
        tracing::debug!(
            session_id = %self.session_id,
            stille_substituiert = takt.stille_eingefuegt(),
            "Sende-Loop beendet"
        );
        self.gateway.speaking_geaendert(self.kanal_id, false).await;
        self.zustand_wechsel_wenn(SessionZustand::Speaking, SessionZustand::Ready);
    }

    async fn versiegeln_und_senden(&self, opus: &[u8]) -> Result<()> {
        let bytes = {
            let mut sealer = self.sealer.lock().await;
            match sealer.versiegeln(opus) {
                Ok(bytes) => bytes,
                Err(SprachrohrError::SchluesselRotationNoetig) => {
                    tracing::info!(
                        kanal = %self.kanal_id,
                        "Nonce-Budget erschoepft, Schluessel wird rotiert"
                    );
                    let material = self.gateway.schluessel_rotieren(self.kanal_id).await?;
                    sealer.rotieren(material);
                    sealer.versiegeln(opus)?
                }
                Err(e) => return Err(e),
            }
        };
        self.socket.send(&bytes).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
