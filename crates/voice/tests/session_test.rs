//! Integrations-Tests des Session-Lebenszyklus
//!
//! Simuliert den Voice-Endpunkt mit einem lokalen UDP-Socket, der
//! Discovery-Anfragen beantwortet, und einem Gateway-Stub, der festes
//! Schluesselmaterial liefert.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use sprachrohr_core::config::SprachrohrConfig;
use sprachrohr_core::event::GatewayRueckkanal;
use sprachrohr_core::{ChannelId, SessionZustand, SprachrohrError};
use sprachrohr_crypto::{secretbox, session_key::SessionKey};
use sprachrohr_protocol::discovery::{discovery_antwort, DISCOVERY_TYP_ANFRAGE};
use sprachrohr_protocol::{RtpHeader, VoicePacket};
use sprachrohr_voice::session::SessionCredentials;
use sprachrohr_voice::SessionRegistry;

const TEST_SCHLUESSEL: [u8; 32] = [0x42; 32];

fn localhost(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

// ---------------------------------------------------------------------------
// Gateway-Stub
// ---------------------------------------------------------------------------

struct GatewayStub {
    schluessel: [u8; 32],
}

#[async_trait::async_trait]
impl GatewayRueckkanal for GatewayStub {
    async fn schluessel_austausch(
        &self,
        _kanal_id: ChannelId,
        _externe_adresse: SocketAddr,
    ) -> sprachrohr_core::Result<[u8; 32]> {
        Ok(self.schluessel)
    }

    async fn schluessel_rotieren(
        &self,
        _kanal_id: ChannelId,
    ) -> sprachrohr_core::Result<[u8; 32]> {
        Ok(self.schluessel)
    }

    async fn speaking_geaendert(&self, _kanal_id: ChannelId, _spricht: bool) {}
}

fn gateway_stub() -> Arc<dyn GatewayRueckkanal> {
    Arc::new(GatewayStub {
        schluessel: TEST_SCHLUESSEL,
    })
}

// ---------------------------------------------------------------------------
// Simulierter Voice-Endpunkt
// ---------------------------------------------------------------------------

/// Bindet einen lokalen "Voice-Server" der Discovery beantwortet.
/// Liefert die Server-Adresse, den Socket (zum Senden von Voice-Paketen)
/// und einen Kanal der pro Discovery die Client-Adresse meldet.
async fn voice_endpunkt_simulieren() -> (SocketAddr, Arc<UdpSocket>, mpsc::Receiver<SocketAddr>) {
    let socket = Arc::new(UdpSocket::bind(localhost(0)).await.unwrap());
    let adresse = socket.local_addr().unwrap();
    let (client_tx, client_rx) = mpsc::channel(8);

    let empfaenger = Arc::clone(&socket);
    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        loop {
            let Ok((laenge, absender)) = empfaenger.recv_from(&mut buf).await else {
                break;
            };
            if laenge == 74 && u16::from_be_bytes([buf[0], buf[1]]) == DISCOVERY_TYP_ANFRAGE {
                let ssrc = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
                // Die "externe" Adresse ist im Test einfach die lokale
                let antwort = discovery_antwort(ssrc, absender);
                let _ = empfaenger.send_to(&antwort, absender).await;
                let _ = client_tx.send(absender).await;
            }
        }
    });

    (adresse, socket, client_rx)
}

fn test_config() -> SprachrohrConfig {
    let mut config = SprachrohrConfig::default();
    config.session.handshake_timeout_ms = 3_000;
    config
}

fn credentials(ssrc: u32, endpunkt: SocketAddr) -> SessionCredentials {
    SessionCredentials { ssrc, endpunkt }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn beitreten_doppelt_verlassen_erneut() {
    let (endpunkt, _socket, _clients) = voice_endpunkt_simulieren().await;
    let registry = SessionRegistry::neu();
    let kanal = ChannelId(1001);

    // Erster Beitritt gelingt
    let session = registry
        .beitreten(kanal, credentials(0x1111, endpunkt), test_config(), gateway_stub())
        .await
        .expect("Erster Beitritt muss gelingen");
    assert_eq!(session.zustand(), SessionZustand::Ready);
    assert_eq!(registry.anzahl(), 1);

    // Zweiter Beitritt zum selben Kanal scheitert
    let fehler = registry
        .beitreten(kanal, credentials(0x2222, endpunkt), test_config(), gateway_stub())
        .await
        .unwrap_err();
    assert!(matches!(fehler, SprachrohrError::SessionBereitsAktiv(k) if k == kanal));

    // Nach dem Verlassen ist der Kanal wieder frei
    registry.verlassen(kanal).await.expect("Verlassen muss gelingen");
    assert_eq!(session.zustand(), SessionZustand::Closed);
    assert_eq!(registry.anzahl(), 0);

    let session2 = registry
        .beitreten(kanal, credentials(0x3333, endpunkt), test_config(), gateway_stub())
        .await
        .expect("Erneuter Beitritt muss gelingen");
    assert_eq!(session2.zustand(), SessionZustand::Ready);
    registry.verlassen(kanal).await.unwrap();
}

#[tokio::test]
async fn eingehende_pakete_werden_dekodiert_und_weitergereicht() {
    let (endpunkt, server_socket, mut clients) = voice_endpunkt_simulieren().await;
    let registry = SessionRegistry::neu();
    let kanal = ChannelId(2002);

    let session = registry
        .beitreten(kanal, credentials(0x1111, endpunkt), test_config(), gateway_stub())
        .await
        .unwrap();
    let mut gehoert = session.lauschen();

    let client_adresse = clients.recv().await.expect("Discovery muss gesehen worden sein");

    // Entfernter Sprecher (SSRC 0x9999) sendet einen versiegelten
    // Stille-Opus-Frame
    let schluessel = SessionKey::neu(TEST_SCHLUESSEL);
    let header = RtpHeader::new(1, 960, 0x9999);
    let ciphertext = secretbox::versiegeln(&schluessel, &header, &[0xF8, 0xFF, 0xFE]).unwrap();
    let paket = VoicePacket::neu(header, ciphertext).encode();
    server_socket.send_to(&paket, client_adresse).await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), gehoert.recv())
        .await
        .expect("Frame muss innerhalb des Zeitlimits ankommen")
        .expect("Broadcast darf nicht geschlossen sein");

    assert_eq!(frame.ssrc, 0x9999);
    assert_eq!(frame.frame.laenge(), 1920);
    assert!(session.sprecher().contains(&0x9999));

    registry.verlassen(kanal).await.unwrap();
}

#[tokio::test]
async fn manipuliertes_paket_stoert_folgende_nicht() {
    let (endpunkt, server_socket, mut clients) = voice_endpunkt_simulieren().await;
    let registry = SessionRegistry::neu();
    let kanal = ChannelId(3003);

    let session = registry
        .beitreten(kanal, credentials(0x1111, endpunkt), test_config(), gateway_stub())
        .await
        .unwrap();
    let mut gehoert = session.lauschen();
    let client_adresse = clients.recv().await.unwrap();

    let schluessel = SessionKey::neu(TEST_SCHLUESSEL);

    // Manipuliertes Paket: ein Nutzdaten-Byte gekippt
    let header1 = RtpHeader::new(1, 960, 0x7777);
    let mut ciphertext = secretbox::versiegeln(&schluessel, &header1, &[0xF8, 0xFF, 0xFE]).unwrap();
    ciphertext[0] ^= 0xFF;
    let kaputt = VoicePacket::neu(header1, ciphertext).encode();
    server_socket.send_to(&kaputt, client_adresse).await.unwrap();

    // Intaktes Folgepaket desselben Sprechers
    let header2 = RtpHeader::new(2, 1920, 0x7777);
    let ciphertext2 = secretbox::versiegeln(&schluessel, &header2, &[0xF8, 0xFF, 0xFE]).unwrap();
    let intakt = VoicePacket::neu(header2, ciphertext2).encode();
    server_socket.send_to(&intakt, client_adresse).await.unwrap();

    // Nur der intakte Frame kommt an
    let frame = tokio::time::timeout(Duration::from_secs(2), gehoert.recv())
        .await
        .expect("Intakter Frame muss ankommen")
        .unwrap();
    assert_eq!(frame.ssrc, 0x7777);

    registry.verlassen(kanal).await.unwrap();
}

#[tokio::test]
async fn transcode_fehler_ist_nur_fuer_die_anfrage_fatal() {
    let (endpunkt, _socket, _clients) = voice_endpunkt_simulieren().await;
    let registry = SessionRegistry::neu();
    let kanal = ChannelId(4004);

    let mut config = test_config();
    config.audio.ffmpeg_programm = "/nonexistent/ffmpeg-binary".into();

    let session = registry
        .beitreten(kanal, credentials(0x1111, endpunkt), config, gateway_stub())
        .await
        .unwrap();

    let fehler = session
        .abspielen(sprachrohr_audio::AudioQuelle::Datei("/tmp/egal.mp3".into()))
        .await
        .unwrap_err();
    assert!(matches!(fehler, SprachrohrError::Transcode(_)));

    // Die Session selbst bleibt unbeeintraechtigt
    assert_eq!(session.zustand(), SessionZustand::Ready);

    registry.verlassen(kanal).await.unwrap();
}

#[tokio::test]
async fn handshake_zeitlimit_ohne_gegenstelle() {
    // Gegenstelle existiert, beantwortet aber keine Discovery
    let stumm = UdpSocket::bind(localhost(0)).await.unwrap();
    let endpunkt = stumm.local_addr().unwrap();

    let registry = SessionRegistry::neu();
    let kanal = ChannelId(5005);

    let mut config = test_config();
    config.session.handshake_timeout_ms = 300;

    let fehler = registry
        .beitreten(kanal, credentials(0x1111, endpunkt), config, gateway_stub())
        .await
        .unwrap_err();
    assert!(matches!(fehler, SprachrohrError::Zeitlimit(_)));

    // Der Slot ist wieder frei
    assert_eq!(registry.anzahl(), 0);
}
