//! Secure Packetizer – Versiegeln und Oeffnen von Voice-Paketen
//!
//! Der Packetizer ist in zwei Haelften geteilt, die sich nur das
//! Schluessel-Lager teilen:
//! - [`PacketSealer`] gehoert exklusiv dem Sende-Pfad und fuehrt die
//!   lokalen Sequenz-/Zeitstempel-Zaehler,
//! - [`PacketOpener`] gehoert dem Empfangs-Pfad und prueft das
//!   Akzeptanzfenster pro Sprecher.
//!
//! Die Zaehler steigen nur (modulo Wrap) und werden innerhalb einer
//! Session NIE zurueckgesetzt – auch nicht bei Schluessel-Rotation.
//! Das Nonce-Budget erzwingt die Rotation bevor sich ein
//! (Schluessel, Nonce)-Paar wiederholen koennte.

use sprachrohr_core::{Result, SprachrohrError};
use sprachrohr_crypto::{
    nonce::NonceBudget, secretbox, session_key::SessionKey, CryptoError, SchluesselLager,
};
use sprachrohr_protocol::{RtpHeader, VoicePacket, MAX_NUTZDATEN_LAENGE};

use sprachrohr_audio::frame::TICKS_PRO_FRAME;

/// Akzeptanzfenster fuer eingehende Sequenznummern (in Paketen, beide
/// Richtungen). Pakete weit ausserhalb gelten als Replay oder Korruption.
pub const AKZEPTANZ_FENSTER: u16 = 512;

fn krypto_fehler(e: CryptoError) -> SprachrohrError {
    match e {
        CryptoError::Authentifizierung => SprachrohrError::Authentifizierung,
        CryptoError::NonceBudgetErschoepft { .. } => SprachrohrError::SchluesselRotationNoetig,
        andere => SprachrohrError::Intern(andere.to_string()),
    }
}

/// Erstellt das Sender/Empfaenger-Paar einer Session
///
/// Beide Haelften teilen sich das Schluessel-Lager; `lager.leeren()` beim
/// Teardown macht beide unbrauchbar.
pub fn paar(
    ssrc: u32,
    schluessel: SessionKey,
    nonce_budget: u64,
) -> (PacketSealer, PacketOpener, SchluesselLager) {
    let lager = SchluesselLager::neu(schluessel);
    let sealer = PacketSealer::neu(ssrc, lager.clone(), nonce_budget);
    let opener = PacketOpener::neu(lager.clone());
    (sealer, opener, lager)
}

// ---------------------------------------------------------------------------
// PacketSealer
// ---------------------------------------------------------------------------

/// Sende-Haelfte: versiegelt Opus-Frames zu Wire-Paketen
///
/// Nicht thread-safe – gehoert exklusiv dem Sende-Loop.
pub struct PacketSealer {
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
    lager: SchluesselLager,
    budget: NonceBudget,
}

impl PacketSealer {
    /// Erstellt einen Sealer mit Zaehlern bei 0
    pub fn neu(ssrc: u32, lager: SchluesselLager, nonce_budget: u64) -> Self {
        Self {
            ssrc,
            sequence: 0,
            timestamp: 0,
            lager,
            budget: NonceBudget::neu(nonce_budget),
        }
    }

    /// Versiegelt einen Opus-Frame zu einem sendefertigen Wire-Paket
    ///
    /// Erhoeht Sequenz (+1) und Zeitstempel (+960) nur bei Erfolg.
    ///
    /// # Fehler
    /// - `SchluesselRotationNoetig` wenn das Nonce-Budget erschoepft ist;
    ///   der Aufrufer rotiert via [`Self::rotieren`] und versiegelt erneut
    /// - `Intern` wenn der Schluessel bereits geloescht wurde
    pub fn versiegeln(&mut self, opus_daten: &[u8]) -> Result<Vec<u8>> {
        self.budget.verbrauchen().map_err(krypto_fehler)?;

        let header = RtpHeader::new(
            self.sequence.wrapping_add(1),
            self.timestamp.wrapping_add(TICKS_PRO_FRAME),
            self.ssrc,
        );

        let ciphertext = self
            .lager
            .mit_schluessel(|schluessel| secretbox::versiegeln(schluessel, &header, opus_daten))
            .map_err(krypto_fehler)?;

        if ciphertext.len() > MAX_NUTZDATEN_LAENGE {
            return Err(SprachrohrError::Codec(format!(
                "Versiegelter Frame ueberschreitet MTU: {} Bytes",
                ciphertext.len()
            )));
        }

        // Zaehler erst nach erfolgreicher Versiegelung uebernehmen
        self.sequence = header.sequence;
        self.timestamp = header.timestamp;

        Ok(VoicePacket::neu(header, ciphertext).encode())
    }

    /// Rotiert den Sessionschluessel nach erschoepftem Nonce-Budget
    ///
    /// Die Zaehler laufen unveraendert weiter; nur Budget und Schluessel
    /// beginnen eine neue Epoche.
    pub fn rotieren(&mut self, neues_material: [u8; 32]) {
        self.lager.rotieren(SessionKey::neu(neues_material));
        self.budget.nach_rotation_zuruecksetzen();
    }

    /// Aktuelle Zaehlerstaende (Sequenz, Zeitstempel)
    pub fn zaehler(&self) -> (u16, u32) {
        (self.sequence, self.timestamp)
    }

    /// Verbleibende Pakete bis zur erzwungenen Rotation
    pub fn budget_verbleibend(&self) -> u64 {
        self.budget.verbleibend()
    }
}

// ---------------------------------------------------------------------------
// PacketOpener
// ---------------------------------------------------------------------------

/// Empfangs-Haelfte: authentifiziert und entschluesselt Wire-Pakete
pub struct PacketOpener {
    lager: SchluesselLager,
}

impl PacketOpener {
    /// Erstellt einen Opener auf dem gemeinsamen Schluessel-Lager
    pub fn neu(lager: SchluesselLager) -> Self {
        Self { lager }
    }

    /// Oeffnet die Nutzdaten eines dekodierten Pakets
    ///
    /// `letzte_seq` ist die hoechste bisher akzeptierte Sequenznummer des
    /// Sprechers (None beim ersten Paket).
    ///
    /// # Fehler
    /// - `Sequenz` wenn die Sequenznummer weit ausserhalb des
    ///   Akzeptanzfensters liegt (Replay/Korruption – Paket verwerfen)
    /// - `Authentifizierung` wenn der Auth-Tag nicht verifiziert
    ///   (Paket verwerfen, Session laeuft weiter)
    pub fn oeffnen(
        &self,
        header: &RtpHeader,
        payload: &[u8],
        letzte_seq: Option<u16>,
    ) -> Result<Vec<u8>> {
        if let Some(letzte) = letzte_seq {
            let vorwaerts = header.sequence.wrapping_sub(letzte);
            let rueckwaerts = letzte.wrapping_sub(header.sequence);
            if vorwaerts > AKZEPTANZ_FENSTER && rueckwaerts > AKZEPTANZ_FENSTER {
                return Err(SprachrohrError::Sequenz {
                    erwartet: letzte.wrapping_add(1),
                    erhalten: header.sequence,
                });
            }
        }

        self.lager
            .mit_schluessel(|schluessel| secretbox::oeffnen(schluessel, header, payload))
            .map_err(krypto_fehler)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_paar(budget: u64) -> (PacketSealer, PacketOpener, SchluesselLager) {
        paar(0xCAFE, SessionKey::neu([0x42; 32]), budget)
    }

    #[test]
    fn versiegeln_oeffnen_round_trip() {
        let (mut sealer, opener, _lager) = test_paar(1024);
        let opus = vec![0xAB; 60];

        let wire = sealer.versiegeln(&opus).unwrap();
        let paket = VoicePacket::decode(&wire).unwrap();

        assert_eq!(paket.header.sequence, 1);
        assert_eq!(paket.header.timestamp, 960);
        assert_eq!(paket.header.ssrc, 0xCAFE);

        let klartext = opener
            .oeffnen(&paket.header, &paket.payload, None)
            .unwrap();
        assert_eq!(klartext, opus);
    }

    #[test]
    fn zaehler_steigen_monoton() {
        let (mut sealer, _opener, _lager) = test_paar(1024);
        for erwartete_seq in 1..=10u16 {
            let wire = sealer.versiegeln(&[0x01]).unwrap();
            let paket = VoicePacket::decode(&wire).unwrap();
            assert_eq!(paket.header.sequence, erwartete_seq);
            assert_eq!(paket.header.timestamp, erwartete_seq as u32 * 960);
        }
    }

    #[test]
    fn keine_nonce_wiederholung_bis_budget() {
        let (mut sealer, _opener, _lager) = test_paar(200);
        let mut nonces = HashSet::new();

        for _ in 0..200 {
            let wire = sealer.versiegeln(&[0x01]).unwrap();
            let paket = VoicePacket::decode(&wire).unwrap();
            let nonce = secretbox::nonce_aus_header(&paket.header);
            assert!(
                nonces.insert(nonce),
                "Nonce-Wiederholung bei Sequenz {}",
                paket.header.sequence
            );
        }
    }

    #[test]
    fn budget_erzwingt_rotation_und_zaehler_laufen_weiter() {
        let (mut sealer, _opener, _lager) = test_paar(5);

        for _ in 0..5 {
            sealer.versiegeln(&[0x01]).unwrap();
        }
        let (seq_vor, ts_vor) = sealer.zaehler();

        // Budget erschoepft – Versiegeln verweigert, Zaehler unveraendert
        let fehler = sealer.versiegeln(&[0x01]).unwrap_err();
        assert!(matches!(fehler, SprachrohrError::SchluesselRotationNoetig));
        assert_eq!(sealer.zaehler(), (seq_vor, ts_vor));

        // Rotation: Zaehler laufen weiter, kein Reset
        sealer.rotieren([0x77; 32]);
        let wire = sealer.versiegeln(&[0x01]).unwrap();
        let paket = VoicePacket::decode(&wire).unwrap();
        assert_eq!(paket.header.sequence, seq_vor.wrapping_add(1));
        assert_eq!(paket.header.timestamp, ts_vor.wrapping_add(960));
    }

    #[test]
    fn manipuliertes_paket_wird_abgelehnt_folgende_funktionieren() {
        let (mut sealer, opener, _lager) = test_paar(1024);

        let wire = sealer.versiegeln(&[0x10, 0x20, 0x30]).unwrap();
        let mut paket = VoicePacket::decode(&wire).unwrap();
        paket.payload[1] ^= 0xFF;

        let fehler = opener
            .oeffnen(&paket.header, &paket.payload, None)
            .unwrap_err();
        assert!(matches!(fehler, SprachrohrError::Authentifizierung));

        // Nachfolgende Pakete sind unbeeintraechtigt
        let wire2 = sealer.versiegeln(&[0x40, 0x50]).unwrap();
        let paket2 = VoicePacket::decode(&wire2).unwrap();
        let klartext = opener
            .oeffnen(&paket2.header, &paket2.payload, Some(1))
            .unwrap();
        assert_eq!(klartext, vec![0x40, 0x50]);
    }

    #[test]
    fn sequenz_weit_ausserhalb_fenster_wird_abgelehnt() {
        let (mut sealer, opener, _lager) = test_paar(1024);
        let wire = sealer.versiegeln(&[0x01]).unwrap();
        let paket = VoicePacket::decode(&wire).unwrap();

        // Sprecher war zuletzt bei Sequenz 20000 – Paket mit Sequenz 1
        // liegt weit ausserhalb des Fensters
        let fehler = opener
            .oeffnen(&paket.header, &paket.payload, Some(20_000))
            .unwrap_err();
        assert!(matches!(fehler, SprachrohrError::Sequenz { .. }));
    }

    #[test]
    fn sequenz_wrap_innerhalb_fenster_wird_akzeptiert() {
        let lager = SchluesselLager::neu(SessionKey::neu([0x42; 32]));
        let opener = PacketOpener::neu(lager.clone());

        // Paket direkt nach dem u16-Wrap (Sequenz 3, zuletzt 65534)
        let header = RtpHeader::new(3, 960, 0xCAFE);
        let ciphertext = lager
            .mit_schluessel(|k| secretbox::versiegeln(k, &header, &[0x01]))
            .unwrap();

        let klartext = opener.oeffnen(&header, &ciphertext, Some(65_534)).unwrap();
        assert_eq!(klartext, vec![0x01]);
    }

    #[test]
    fn geleertes_lager_blockiert_beide_haelften() {
        let (mut sealer, opener, lager) = test_paar(1024);
        let wire = sealer.versiegeln(&[0x01]).unwrap();
        let paket = VoicePacket::decode(&wire).unwrap();

        lager.leeren();

        assert!(sealer.versiegeln(&[0x02]).is_err());
        assert!(opener.oeffnen(&paket.header, &paket.payload, None).is_err());
    }
}
