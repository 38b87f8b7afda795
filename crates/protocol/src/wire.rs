//! Voice-Paketformat (UDP)
//!
//! Definiert die binaere Paketstruktur fuer die Audio-Uebertragung.
//! Header-Layout nach RTP-Konvention der Ziel-Plattform:
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Version/Flags (konstant 0x80, RTP v2)
//!  1       1   Payload-Typ (konstant 0x78, Opus)
//!  2       2   Sequenznummer (big-endian, u16, wrappt)
//!  4       4   Zeitstempel (big-endian, 48 kHz-Ticks, +960 pro Frame)
//!  8       4   SSRC – Synchronisation Source (big-endian)
//! 12+      N   Verschluesselte Nutzdaten (Secretbox-Ciphertext)
//! ```
//!
//! Der Header dient gleichzeitig als erster Teil des Nonce-Materials
//! (siehe sprachrohr-crypto); er wird deshalb NIE veraendert nachdem
//! ein Paket versiegelt wurde.

use std::io;

/// Erstes Header-Byte: RTP Version 2, keine Extensions
pub const RTP_VERSION: u8 = 0x80;

/// Zweites Header-Byte: Payload-Typ Opus
pub const RTP_PAYLOAD_TYP: u8 = 0x78;

/// Maximale Laenge der verschluesselten Nutzdaten (MTU-Grenze abzueglich
/// Header; deckt alle Opus-Frames samt 16-Byte Auth-Tag ab)
pub const MAX_NUTZDATEN_LAENGE: usize = 1280;

// ---------------------------------------------------------------------------
// RtpHeader
// ---------------------------------------------------------------------------

/// 12-Byte Header eines Voice-UDP-Pakets
///
/// Direkte Byte-Serialisierung, kein serde (Performance-kritisch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Monoton steigende Sequenznummer (wrappt bei u16::MAX)
    pub sequence: u16,
    /// Zeitstempel in Abtastraten-Ticks (wrappt bei u32::MAX)
    pub timestamp: u32,
    /// Synchronisation Source – eindeutige Senderkennung
    pub ssrc: u32,
}

impl RtpHeader {
    /// Header-Groesse in Bytes
    pub const SIZE: usize = 12;

    /// Erstellt einen neuen Header
    pub fn new(sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Serialisiert den Header in ein 12-Byte-Array (big-endian)
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = RTP_VERSION;
        buf[1] = RTP_PAYLOAD_TYP;
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        buf
    }

    /// Deserialisiert einen Header aus einem Byte-Slice
    ///
    /// # Fehler
    /// - `InvalidData` wenn das Slice kuerzer als 12 Bytes ist
    /// - `InvalidData` bei falscher Version oder falschem Payload-Typ
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Header zu kurz: {} Bytes (erwartet {})",
                    buf.len(),
                    Self::SIZE
                ),
            ));
        }

        if buf[0] != RTP_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Ungueltiges Versions-Byte: {:#04x}", buf[0]),
            ));
        }
        if buf[1] != RTP_PAYLOAD_TYP {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unbekannter Payload-Typ: {:#04x}", buf[1]),
            ));
        }

        let sequence = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        Ok(Self {
            sequence,
            timestamp,
            ssrc,
        })
    }
}

// ---------------------------------------------------------------------------
// VoicePacket
// ---------------------------------------------------------------------------

/// Vollstaendiges Voice-UDP-Paket (Header + verschluesselte Nutzdaten)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePacket {
    /// 12-Byte Header (unverschluesselt, authentifiziert ueber das Nonce)
    pub header: RtpHeader,
    /// Secretbox-Ciphertext (Opus-Frame + 16-Byte Auth-Tag)
    pub payload: Vec<u8>,
}

impl VoicePacket {
    /// Erstellt ein Paket aus Header und bereits versiegelten Nutzdaten
    pub fn neu(header: RtpHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    /// Serialisiert das gesamte Paket in einen Byte-Vec
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RtpHeader::SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Deserialisiert ein Paket aus einem Byte-Slice und validiert es
    ///
    /// # Fehler
    /// - Header-Validierungsfehler (Version, Payload-Typ, Laenge)
    /// - Nutzdaten ueberschreiten `MAX_NUTZDATEN_LAENGE`
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        let header = RtpHeader::decode(buf)?;
        let payload_bytes = &buf[RtpHeader::SIZE..];

        if payload_bytes.len() > MAX_NUTZDATEN_LAENGE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Nutzdaten zu lang: {} Bytes (Maximum {})",
                    payload_bytes.len(),
                    MAX_NUTZDATEN_LAENGE
                ),
            ));
        }

        Ok(Self {
            header,
            payload: payload_bytes.to_vec(),
        })
    }

    /// Gesamtgroesse des Paketes in Bytes
    pub fn groesse(&self) -> usize {
        RtpHeader::SIZE + self.payload.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_encode_decode_round_trip() {
        let header = RtpHeader::new(42, 40320, 0xDEAD_BEEF);
        let encoded = header.encode();
        assert_eq!(encoded.len(), RtpHeader::SIZE);
        let decoded = RtpHeader::decode(&encoded).expect("Decode muss erfolgreich sein");
        assert_eq!(header, decoded);
    }

    #[test]
    fn header_konstante_praefix_bytes() {
        let bytes = RtpHeader::new(0, 0, 0).encode();
        assert_eq!(bytes[0], 0x80);
        assert_eq!(bytes[1], 0x78);
    }

    #[test]
    fn header_big_endian_byte_reihenfolge() {
        let header = RtpHeader::new(0x0102, 0x05060708, 0x090A0B0C);
        let bytes = header.encode();
        // Sequence bei Offset 2-3
        assert_eq!(bytes[2], 0x01);
        assert_eq!(bytes[3], 0x02);
        // Timestamp bei Offset 4-7
        assert_eq!(bytes[4], 0x05);
        assert_eq!(bytes[7], 0x08);
        // SSRC bei Offset 8-11
        assert_eq!(bytes[8], 0x09);
        assert_eq!(bytes[11], 0x0C);
    }

    #[test]
    fn header_decode_falsches_versions_byte() {
        let mut bytes = RtpHeader::new(1, 960, 7).encode();
        bytes[0] = 0x90;
        assert!(RtpHeader::decode(&bytes).is_err());
    }

    #[test]
    fn header_decode_falscher_payload_typ() {
        let mut bytes = RtpHeader::new(1, 960, 7).encode();
        bytes[1] = 0x77;
        assert!(RtpHeader::decode(&bytes).is_err());
    }

    #[test]
    fn header_decode_zu_kurz() {
        let bytes = [0u8; 8];
        assert!(RtpHeader::decode(&bytes).is_err());
    }

    #[test]
    fn voice_packet_encode_decode_round_trip() {
        let payload = vec![0xAB; 120];
        let paket = VoicePacket::neu(RtpHeader::new(100, 96000, 0xCAFE), payload.clone());
        let encoded = paket.encode();
        assert_eq!(encoded.len(), RtpHeader::SIZE + 120);

        let decoded = VoicePacket::decode(&encoded).expect("Decode muss erfolgreich sein");
        assert_eq!(decoded.header, paket.header);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn voice_packet_zu_grosse_nutzdaten() {
        let header = RtpHeader::new(0, 0, 0);
        let mut buf = header.encode().to_vec();
        buf.extend(vec![0u8; MAX_NUTZDATEN_LAENGE + 1]);
        assert!(VoicePacket::decode(&buf).is_err());
    }

    #[test]
    fn voice_packet_leere_nutzdaten_ok() {
        let paket = VoicePacket::neu(RtpHeader::new(0, 0, 0), vec![]);
        let encoded = paket.encode();
        assert_eq!(encoded.len(), RtpHeader::SIZE);
        let decoded = VoicePacket::decode(&encoded).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn sequence_wrap_around_bleibt_erhalten() {
        let header = RtpHeader::new(u16::MAX, u32::MAX - 959, 1);
        let decoded = RtpHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded.sequence, u16::MAX);
        assert_eq!(decoded.timestamp, u32::MAX - 959);
    }
}
