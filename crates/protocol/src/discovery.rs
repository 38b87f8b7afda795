//! Endpunkt-Discovery (UDP Hole-Punch)
//!
//! Vor dem Schluessel-Austausch muss die Session ihre eigene oeffentliche
//! Adresse kennen. Dazu wird ein 74-Byte-Discovery-Paket an den
//! Voice-Endpunkt gesendet; die Antwort traegt die externe IP als
//! NUL-terminierten String und den Port als u16 little-endian am Ende.
//!
//! ```text
//! Offset  Len  Anfrage               Antwort
//! ------  ---  --------------------  --------------------
//!  0       2   Typ = 0x0001 (BE)     Typ = 0x0002 (BE)
//!  2       2   Laenge = 70 (BE)      Laenge = 70 (BE)
//!  4       4   SSRC (BE)             SSRC (BE)
//!  8      64   0-Padding             externe IP, NUL-gepolstert
//! 72       2   0-Padding             externer Port (LE)
//! ```

use std::io;
use std::net::{IpAddr, SocketAddr};

/// Gesamtgroesse eines Discovery-Pakets
pub const DISCOVERY_PAKET_GROESSE: usize = 74;

/// Typ-Feld der Anfrage
pub const DISCOVERY_TYP_ANFRAGE: u16 = 0x0001;

/// Typ-Feld der Antwort
pub const DISCOVERY_TYP_ANTWORT: u16 = 0x0002;

/// Baut das 74-Byte-Discovery-Anfragepaket fuer die gegebene SSRC
pub fn discovery_anfrage(ssrc: u32) -> [u8; DISCOVERY_PAKET_GROESSE] {
    let mut paket = [0u8; DISCOVERY_PAKET_GROESSE];
    paket[0..2].copy_from_slice(&DISCOVERY_TYP_ANFRAGE.to_be_bytes());
    paket[2..4].copy_from_slice(&70u16.to_be_bytes());
    paket[4..8].copy_from_slice(&ssrc.to_be_bytes());
    paket
}

/// Parst eine Discovery-Antwort und extrahiert die externe Adresse
///
/// # Fehler
/// - `InvalidData` bei zu kurzer Antwort, falschem Typ-Feld oder
///   nicht parsbarer IP-Adresse
pub fn discovery_antwort_parsen(buf: &[u8]) -> io::Result<SocketAddr> {
    if buf.len() < DISCOVERY_PAKET_GROESSE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Discovery-Antwort zu kurz: {} Bytes (erwartet {})",
                buf.len(),
                DISCOVERY_PAKET_GROESSE
            ),
        ));
    }

    let typ = u16::from_be_bytes([buf[0], buf[1]]);
    if typ != DISCOVERY_TYP_ANTWORT {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unerwarteter Discovery-Typ: {typ:#06x}"),
        ));
    }

    let ip_str = std::str::from_utf8(&buf[8..72])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        .trim_matches('\0');
    let ip: IpAddr = ip_str.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Nicht parsbare IP in Discovery-Antwort: '{ip_str}'"),
        )
    })?;

    let port = u16::from_le_bytes([buf[72], buf[73]]);

    Ok(SocketAddr::new(ip, port))
}

/// Baut eine Discovery-Antwort (nur fuer Tests und lokale Gegenstellen)
pub fn discovery_antwort(ssrc: u32, adresse: SocketAddr) -> [u8; DISCOVERY_PAKET_GROESSE] {
    let mut paket = [0u8; DISCOVERY_PAKET_GROESSE];
    paket[0..2].copy_from_slice(&DISCOVERY_TYP_ANTWORT.to_be_bytes());
    paket[2..4].copy_from_slice(&70u16.to_be_bytes());
    paket[4..8].copy_from_slice(&ssrc.to_be_bytes());

    let ip_text = adresse.ip().to_string();
    let ip_bytes = ip_text.as_bytes();
    paket[8..8 + ip_bytes.len().min(64)].copy_from_slice(&ip_bytes[..ip_bytes.len().min(64)]);
    paket[72..74].copy_from_slice(&adresse.port().to_le_bytes());
    paket
}
