//! Authentifizierte Paket-Verschluesselung (Secretbox)
//!
//! Versiegelt und oeffnet Opus-Nutzdaten mit XSalsa20-Poly1305 unter dem
//! Sessionschluessel.
//!
//! ## Nonce-Schema
//! ```text
//! [RTP-Header (12 Bytes)] [0x00; 12]
//! ```
//! Das Nonce ist damit vollstaendig durch Sequenznummer und Zeitstempel
//! bestimmt – nie zufaellig. Eindeutigkeit unter einem Schluessel wird
//! durch das [`crate::nonce::NonceBudget`] garantiert.

use crypto_secretbox::{
    aead::{Aead, KeyInit},
    Key, Nonce, XSalsa20Poly1305,
};
use sprachrohr_protocol::RtpHeader;

use crate::error::{CryptoError, CryptoResult};
use crate::session_key::SessionKey;

/// Nonce-Laenge von XSalsa20-Poly1305
pub const NONCE_LAENGE: usize = 24;

/// Poly1305 Auth-Tag-Laenge
pub const TAG_LAENGE: usize = 16;

/// Leitet das 24-Byte-Nonce deterministisch aus dem Paket-Header ab
pub fn nonce_aus_header(header: &RtpHeader) -> [u8; NONCE_LAENGE] {
    let mut nonce = [0u8; NONCE_LAENGE];
    nonce[..RtpHeader::SIZE].copy_from_slice(&header.encode());
    nonce
}

/// Verschluesselt einen Opus-Frame unter dem Sessionschluessel
///
/// Gibt den Ciphertext inklusive Auth-Tag zurueck. Der Header wird ueber
/// das Nonce implizit mit-authentifiziert: jede Manipulation an Sequenz,
/// Zeitstempel oder SSRC laesst `oeffnen` fehlschlagen.
pub fn versiegeln(
    schluessel: &SessionKey,
    header: &RtpHeader,
    klartext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = XSalsa20Poly1305::new(Key::from_slice(schluessel.as_bytes()));
    let nonce_bytes = nonce_aus_header(header);
    let nonce = Nonce::from_slice(&nonce_bytes);

    cipher
        .encrypt(nonce, klartext)
        .map_err(|_| CryptoError::Verschluesselung("Secretbox encrypt fehlgeschlagen".into()))
}

/// Oeffnet die Nutzdaten eines empfangenen Pakets
///
/// # Fehler
/// `Authentifizierung` wenn der Auth-Tag nicht verifiziert (manipuliertes
/// Paket, falscher Schluessel oder falsches Nonce). Das Paket ist zu
/// verwerfen; die Session laeuft weiter.
pub fn oeffnen(
    schluessel: &SessionKey,
    header: &RtpHeader,
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = XSalsa20Poly1305::new(Key::from_slice(schluessel.as_bytes()));
    let nonce_bytes = nonce_aus_header(header);
    let nonce = Nonce::from_slice(&nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Authentifizierung)
}
