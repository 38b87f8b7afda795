//! sprachrohr-crypto – Paket-Verschluesselung der Voice-Sessions
//!
//! Implementiert die kryptografische Haelfte des Secure Packetizers:
//! - [`session_key`] – exklusiv gehaltenes 32-Byte Schluesselmaterial,
//!   geloescht bei Teardown und Rotation
//! - [`secretbox`] – authentifizierte Verschluesselung der Opus-Nutzdaten
//!   (XSalsa20-Poly1305) mit deterministischem Nonce aus dem Paket-Header
//! - [`nonce`] – Budget-Verwaltung: erzwungene Schluessel-Rotation bevor
//!   sich ein (Schluessel, Nonce)-Paar wiederholen koennte

pub mod error;
pub mod nonce;
pub mod secretbox;
pub mod session_key;

pub use error::{CryptoError, CryptoResult};
pub use nonce::NonceBudget;
pub use secretbox::{nonce_aus_header, oeffnen, versiegeln};
pub use session_key::{SchluesselLager, SessionKey};
