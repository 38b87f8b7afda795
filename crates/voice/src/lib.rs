//! sprachrohr-voice – Voice-Session-Kern
//!
//! Implementiert die Echtzeit-Pipeline einer Voice-Verbindung:
//!
//! ## Module
//! - [`packetizer`] – Secure Packetizer: Zaehler, Versiegeln/Oeffnen,
//!   Akzeptanzfenster, erzwungene Schluessel-Rotation
//! - [`jitter`] – Reorder-Jitter-Buffer pro Sprecher (Sequenz-Entrollung,
//!   Luecken-Fuellung mit Stille)
//! - [`pacing`] – Sende-Takt mit fester Frame-Dauer und
//!   Stille-Substitution bei Produzenten-Stau
//! - [`handshake`] – UDP-Endpunkt-Ermittlung (Hole-Punch)
//! - [`session`] – Zustandsautomat und Sende-/Empfangs-Loops einer Session
//! - [`registry`] – prozessweite Session-Tabelle (eine Session pro Kanal)

pub mod handshake;
pub mod jitter;
pub mod pacing;
pub mod packetizer;
pub mod registry;
pub mod session;

pub use packetizer::{PacketOpener, PacketSealer};
pub use registry::SessionRegistry;
pub use session::{GehoerterFrame, SessionCredentials, VoiceSession};
