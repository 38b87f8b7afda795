//! sprachrohr-protocol – Wire-Format des Voice-Transports
//!
//! Definiert die binaere Paketstruktur fuer die verschluesselte
//! Audio-Uebertragung via UDP sowie den Endpunkt-Discovery-Austausch.
//! Das Layout ist durch die Voice-Protokollversion der Ziel-Plattform
//! festgelegt und muss bit-exakt eingehalten werden – jede Abweichung
//! wird vom entfernten Endpunkt verworfen.

pub mod discovery;
pub mod wire;

pub use discovery::{discovery_anfrage, discovery_antwort_parsen};
pub use wire::{RtpHeader, VoicePacket, MAX_NUTZDATEN_LAENGE};
