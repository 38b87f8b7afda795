//! sprachrohr-audio – Audio-Pipeline des Voice-Kerns
//!
//! - [`frame`] – PCM-Frame-Modell und Plattform-Konstanten
//! - [`codec`] – Opus Encoder/Decoder-Adapter (ein Exemplar pro Richtung
//!   und Sprecher, inkl. PLC-Decode fuer Luecken)
//! - [`transcode`] – ffmpeg-Bruecke: beliebige Quellen -> 48 kHz s16le
//!   Frame-Strom und zurueck
//! - [`activity`] – Sprachaktivitaets-Erkennung pro Sprecher (RMS gegen
//!   adaptiven Rauschboden)

pub mod activity;
pub mod codec;
pub mod error;
pub mod frame;
pub mod transcode;

// Bequeme Re-Exporte der wichtigsten Typen
pub use activity::{AktivitaetsWechsel, SprachAktivitaet};
pub use codec::{OpusDecoder, OpusEncoder};
pub use error::{AudioError, AudioResult};
pub use frame::{Frame, OPUS_STILLE_FRAME};
pub use transcode::{AudioQuelle, FrameStrom, TranscodeBruecke};
