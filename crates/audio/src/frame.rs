//! PCM-Frame-Modell und Plattform-Konstanten
//!
//! Das Voice-Protokoll der Ziel-Plattform legt das Audioformat fest:
//! 48 kHz, 2 Kanaele interleaved, 20 ms pro Frame. Alle Pipeline-Stufen
//! arbeiten mit genau dieser Frame-Groesse; die Konstanten hier sind die
//! einzige Stelle an der sie definiert ist.

/// Abtastrate des Voice-Transports in Hz
pub const SAMPLE_RATE: u32 = 48_000;

/// Anzahl der Kanaele (interleaved)
pub const KANAELE: usize = 2;

/// Frame-Dauer in Millisekunden
pub const FRAME_MS: u32 = 20;

/// Samples pro Frame und Kanal (20 ms bei 48 kHz)
pub const SAMPLES_PRO_KANAL: usize = 960;

/// Interleaved Samples pro Frame (alle Kanaele)
pub const SAMPLES_INTERLEAVED: usize = SAMPLES_PRO_KANAL * KANAELE;

/// PCM-Bytes pro Frame (s16le)
pub const PCM_BYTES_PRO_FRAME: usize = SAMPLES_INTERLEAVED * 2;

/// Zeitstempel-Fortschritt pro Frame (48 kHz-Ticks)
pub const TICKS_PRO_FRAME: u32 = SAMPLES_PRO_KANAL as u32;

/// Kleinster gueltiger Opus-Frame der Stille kodiert.
/// Wird fuer Luecken-Fuellung und den Sende-Nachlauf verwendet, ohne
/// einen Encoder zu benoetigen.
pub const OPUS_STILLE_FRAME: [u8; 3] = [0xF8, 0xFF, 0xFE];

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Ein PCM-Audio-Frame fester Laenge (interleaved s16)
///
/// Ephemer – wird pro Pipeline-Stufe erzeugt und konsumiert, nie
/// persistiert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Interleaved PCM-Samples (`SAMPLES_INTERLEAVED` Stueck)
    pub pcm: Vec<i16>,
    /// True wenn der Frame synthetische Stille ist (Luecke, Nachlauf)
    pub ist_stille: bool,
}

impl Frame {
    /// Erstellt einen Frame aus PCM-Samples
    pub fn neu(pcm: Vec<i16>) -> Self {
        Self {
            pcm,
            ist_stille: false,
        }
    }

    /// Erstellt einen Stille-Frame in Standard-Laenge
    pub fn stille() -> Self {
        Self {
            pcm: vec![0i16; SAMPLES_INTERLEAVED],
            ist_stille: true,
        }
    }

    /// Dekodiert einen Frame aus rohen s16le-Bytes
    pub fn aus_pcm_bytes(daten: &[u8]) -> Self {
        let pcm = daten
            .chunks_exact(2)
            .map(|paar| i16::from_le_bytes([paar[0], paar[1]]))
            .collect();
        Self {
            pcm,
            ist_stille: false,
        }
    }

    /// Serialisiert den Frame als s16le-Bytes
    pub fn als_pcm_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pcm.len() * 2);
        for sample in &self.pcm {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    /// Anzahl der interleaved Samples
    pub fn laenge(&self) -> usize {
        self.pcm.len()
    }
}
