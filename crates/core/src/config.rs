//! Sprachrohr-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Voice-Kern ohne
//! Konfigurationsdatei lauffaehig ist.

use serde::{Deserialize, Serialize};

/// Vollstaendige Konfiguration des Voice-Kerns
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SprachrohrConfig {
    /// Audio/Codec-Einstellungen
    pub audio: AudioEinstellungen,
    /// Jitter-Buffer- und Pacing-Einstellungen
    pub jitter: JitterEinstellungen,
    /// Session-Lebenszyklus-Einstellungen
    pub session: SessionEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Audio- und Codec-Einstellungen
///
/// Die Standardwerte sind durch das Voice-Protokoll der Ziel-Plattform
/// festgelegt (48 kHz, Stereo, 20 ms) und duerfen nur geaendert werden
/// wenn die Plattform eine andere Protokollversion vorschreibt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Anzahl der Kanaele (interleaved)
    pub kanaele: u8,
    /// Frame-Dauer in Millisekunden
    pub frame_ms: u32,
    /// Opus-Ziel-Bitrate in kbps
    pub bitrate_kbps: u16,
    /// Pfad zum externen Transcoder-Programm
    pub ffmpeg_programm: String,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            kanaele: 2,
            frame_ms: 20,
            bitrate_kbps: 64,
            ffmpeg_programm: "ffmpeg".into(),
        }
    }
}

impl AudioEinstellungen {
    /// Samples pro Frame und Kanal
    pub fn samples_pro_kanal(&self) -> usize {
        (self.sample_rate / 1000 * self.frame_ms) as usize
    }

    /// Interleaved Samples pro Frame (alle Kanaele)
    pub fn samples_interleaved(&self) -> usize {
        self.samples_pro_kanal() * self.kanaele as usize
    }

    /// PCM-Bytes pro Frame (s16le)
    pub fn pcm_bytes_pro_frame(&self) -> usize {
        self.samples_interleaved() * 2
    }

    /// Validiert die Einstellungen gegen die Opus-Grenzen
    pub fn validieren(&self) -> Result<(), String> {
        if !matches!(self.sample_rate, 8_000 | 12_000 | 16_000 | 24_000 | 48_000) {
            return Err(format!(
                "Abtastrate {} wird von Opus nicht unterstuetzt",
                self.sample_rate
            ));
        }
        if !matches!(self.kanaele, 1 | 2) {
            return Err(format!("Kanalanzahl {} ungueltig (1 oder 2)", self.kanaele));
        }
        if !matches!(self.frame_ms, 10 | 20 | 40 | 60) {
            return Err(format!("Frame-Dauer {} ms ungueltig", self.frame_ms));
        }
        if self.bitrate_kbps < 6 || self.bitrate_kbps > 510 {
            return Err(format!(
                "Bitrate muss zwischen 6 und 510 kbps liegen (war: {})",
                self.bitrate_kbps
            ));
        }
        Ok(())
    }
}

/// Jitter-Buffer- und Pacing-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterEinstellungen {
    /// Reorder-Fenster fuer eingehende Pakete (in Frame-Dauern)
    pub reorder_fenster: usize,
    /// Maximale Pufferung pro Sprecher bevor das aelteste Paket faellt
    pub max_pakete: usize,
    /// Tiefe der ausgehenden Sende-Queue (in Frames)
    pub sende_queue_tiefe: usize,
}

impl Default for JitterEinstellungen {
    fn default() -> Self {
        Self {
            reorder_fenster: 4,
            max_pakete: 16,
            sende_queue_tiefe: 3,
        }
    }
}

/// Session-Lebenszyklus-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionEinstellungen {
    /// Hartes Zeitlimit fuer den Handshake in Millisekunden
    pub handshake_timeout_ms: u64,
    /// Idle-Schwelle nach der ein stummer Sprecher-Kontext faellt (ms)
    pub sprecher_idle_ms: u64,
    /// Intervall des Eviction-Sweeps (ms)
    pub eviction_intervall_ms: u64,
    /// Versiegelte Pakete pro Schluessel bevor eine Rotation erzwungen wird
    pub nonce_budget: u64,
}

impl Default for SessionEinstellungen {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 5_000,
            sprecher_idle_ms: 30_000,
            eviction_intervall_ms: 5_000,
            // Weit unterhalb der ersten moeglichen (Sequenz, Zeitstempel)-
            // Wiederholung bei 2^26 Paketen
            nonce_budget: 1 << 24,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: trace/debug/info/warn/error
    pub level: String,
    /// Format: "text" oder "json"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl SprachrohrConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config
                    .audio
                    .validieren()
                    .map_err(|e| anyhow::anyhow!("Ungueltige Audio-Einstellungen: {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }
}
