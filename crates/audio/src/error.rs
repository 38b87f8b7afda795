//! Fehlertypen der Audio-Pipeline

use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Pipeline
#[derive(Debug, Error)]
pub enum AudioError {
    /// Korrupter Bitstream oder Encoder/Decoder-Fehler.
    /// Pro Frame nicht fatal – der Aufrufer ersetzt durch Stille.
    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("PCM-Frame muss {erwartet} Samples lang sein, war {erhalten}")]
    UngueltigeFrameLaenge { erwartet: usize, erhalten: usize },

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    /// Der externe Transcoder konnte nicht gestartet werden
    /// (Programm fehlt, Quelle nicht zugreifbar)
    #[error("Transcoder-Start fehlgeschlagen: {0}")]
    TranscoderStart(String),

    /// Der externe Transcoder hat sich mit Fehlerstatus beendet
    /// (nicht unterstuetztes Format, abgebrochener Stream).
    /// Fatal nur fuer die aktuelle Wiedergabe-Anfrage.
    #[error("Transcoder beendet mit Status {code:?}")]
    TranscoderBeendet { code: Option<i32> },

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;
