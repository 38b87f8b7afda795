//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar ueber die [`sprachrohr_core::config::LoggingEinstellungen`]
//! und per Umgebungsvariable (Umgebung gewinnt):
//! - `SR_LOG_LEVEL`: Log-Level (trace/debug/info/warn/error)
//! - `SR_LOG_FORMAT`: Format (text/json)

use sprachrohr_core::config::LoggingEinstellungen;
use tracing_subscriber::{fmt, EnvFilter};

/// Aufgeloeste Logging-Konfiguration (Datei-Einstellungen + Umgebung)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingBootstrap {
    /// Effektives Log-Level
    pub level: String,
    /// Effektives Format ("text" oder "json")
    pub format: String,
}

impl LoggingBootstrap {
    /// Loest die effektive Konfiguration auf: Umgebungsvariablen
    /// ueberschreiben die Datei-Einstellungen, ungueltige Werte fallen
    /// auf die Standardwerte zurueck.
    pub fn aufloesen(einstellungen: &LoggingEinstellungen) -> Self {
        let level = std::env::var("SR_LOG_LEVEL")
            .ok()
            .filter(|l| level_gueltig(l))
            .unwrap_or_else(|| {
                if level_gueltig(&einstellungen.level) {
                    einstellungen.level.clone()
                } else {
                    "info".to_string()
                }
            });

        let format = std::env::var("SR_LOG_FORMAT")
            .ok()
            .filter(|f| format_gueltig(f))
            .unwrap_or_else(|| {
                if format_gueltig(&einstellungen.format) {
                    einstellungen.format.clone()
                } else {
                    "text".to_string()
                }
            });

        Self { level, format }
    }

    /// Installiert den globalen Subscriber. Einmal pro Prozess aufrufen.
    pub fn initialisieren(&self) {
        let filter = EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"));

        match self.format.as_str() {
            "json" => {
                fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true)
                    .init();
            }
            _ => {
                fmt().with_env_filter(filter).with_target(true).init();
            }
        }
    }
}

/// Bequemer Einstieg: aufloesen und initialisieren in einem Schritt
pub fn logging_initialisieren(einstellungen: &LoggingEinstellungen) {
    LoggingBootstrap::aufloesen(einstellungen).initialisieren();
}

fn level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

fn format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
