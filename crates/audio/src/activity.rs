//! Sprachaktivitaets-Erkennung pro Sprecher
//!
//! Energie-basierte Erkennung gegen einen adaptiven Rauschboden: der
//! Boden gleitet waehrend Stille langsam dem Signalpegel nach, Sprache
//! liegt deutlich (Faktor 1.8) darueber. Ein Hangover verhindert
//! Flattern an Wortgrenzen.
//!
//! Rein analytisch – die Samples werden nie veraendert. Konsumenten
//! (Wake-Word, STT) sitzen hinter dem opaken Modell-Kollaborator.

use crate::frame::Frame;

/// Konfiguration der Sprachaktivitaets-Erkennung
#[derive(Debug, Clone)]
pub struct AktivitaetsConfig {
    /// Faktor ueber dem Rauschboden ab dem Sprache angenommen wird
    pub schwellen_faktor: f32,
    /// Glaettungsgewicht des Rauschbodens waehrend Stille (Anteil alt)
    pub boden_glaettung: f32,
    /// Frames die nach letzter Aktivitaet noch als aktiv gelten
    pub hangover_frames: u32,
}

impl Default for AktivitaetsConfig {
    fn default() -> Self {
        Self {
            schwellen_faktor: 1.8,
            boden_glaettung: 0.95,
            // ~340 ms bei 20 ms-Frames
            hangover_frames: 17,
        }
    }
}

/// Gemeldeter Wechsel des Sprech-Status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AktivitaetsWechsel {
    /// Der Sprecher hat begonnen zu sprechen
    Begonnen,
    /// Der Sprecher ist verstummt (Hangover abgelaufen)
    Beendet,
}

/// Sprachaktivitaets-Detektor fuer einen einzelnen Sprecher
pub struct SprachAktivitaet {
    config: AktivitaetsConfig,
    rauschboden: f32,
    hangover: u32,
    spricht: bool,
}

impl SprachAktivitaet {
    /// Erstellt einen Detektor mit gegebener Konfiguration
    pub fn neu(config: AktivitaetsConfig) -> Self {
        Self {
            config,
            rauschboden: 0.0,
            hangover: 0,
            spricht: false,
        }
    }

    /// Erstellt einen Detektor mit Standardkonfiguration
    pub fn standard() -> Self {
        Self::neu(AktivitaetsConfig::default())
    }

    /// Gibt zurueck ob der Sprecher aktuell als sprechend gilt
    pub fn spricht(&self) -> bool {
        self.spricht
    }

    /// Analysiert einen Frame; meldet einen Wechsel falls eingetreten
    pub fn verarbeiten(&mut self, frame: &Frame) -> Option<AktivitaetsWechsel> {
        let pegel = pcm_rms(&frame.pcm);

        // Rauschboden initialisieren bzw. waehrend Stille nachfuehren
        if self.rauschboden == 0.0 {
            self.rauschboden = pegel;
        } else if !self.spricht {
            self.rauschboden = self.rauschboden * self.config.boden_glaettung
                + pegel * (1.0 - self.config.boden_glaettung);
        }

        let ist_sprache =
            !frame.ist_stille && pegel > self.rauschboden * self.config.schwellen_faktor;

        if ist_sprache {
            self.hangover = self.config.hangover_frames;
            if !self.spricht {
                self.spricht = true;
                return Some(AktivitaetsWechsel::Begonnen);
            }
        } else if self.spricht {
            if self.hangover > 0 {
                self.hangover -= 1;
            } else {
                self.spricht = false;
                return Some(AktivitaetsWechsel::Beendet);
            }
        }

        None
    }

    /// Aktueller Rauschboden (nuetzlich fuer Diagnose)
    pub fn rauschboden(&self) -> f32 {
        self.rauschboden
    }
}

/// Berechnet den RMS-Pegel eines interleaved i16-PCM-Frames
pub fn pcm_rms(pcm: &[i16]) -> f32 {
    if pcm.is_empty() {
        return 0.0;
    }
    let quadratsumme: f64 = pcm.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (quadratsumme / pcm.len() as f64).sqrt() as f32
}
