//! Reorder-Jitter-Buffer fuer eingehende Voice-Pakete
//!
//! Ordnet Pakete eines Sprechers nach Sequenznummer und haelt verspaetete
//! Ankuenfte fuer ein begrenztes Fenster zurueck. Eine Luecke, die das
//! Fenster ueberlebt, wird als [`JitterErgebnis::Luecke`] emittiert –
//! der Aufrufer fuellt sie mit einem PLC-/Stille-Frame, damit der
//! Decoder-Zustand gueltig bleibt. Dieses begrenzte Fenster plus
//! Luecken-Fuellung ist der zentrale Korrektheit/Latenz-Kompromiss der
//! gesamten Pipeline.
//!
//! ## Performance-Eigenschaften
//! - O(log n) Einfuegen (BTreeMap nach entrollter Sequenz sortiert)
//! - O(1) Entnahme des aeltesten Pakets
//! - Keine Locks im Hot Path (wird pro Sprecher single-threaded verwendet)

use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// SequenzEntroller
// ---------------------------------------------------------------------------

/// Entrollt die u16-Wire-Sequenz in einen monoton steigenden u64-Raum
///
/// Der Jitter-Buffer sortiert ueber Wrap-Grenzen hinweg korrekt, weil
/// er ausschliesslich mit entrollten Werten arbeitet.
#[derive(Debug, Default)]
pub struct SequenzEntroller {
    letzte: Option<u16>,
    hoechste: u64,
}

impl SequenzEntroller {
    /// Erstellt einen Entroller ohne Vorgeschichte
    pub fn neu() -> Self {
        Self::default()
    }

    /// Entrollt eine Wire-Sequenznummer
    ///
    /// Differenzen bis zur halben u16-Spanne gelten als Vorwaertsschritt
    /// (RTP-Konvention); alles andere als verspaetetes Paket vor der
    /// aktuellen Position.
    pub fn entrollen(&mut self, seq: u16) -> u64 {
        let letzte = match self.letzte {
            None => {
                self.letzte = Some(seq);
                self.hoechste = seq as u64;
                return self.hoechste;
            }
            Some(l) => l,
        };

        let vorwaerts = seq.wrapping_sub(letzte);
        if vorwaerts as u32 <= u16::MAX as u32 / 2 {
            self.hoechste += vorwaerts as u64;
            self.letzte = Some(seq);
            self.hoechste
        } else {
            let rueckwaerts = letzte.wrapping_sub(seq) as u64;
            self.hoechste.saturating_sub(rueckwaerts)
        }
    }

    /// Hoechste bisher gesehene Wire-Sequenznummer
    pub fn hoechste_sequenz(&self) -> Option<u16> {
        self.letzte
    }
}

// ---------------------------------------------------------------------------
// Konfiguration & Statistik
// ---------------------------------------------------------------------------

/// Konfiguration des Reorder-Buffers
#[derive(Debug, Clone)]
pub struct JitterConfig {
    /// Reorder-Fenster in Frame-Dauern: so lange wird auf eine Luecke
    /// gewartet bevor sie mit Stille gefuellt wird
    pub fenster: usize,
    /// Maximale Pufferung bevor das aelteste Paket verworfen wird
    pub max_pakete: usize,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            fenster: 4,
            max_pakete: 16,
        }
    }
}

/// Statistiken des Jitter-Buffers (Snapshot)
#[derive(Debug, Clone, Default)]
pub struct JitterStatistik {
    /// Anzahl empfangener Pakete gesamt
    pub empfangen: u64,
    /// Anzahl in Reihenfolge emittierter Pakete
    pub abgespielt: u64,
    /// Anzahl verworfener Duplikate
    pub duplikate: u64,
    /// Anzahl verworfener zu spaeter Pakete (Position bereits emittiert)
    pub verspaetet: u64,
    /// Anzahl mit Stille gefuellter Luecken
    pub luecken_gefuellt: u64,
    /// Anzahl bei Ueberlauf verworfener Pakete
    pub verworfen: u64,
    /// Aktueller Fuellstand in Paketen
    pub fuellstand: usize,
}

// ---------------------------------------------------------------------------
// ReorderJitterBuffer
// ---------------------------------------------------------------------------

/// Ergebnis einer Entnahme aus dem Jitter-Buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JitterErgebnis {
    /// Entschluesselte Opus-Nutzdaten in Sequenz-Reihenfolge
    Nutzdaten(Vec<u8>),
    /// Luecke ausserhalb des Fensters – mit PLC/Stille fuellen
    Luecke,
}

/// Reorder-Jitter-Buffer eines einzelnen Sprechers
pub struct ReorderJitterBuffer {
    config: JitterConfig,
    /// Gepufferte Nutzdaten, sortiert nach entrollter Sequenz
    pakete: BTreeMap<u64, Vec<u8>>,
    /// Naechste zu emittierende Sequenz
    naechste: Option<u64>,
    statistik: JitterStatistik,
}

impl ReorderJitterBuffer {
    /// Erstellt einen Buffer mit gegebener Konfiguration
    pub fn neu(config: JitterConfig) -> Self {
        Self {
            config,
            pakete: BTreeMap::new(),
            naechste: None,
            statistik: JitterStatistik::default(),
        }
    }

    /// Erstellt einen Buffer mit Standardkonfiguration
    pub fn standard() -> Self {
        Self::neu(JitterConfig::default())
    }

    /// Fuegt ein Paket ein (Sequenz bereits entrollt)
    ///
    /// Erkennt Duplikate und zu spaete Pakete; verwirft bei Ueberlauf
    /// das aelteste gepufferte Paket.
    pub fn einfuegen(&mut self, seq: u64, nutzdaten: Vec<u8>) {
        self.statistik.empfangen += 1;

        if let Some(naechste) = self.naechste {
            if seq < naechste {
                self.statistik.verspaetet += 1;
                tracing::trace!(sequenz = seq, "Zu spaetes Paket verworfen");
                return;
            }
        }

        if self.pakete.contains_key(&seq) {
            self.statistik.duplikate += 1;
            tracing::trace!(sequenz = seq, "Duplikat verworfen");
            return;
        }

        self.pakete.insert(seq, nutzdaten);

        if self.pakete.len() > self.config.max_pakete {
            if let Some((aelteste, _)) = self.pakete.pop_first() {
                self.statistik.verworfen += 1;
                tracing::warn!(sequenz = aelteste, "Buffer-Ueberlauf: Paket verworfen");
            }
        }

        self.statistik.fuellstand = self.pakete.len();
    }

    /// Entnimmt das naechste Element in Sequenz-Reihenfolge
    ///
    /// Gibt `None` zurueck wenn der Buffer leer ist oder auf eine Luecke
    /// innerhalb des Fensters noch gewartet wird.
    pub fn entnehmen(&mut self) -> Option<JitterErgebnis> {
        let (&kopf, _) = self.pakete.iter().next()?;

        let naechste = match self.naechste {
            None => {
                // Erste Entnahme definiert den Startpunkt
                let nutzdaten = self.pakete.remove(&kopf)?;
                self.naechste = Some(kopf + 1);
                self.statistik.abgespielt += 1;
                self.statistik.fuellstand = self.pakete.len();
                return Some(JitterErgebnis::Nutzdaten(nutzdaten));
            }
            Some(n) => n,
        };

        if kopf == naechste {
            let nutzdaten = self.pakete.remove(&kopf)?;
            self.naechste = Some(naechste + 1);
            self.statistik.abgespielt += 1;
            self.statistik.fuellstand = self.pakete.len();
            return Some(JitterErgebnis::Nutzdaten(nutzdaten));
        }

        // Luecke vor dem Kopf: warten solange sie das Fenster noch nicht
        // ueberlebt hat, sonst mit Stille fuellen
        let letzter = *self.pakete.keys().next_back()?;
        if (letzter - naechste) as usize >= self.config.fenster {
            self.naechste = Some(naechste + 1);
            self.statistik.luecken_gefuellt += 1;
            tracing::debug!(sequenz = naechste, "Luecke mit Stille gefuellt");
            return Some(JitterErgebnis::Luecke);
        }

        None
    }

    /// Gibt eine Referenz auf die aktuellen Statistiken
    pub fn statistik(&self) -> &JitterStatistik {
        &self.statistik
    }

    /// Aktueller Fuellstand in Paketen
    pub fn fuellstand(&self) -> usize {
        self.pakete.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
