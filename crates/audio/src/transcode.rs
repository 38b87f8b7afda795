//! Transcode-Bruecke zum externen Medien-Transcoder (ffmpeg)
//!
//! Normalisiert beliebige Audio-Quellen (Datei, URL, Byte-Stream) in den
//! festen PCM-Frame-Strom der Codec-Schicht und umgekehrt. Die eigentliche
//! Format-Konvertierung macht der externe Prozess; dieses Modul passt
//! lediglich dessen Ausgabe-Framing an die feste Frame-Groesse an und
//! puffert Teil-Frames ueber Lese-Aufrufe hinweg.
//!
//! Fehler des Transcoders sind fatal fuer die aktuelle Wiedergabe-Anfrage,
//! nie fuer die Session.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::{AudioError, AudioResult};
use crate::frame::Frame;
use sprachrohr_core::config::AudioEinstellungen;

/// Groesse des Lese-Puffers fuer die Transcoder-Pipe
const LESE_PUFFER: usize = 8192;

/// Kapazitaet des Frame-Kanals (lazy: der Transcoder laeuft nur so
/// schnell wie der Konsument liest)
const STROM_KAPAZITAET: usize = 32;

// ---------------------------------------------------------------------------
// AudioQuelle
// ---------------------------------------------------------------------------

/// Eine Audio-Quelle fuer die Wiedergabe
#[derive(Debug, Clone)]
pub enum AudioQuelle {
    /// Lokale Datei (beliebiges von ffmpeg unterstuetztes Format)
    Datei(PathBuf),
    /// Entfernte Quelle via URL
    Url(String),
    /// Bereits vorliegende kodierte Bytes (werden via stdin eingespeist)
    Bytes(Vec<u8>),
}

impl AudioQuelle {
    fn eingabe_argument(&self) -> &str {
        match self {
            Self::Datei(pfad) => pfad.to_str().unwrap_or(""),
            Self::Url(url) => url,
            Self::Bytes(_) => "pipe:0",
        }
    }
}

// ---------------------------------------------------------------------------
// PcmUmrahmer
// ---------------------------------------------------------------------------

/// Schneidet einen rohen s16le-Bytestrom in exakte PCM-Frames
///
/// Pipe-Reads liefern beliebige Stueckgroessen; Teil-Frames werden bis
/// zum naechsten Aufruf gepuffert. `abschliessen` polstert den letzten
/// Teil-Frame mit Stille auf.
pub struct PcmUmrahmer {
    frame_bytes: usize,
    rest: Vec<u8>,
}

impl PcmUmrahmer {
    /// Erstellt einen Umrahmer fuer die gegebene Frame-Groesse in Bytes
    pub fn neu(frame_bytes: usize) -> Self {
        Self {
            frame_bytes,
            rest: Vec::with_capacity(frame_bytes),
        }
    }

    /// Speist neue Bytes ein und gibt alle vollstaendigen Frames zurueck
    pub fn einspeisen(&mut self, daten: &[u8]) -> Vec<Frame> {
        self.rest.extend_from_slice(daten);

        let mut frames = Vec::new();
        while self.rest.len() >= self.frame_bytes {
            let frame_bytes: Vec<u8> = self.rest.drain(..self.frame_bytes).collect();
            frames.push(Frame::aus_pcm_bytes(&frame_bytes));
        }
        frames
    }

    /// Schliesst den Strom ab: ein verbleibender Teil-Frame wird mit
    /// Stille aufgepolstert, damit der Codec eine volle Frame-Laenge sieht
    pub fn abschliessen(&mut self) -> Option<Frame> {
        if self.rest.is_empty() {
            return None;
        }
        let mut letzte = std::mem::take(&mut self.rest);
        letzte.resize(self.frame_bytes, 0);
        Some(Frame::aus_pcm_bytes(&letzte))
    }

    /// Aktuell gepufferte Rest-Bytes
    pub fn rest_bytes(&self) -> usize {
        self.rest.len()
    }
}

// ---------------------------------------------------------------------------
// FrameStrom
// ---------------------------------------------------------------------------

/// Lazy Frame-Sequenz aus einer Transcoder-Invokation
///
/// Neustart nur durch erneutes `zu_pcm` mit derselben Quelle.
pub struct FrameStrom {
    rx: mpsc::Receiver<AudioResult<Frame>>,
}

impl FrameStrom {
    /// Liefert den naechsten Frame oder `None` am Strom-Ende
    ///
    /// Ein `Err`-Element meldet einen Transcoder-Abbruch; danach folgt
    /// kein weiterer Frame.
    pub async fn naechster(&mut self) -> Option<AudioResult<Frame>> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// TranscodeBruecke
// ---------------------------------------------------------------------------

/// Bruecke zum externen Transcoder-Prozess
#[derive(Debug, Clone)]
pub struct TranscodeBruecke {
    einstellungen: AudioEinstellungen,
}

impl TranscodeBruecke {
    /// Erstellt eine Bruecke mit den gegebenen Audio-Einstellungen
    pub fn neu(einstellungen: AudioEinstellungen) -> Self {
        Self { einstellungen }
    }

    /// Startet den Transcoder fuer eine Quelle und liefert den PCM-Frame-Strom
    ///
    /// # Fehler
    /// `TranscoderStart` wenn der Prozess nicht gestartet werden kann.
    /// Abbrueche waehrend des Streams erscheinen als `Err`-Element im Strom.
    pub async fn zu_pcm(&self, quelle: &AudioQuelle) -> AudioResult<FrameStrom> {
        let mut befehl = Command::new(&self.einstellungen.ffmpeg_programm);
        befehl
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .args(["-i", quelle.eingabe_argument()])
            .args(["-f", "s16le"])
            .args(["-ar", &self.einstellungen.sample_rate.to_string()])
            .args(["-ac", &self.einstellungen.kanaele.to_string()])
            .arg("pipe:1")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(match quelle {
                AudioQuelle::Bytes(_) => Stdio::piped(),
                _ => Stdio::null(),
            })
            .kill_on_drop(true);

        let mut kind = befehl.spawn().map_err(|e| {
            AudioError::TranscoderStart(format!(
                "'{}' nicht startbar: {e}",
                self.einstellungen.ffmpeg_programm
            ))
        })?;

        // Bytes-Quelle: stdin in eigener Task befuellen, damit der
        // Stdout-Leser nicht blockiert
        if let AudioQuelle::Bytes(daten) = quelle {
            let mut stdin = kind.stdin.take().ok_or_else(|| {
                AudioError::TranscoderStart("Transcoder-stdin nicht verfuegbar".into())
            })?;
            let daten = daten.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&daten).await {
                    tracing::debug!(fehler = %e, "Transcoder-stdin vorzeitig geschlossen");
                }
                // Drop schliesst die Pipe und signalisiert EOF
            });
        }

        let mut stdout = kind.stdout.take().ok_or_else(|| {
            AudioError::TranscoderStart("Transcoder-stdout nicht verfuegbar".into())
        })?;

        let (tx, rx) = mpsc::channel(STROM_KAPAZITAET);
        let frame_bytes = self.einstellungen.pcm_bytes_pro_frame();

        tokio::spawn(async move {
            let mut umrahmer = PcmUmrahmer::neu(frame_bytes);
            let mut puffer = [0u8; LESE_PUFFER];

            loop {
                match stdout.read(&mut puffer).await {
                    Ok(0) => break, // EOF
                    Ok(n) => {
                        for frame in umrahmer.einspeisen(&puffer[..n]) {
                            if tx.send(Ok(frame)).await.is_err() {
                                // Konsument weg – Wiedergabe abgebrochen
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(AudioError::Io(e))).await;
                        return;
                    }
                }
            }

            if let Some(letzter) = umrahmer.abschliessen() {
                let _ = tx.send(Ok(letzter)).await;
            }

            match kind.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    let _ = tx
                        .send(Err(AudioError::TranscoderBeendet {
                            code: status.code(),
                        }))
                        .await;
                }
                Err(e) => {
                    let _ = tx.send(Err(AudioError::Io(e))).await;
                }
            }
        });

        Ok(FrameStrom { rx })
    }

    /// Kodiert einen PCM-Frame-Strom in das gegebene Container-Format
    ///
    /// Gegenrichtung von [`Self::zu_pcm`]; die Frames werden als s16le
    /// in den Transcoder gespeist, die kodierte Ausgabe gesammelt
    /// zurueckgegeben.
    pub async fn von_pcm(&self, frames: Vec<Frame>, format: &str) -> AudioResult<Vec<u8>> {
        let mut befehl = Command::new(&self.einstellungen.ffmpeg_programm);
        befehl
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .args(["-f", "s16le"])
            .args(["-ar", &self.einstellungen.sample_rate.to_string()])
            .args(["-ac", &self.einstellungen.kanaele.to_string()])
            .args(["-i", "pipe:0"])
            .args(["-f", format])
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut kind = befehl.spawn().map_err(|e| {
            AudioError::TranscoderStart(format!(
                "'{}' nicht startbar: {e}",
                self.einstellungen.ffmpeg_programm
            ))
        })?;

        let mut stdin = kind.stdin.take().ok_or_else(|| {
            AudioError::TranscoderStart("Transcoder-stdin nicht verfuegbar".into())
        })?;
        let mut stdout = kind.stdout.take().ok_or_else(|| {
            AudioError::TranscoderStart("Transcoder-stdout nicht verfuegbar".into())
        })?;

        // Schreiber-Task, damit sich Pipe-Puffer nicht gegenseitig
        // blockieren koennen
        let schreiber = tokio::spawn(async move {
            for frame in frames {
                if stdin.write_all(&frame.als_pcm_bytes()).await.is_err() {
                    break;
                }
            }
        });

        let mut ausgabe = Vec::new();
        stdout.read_to_end(&mut ausgabe).await?;
        let _ = schreiber.await;

        let status = kind.wait().await?;
        if !status.success() {
            return Err(AudioError::TranscoderBeendet {
                code: status.code(),
            });
        }

        Ok(ausgabe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PCM_BYTES_PRO_FRAME;

    #[test]
    fn umrahmer_schneidet_exakte_frames() {
        let mut umrahmer = PcmUmrahmer::neu(8);

        // 20 Bytes -> 2 volle Frames, 4 Bytes Rest
        let frames = umrahmer.einspeisen(&[1u8; 20]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].laenge(), 4); // 8 Bytes = 4 i16-Samples
        assert_eq!(umrahmer.rest_bytes(), 4);
    }

    #[test]
    fn umrahmer_puffert_teil_frames_ueber_aufrufe() {
        let mut umrahmer = PcmUmrahmer::neu(8);

        assert!(umrahmer.einspeisen(&[1u8; 5]).is_empty());
        assert_eq!(umrahmer.rest_bytes(), 5);

        let frames = umrahmer.einspeisen(&[2u8; 5]);
        assert_eq!(frames.len(), 1);
        assert_eq!(umrahmer.rest_bytes(), 2);
    }

    #[test]
    fn umrahmer_abschliessen_polstert_mit_stille() {
        let mut umrahmer = PcmUmrahmer::neu(8);
        umrahmer.einspeisen(&[0xFFu8; 3]);

        let letzter = umrahmer.abschliessen().expect("Rest muss Frame ergeben");
        assert_eq!(letzter.laenge(), 4);
        // Letztes Sample besteht aus 0-Polsterung
        assert_eq!(letzter.pcm[3], 0);
    }

    #[test]
    fn umrahmer_abschliessen_ohne_rest() {
        let mut umrahmer = PcmUmrahmer::neu(8);
        umrahmer.einspeisen(&[1u8; 16]);
        assert!(umrahmer.abschliessen().is_none());
    }

    #[test]
    fn umrahmer_standard_frame_groesse() {
        let mut umrahmer = PcmUmrahmer::neu(PCM_BYTES_PRO_FRAME);
        let frames = umrahmer.einspeisen(&vec![0u8; PCM_BYTES_PRO_FRAME * 3 + 100]);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].laenge(), 1920);
        assert_eq!(umrahmer.rest_bytes(), 100);
    }

    #[tokio::test]
    async fn fehlendes_programm_ergibt_start_fehler() {
        let mut einstellungen = AudioEinstellungen::default();
        einstellungen.ffmpeg_programm = "/nonexistent/ffmpeg-binary".into();
        let bruecke = TranscodeBruecke::neu(einstellungen);

        let ergebnis = bruecke
            .zu_pcm(&AudioQuelle::Datei(PathBuf::from("/tmp/egal.mp3")))
            .await;
        assert!(matches!(ergebnis, Err(AudioError::TranscoderStart(_))));
    }
}
