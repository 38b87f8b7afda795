//! Opus Encoder/Decoder Adapter
//!
//! Kapselt audiopus und stellt eine Frame-basierte i16-PCM-API bereit.
//! Encoder und Decoder tragen Kontinuitaets-Zustand ueber Aufrufe hinweg
//! und duerfen deshalb nicht zwischen Streams geteilt werden: ein
//! Encoder pro Sende-Pfad, ein Decoder pro entferntem Sprecher.

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Bitrate, Channels, SampleRate,
};
use tracing::debug;

use crate::error::{AudioError, AudioResult};
use crate::frame::Frame;
use sprachrohr_core::config::AudioEinstellungen;

fn sample_rate_aus_config(einstellungen: &AudioEinstellungen) -> AudioResult<SampleRate> {
    match einstellungen.sample_rate {
        8_000 => Ok(SampleRate::Hz8000),
        12_000 => Ok(SampleRate::Hz12000),
        16_000 => Ok(SampleRate::Hz16000),
        24_000 => Ok(SampleRate::Hz24000),
        48_000 => Ok(SampleRate::Hz48000),
        andere => Err(AudioError::Konfiguration(format!(
            "Abtastrate {andere} wird von Opus nicht unterstuetzt"
        ))),
    }
}

fn channels_aus_config(einstellungen: &AudioEinstellungen) -> AudioResult<Channels> {
    match einstellungen.kanaele {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        andere => Err(AudioError::Konfiguration(format!(
            "Kanalanzahl {andere} ungueltig (1 oder 2)"
        ))),
    }
}

// ---------------------------------------------------------------------------
// OpusEncoder
// ---------------------------------------------------------------------------

/// Opus-Encoder: kodiert i16-PCM-Frames zu Opus-Bytes
pub struct OpusEncoder {
    encoder: Encoder,
    frame_samples: usize,
}

impl OpusEncoder {
    /// Erstellt einen neuen Encoder mit der gegebenen Konfiguration
    pub fn neu(einstellungen: &AudioEinstellungen) -> AudioResult<Self> {
        einstellungen
            .validieren()
            .map_err(AudioError::Konfiguration)?;

        let sample_rate = sample_rate_aus_config(einstellungen)?;
        let channels = channels_aus_config(einstellungen)?;

        let mut encoder = Encoder::new(sample_rate, channels, Application::Voip)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        encoder
            .set_bitrate(Bitrate::BitsPerSecond(
                (einstellungen.bitrate_kbps as i32) * 1000,
            ))
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        let frame_samples = einstellungen.samples_interleaved();

        debug!(
            bitrate_kbps = einstellungen.bitrate_kbps,
            frame_samples, "OpusEncoder erstellt"
        );

        Ok(Self {
            encoder,
            frame_samples,
        })
    }

    /// Kodiert einen PCM-Frame zu Opus-Bytes
    ///
    /// Die Eingabe muss exakt `frame_samples()` interleaved Samples lang
    /// sein.
    pub fn encode(&mut self, frame: &Frame) -> AudioResult<Vec<u8>> {
        if frame.laenge() != self.frame_samples {
            return Err(AudioError::UngueltigeFrameLaenge {
                erwartet: self.frame_samples,
                erhalten: frame.laenge(),
            });
        }

        // 4000 Bytes decken alle Opus-Frame-Groessen ab
        let mut output = vec![0u8; 4000];
        let written = self
            .encoder
            .encode(frame.pcm.as_slice(), &mut output)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(written);
        Ok(output)
    }

    /// Gibt die erwartete Frame-Groesse in interleaved Samples zurueck
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }
}

// ---------------------------------------------------------------------------
// OpusDecoder
// ---------------------------------------------------------------------------

/// Opus-Decoder: dekodiert Opus-Bytes zu i16-PCM-Frames
///
/// Exklusiv einem Sprecher-Kontext zugeordnet – der Decoder haelt
/// Kontinuitaets-Zustand der nach jeder Luecke via [`Self::decode_verlust`]
/// gueltig gehalten werden muss.
pub struct OpusDecoder {
    decoder: Decoder,
    kanaele: usize,
    frame_samples: usize,
}

impl OpusDecoder {
    /// Erstellt einen neuen Decoder
    pub fn neu(einstellungen: &AudioEinstellungen) -> AudioResult<Self> {
        let sample_rate = sample_rate_aus_config(einstellungen)?;
        let channels = channels_aus_config(einstellungen)?;

        let decoder = Decoder::new(sample_rate, channels)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        let kanaele = einstellungen.kanaele as usize;
        let frame_samples = einstellungen.samples_interleaved();

        debug!(frame_samples, "OpusDecoder erstellt");

        Ok(Self {
            decoder,
            kanaele,
            frame_samples,
        })
    }

    /// Dekodiert Opus-Bytes zu einem PCM-Frame
    ///
    /// # Fehler
    /// `CodecFehler` bei korruptem Bitstream – der Aufrufer ersetzt den
    /// Frame durch Stille und faehrt fort.
    pub fn decode(&mut self, opus_daten: &[u8]) -> AudioResult<Frame> {
        let mut output = vec![0i16; self.frame_samples];
        let dekodiert = self
            .decoder
            .decode(Some(opus_daten), &mut output, false)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(dekodiert * self.kanaele);
        Ok(Frame::neu(output))
    }

    /// Dekodiert einen verlorenen Frame via Packet Loss Concealment
    ///
    /// Haelt den Decoder-Zustand ueber Luecken hinweg gueltig; das
    /// Ergebnis ist als Stille-Frame markiert.
    pub fn decode_verlust(&mut self) -> AudioResult<Frame> {
        let mut output = vec![0i16; self.frame_samples];
        let dekodiert = self
            .decoder
            .decode(None::<&[u8]>, &mut output, false)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(dekodiert * self.kanaele);
        let mut frame = Frame::neu(output);
        frame.ist_stille = true;
        Ok(frame)
    }

    /// Gibt die erwartete Frame-Groesse in interleaved Samples zurueck
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_einstellungen() -> AudioEinstellungen {
        AudioEinstellungen::default()
    }

    fn sinus_frame(samples: usize) -> Frame {
        let pcm: Vec<i16> = (0..samples)
            .map(|i| {
                let t = i as f32 / 48_000.0;
                ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 8000.0) as i16
            })
            .collect();
        Frame::neu(pcm)
    }

    #[test]
    fn encoder_standard_konfiguration() {
        let enc = OpusEncoder::neu(&standard_einstellungen());
        assert!(enc.is_ok());
        // 20ms bei 48kHz stereo = 1920 interleaved Samples
        assert_eq!(enc.unwrap().frame_samples(), 1920);
    }

    #[test]
    fn encoder_falsche_frame_laenge() {
        let mut enc = OpusEncoder::neu(&standard_einstellungen()).unwrap();
        let result = enc.encode(&Frame::neu(vec![0i16; 100]));
        assert!(matches!(
            result,
            Err(AudioError::UngueltigeFrameLaenge {
                erwartet: 1920,
                erhalten: 100
            })
        ));
    }

    #[test]
    fn encoder_decoder_round_trip() {
        let einstellungen = standard_einstellungen();
        let mut enc = OpusEncoder::neu(&einstellungen).unwrap();
        let mut dec = OpusDecoder::neu(&einstellungen).unwrap();

        let original = sinus_frame(enc.frame_samples());
        let kodiert = enc.encode(&original).expect("Encoding muss funktionieren");
        assert!(!kodiert.is_empty());
        assert!(kodiert.len() < original.laenge() * 2, "Opus muss komprimieren");

        let dekodiert = dec.decode(&kodiert).expect("Decoding muss funktionieren");
        assert_eq!(dekodiert.laenge(), original.laenge());

        // Verlustbehaftete Toleranz: Energie muss in derselben
        // Groessenordnung liegen
        let energie = |f: &Frame| -> f64 {
            f.pcm.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / f.laenge() as f64
        };
        let original_energie = energie(&original);
        let dekodiert_energie = energie(&dekodiert);
        assert!(
            dekodiert_energie > original_energie * 0.1,
            "Dekodierte Energie zu niedrig: {dekodiert_energie} vs {original_energie}"
        );
    }

    #[test]
    fn decoder_plc_haelt_laenge() {
        let einstellungen = standard_einstellungen();
        let mut dec = OpusDecoder::neu(&einstellungen).unwrap();

        let frame = dec.decode_verlust().expect("PLC muss funktionieren");
        assert_eq!(frame.laenge(), 1920);
        assert!(frame.ist_stille);
    }

    #[test]
    fn decoder_korrupter_bitstream() {
        let einstellungen = standard_einstellungen();
        let mut dec = OpusDecoder::neu(&einstellungen).unwrap();

        // Zufaellige Bytes die kein gueltiger Opus-TOC sind
        let ergebnis = dec.decode(&[0xFF, 0x00, 0xAB, 0xCD, 0x12]);
        assert!(ergebnis.is_err());
    }

    #[test]
    fn stille_frame_ist_kodierbar() {
        let einstellungen = standard_einstellungen();
        let mut enc = OpusEncoder::neu(&einstellungen).unwrap();

        let kodiert = enc.encode(&Frame::stille()).unwrap();
        assert!(!kodiert.is_empty());
    }
}
