//! Sende-Takt – ausgehendes Pacing mit fester Frame-Dauer
//!
//! Der Takt entnimmt der begrenzten Sende-Queue im festen Frame-Intervall
//! und blockiert den Takt nie auf den Produzenten: kommt dieser nicht
//! hinterher, wird ein Stille-Frame substituiert, damit die Wiedergabe
//! der Gegenseite kontinuierlich bleibt. Referenz ist der monotone
//! tokio-Timer, kein Wall-Clock-Polling.
//!
//! Nach Strom-Ende folgt ein kurzer Stille-Nachlauf, damit die
//! Gegenseite ihre Decoder sauber auslaufen laesst; danach endet der
//! Takt deterministisch (Queue-Tiefe + Nachlauf Intervalle).

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

/// Stille-Frames die nach Strom-Ende noch gesendet werden
pub const NACHLAUF_STILLE_FRAMES: u32 = 5;

/// Ein vom Takt freigegebener Frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaktFrame {
    /// Kodierter Opus-Frame aus der Sende-Queue
    Audio(Vec<u8>),
    /// Substituierte Stille (Produzenten-Stau oder Nachlauf)
    Stille,
}

/// Sende-Takt ueber einer begrenzten Frame-Queue
pub struct SendeTakt {
    rx: mpsc::Receiver<Vec<u8>>,
    intervall: Interval,
    stille_eingefuegt: u64,
    nachlauf_verbleibend: u32,
    produzent_weg: bool,
}

impl SendeTakt {
    /// Erstellt einen Takt mit der gegebenen Frame-Dauer
    pub fn neu(rx: mpsc::Receiver<Vec<u8>>, frame_dauer: Duration) -> Self {
        let mut intervall = tokio::time::interval(frame_dauer);
        // Verpasste Ticks nachholen haelt die Langzeit-Drift unter einer
        // Frame-Dauer
        intervall.set_missed_tick_behavior(MissedTickBehavior::Burst);
        Self {
            rx,
            intervall,
            stille_eingefuegt: 0,
            nachlauf_verbleibend: NACHLAUF_STILLE_FRAMES,
            produzent_weg: false,
        }
    }

    /// Wartet auf den naechsten Tick und gibt den faelligen Frame zurueck
    ///
    /// `None` beendet den Takt: Strom zu Ende (oder geschlossen) und
    /// Nachlauf gesendet.
    pub async fn naechster(&mut self) -> Option<TaktFrame> {
        self.intervall.tick().await;

        if self.produzent_weg {
            return self.nachlauf();
        }

        match self.rx.try_recv() {
            Ok(frame) => Some(TaktFrame::Audio(frame)),
            Err(mpsc::error::TryRecvError::Empty) => {
                // Produzent kommt nicht hinterher: Stille statt Stau
                self.stille_eingefuegt += 1;
                tracing::trace!("Sende-Queue leer, Stille substituiert");
                Some(TaktFrame::Stille)
            }
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.produzent_weg = true;
                self.nachlauf()
            }
        }
    }

    fn nachlauf(&mut self) -> Option<TaktFrame> {
        if self.nachlauf_verbleibend > 0 {
            self.nachlauf_verbleibend -= 1;
            Some(TaktFrame::Stille)
        } else {
            None
        }
    }

    /// Schliesst die Queue: gepufferte Frames laufen noch aus, neue
    /// werden abgewiesen. Der Takt endet danach innerhalb von
    /// Queue-Tiefe + Nachlauf Intervallen (deterministischer Drain beim
    /// Session-Teardown).
    pub fn schliessen(&mut self) {
        self.rx.close();
    }

    /// Anzahl der wegen Produzenten-Stau substituierten Stille-Frames
    pub fn stille_eingefuegt(&self) -> u64 {
        self.stille_eingefuegt
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_DAUER: Duration = Duration::from_millis(20);

    #[tokio::test(start_paused = true)]
    async fn produzenten_stau_substituiert_exakt_drei_stille_frames() {
        let (tx, rx) = mpsc::channel(3);
        let mut takt = SendeTakt::neu(rx, FRAME_DAUER);

        tx.send(vec![1]).await.unwrap();
        tx.send(vec![2]).await.unwrap();

        assert_eq!(takt.naechster().await, Some(TaktFrame::Audio(vec![1])));
        assert_eq!(takt.naechster().await, Some(TaktFrame::Audio(vec![2])));

        // Produzent stockt drei Intervalle lang
        for _ in 0..3 {
            assert_eq!(takt.naechster().await, Some(TaktFrame::Stille));
        }
        assert_eq!(takt.stille_eingefuegt(), 3);

        // Produzent liefert wieder
        tx.send(vec![3]).await.unwrap();
        assert_eq!(takt.naechster().await, Some(TaktFrame::Audio(vec![3])));
        assert_eq!(takt.stille_eingefuegt(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn takt_drift_unter_einer_frame_dauer() {
        let (tx, rx) = mpsc::channel(4);
        let mut takt = SendeTakt::neu(rx, FRAME_DAUER);

        let start = tokio::time::Instant::now();

        // 10 Sekunden = 500 Frames; Produzent liefert nur sporadisch
        for i in 0..500u32 {
            if i % 7 == 0 {
                let _ = tx.try_send(vec![i as u8]);
            }
            assert!(takt.naechster().await.is_some());
        }

        let ideal = FRAME_DAUER * 500;
        let vergangen = start.elapsed();
        let drift = if vergangen > ideal {
            vergangen - ideal
        } else {
            ideal - vergangen
        };
        assert!(
            drift < FRAME_DAUER,
            "Takt-Drift {drift:?} ueberschreitet eine Frame-Dauer"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn strom_ende_ergibt_nachlauf_und_terminiert() {
        let (tx, rx) = mpsc::channel(3);
        let mut takt = SendeTakt::neu(rx, FRAME_DAUER);

        tx.send(vec![1]).await.unwrap();
        drop(tx);

        assert_eq!(takt.naechster().await, Some(TaktFrame::Audio(vec![1])));

        for _ in 0..NACHLAUF_STILLE_FRAMES {
            assert_eq!(takt.naechster().await, Some(TaktFrame::Stille));
        }
        assert_eq!(takt.naechster().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn schliessen_draint_gepufferte_frames_begrenzt() {
        let (tx, rx) = mpsc::channel(3);
        let mut takt = SendeTakt::neu(rx, FRAME_DAUER);

        tx.send(vec![1]).await.unwrap();
        tx.send(vec![2]).await.unwrap();

        takt.schliessen();

        // Gepufferte Frames laufen aus, dann Nachlauf, dann Ende --
        // unabhaengig davon dass der Sender noch existiert
        assert_eq!(takt.naechster().await, Some(TaktFrame::Audio(vec![1])));
        assert_eq!(takt.naechster().await, Some(TaktFrame::Audio(vec![2])));
        let mut stille = 0;
        while let Some(frame) = takt.naechster().await {
            assert_eq!(frame, TaktFrame::Stille);
            stille += 1;
            assert!(stille <= NACHLAUF_STILLE_FRAMES, "Drain nicht begrenzt");
        }
        assert_eq!(stille, NACHLAUF_STILLE_FRAMES);
        drop(tx);
    }
}
