//! Nonce-Budget und erzwungene Schluessel-Rotation
//!
//! Das Nonce eines Pakets wird deterministisch aus Sequenznummer und
//! Zeitstempel abgeleitet (siehe [`crate::secretbox`]). Unter einem
//! Schluessel darf sich kein Nonce wiederholen: die Sequenz wrappt nach
//! 2^16 Paketen, der Zeitstempel (Schrittweite 960 Ticks) erreicht seinen
//! Ausgangswert nach 2^26 Paketen – die erste moegliche Wiederholung des
//! Paares liegt damit bei lcm(2^16, 2^26) = 2^26 versiegelten Paketen.
//!
//! Das Budget erzwingt eine Rotation strikt davor. Die Zaehler der
//! Session laufen ueber die Rotation hinweg weiter; nur der Schluessel
//! wechselt, wodurch alte (Schluessel, Nonce)-Paare nie erneut auftreten.

use crate::error::{CryptoError, CryptoResult};

/// Erste moegliche (Sequenz, Zeitstempel)-Wiederholung bei 960er-Schritten
pub const NONCE_WIEDERHOLUNG_BEI: u64 = 1 << 26;

/// Zaehlt versiegelte Pakete pro Schluessel-Epoche
#[derive(Debug)]
pub struct NonceBudget {
    budget: u64,
    versiegelt: u64,
}

impl NonceBudget {
    /// Erstellt ein Budget. Werte oberhalb der Wiederholungsgrenze werden
    /// auf eine sichere Obergrenze gekappt.
    pub fn neu(budget: u64) -> Self {
        let budget = budget.min(NONCE_WIEDERHOLUNG_BEI - 1);
        Self {
            budget,
            versiegelt: 0,
        }
    }

    /// Verbraucht eine Einheit des Budgets (ein zu versiegelndes Paket)
    ///
    /// # Fehler
    /// `NonceBudgetErschoepft` wenn das Budget aufgebraucht ist; der
    /// Aufrufer muss rotieren bevor weitere Pakete versiegelt werden.
    pub fn verbrauchen(&mut self) -> CryptoResult<()> {
        if self.versiegelt >= self.budget {
            return Err(CryptoError::NonceBudgetErschoepft {
                budget: self.budget,
            });
        }
        self.versiegelt += 1;
        Ok(())
    }

    /// Setzt den Verbrauch nach einer Schluessel-Rotation zurueck
    /// (die Session-Zaehler bleiben unberuehrt)
    pub fn nach_rotation_zuruecksetzen(&mut self) {
        self.versiegelt = 0;
    }

    /// Bisher versiegelte Pakete in der aktuellen Epoche
    pub fn versiegelt(&self) -> u64 {
        self.versiegelt
    }

    /// Verbleibende Pakete bis zur erzwungenen Rotation
    pub fn verbleibend(&self) -> u64 {
        self.budget - self.versiegelt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_erschoepft_nach_n_paketen() {
        let mut budget = NonceBudget::neu(3);
        assert!(budget.verbrauchen().is_ok());
        assert!(budget.verbrauchen().is_ok());
        assert!(budget.verbrauchen().is_ok());
        let fehler = budget.verbrauchen().unwrap_err();
        assert!(matches!(
            fehler,
            CryptoError::NonceBudgetErschoepft { budget: 3 }
        ));
    }

    #[test]
    fn rotation_setzt_verbrauch_zurueck() {
        let mut budget = NonceBudget::neu(2);
        budget.verbrauchen().unwrap();
        budget.verbrauchen().unwrap();
        assert!(budget.verbrauchen().is_err());

        budget.nach_rotation_zuruecksetzen();
        assert_eq!(budget.versiegelt(), 0);
        assert!(budget.verbrauchen().is_ok());
    }

    #[test]
    fn budget_wird_unter_wiederholungsgrenze_gekappt() {
        let budget = NonceBudget::neu(u64::MAX);
        assert!(budget.verbleibend() < NONCE_WIEDERHOLUNG_BEI);
    }
}
