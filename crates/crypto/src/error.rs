//! Fehlertypen des Krypto-Subsystems

use thiserror::Error;

/// Alle moeglichen Fehler des Krypto-Subsystems
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Auth-Tag verifiziert nicht – Paket wurde manipuliert oder mit
    /// falschem Schluessel/Nonce versiegelt. Nicht fatal fuer die Session.
    #[error("Authentifizierung fehlgeschlagen")]
    Authentifizierung,

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    /// Das Nonce-Budget des aktuellen Schluessels ist aufgebraucht.
    /// Der Aufrufer MUSS eine Schluessel-Rotation durchfuehren bevor
    /// weitere Pakete versiegelt werden.
    #[error("Nonce-Budget erschoepft ({budget} Pakete): Schluessel-Rotation erforderlich")]
    NonceBudgetErschoepft { budget: u64 },

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = CryptoError::NonceBudgetErschoepft { budget: 1024 };
        assert!(e.to_string().contains("1024"));
        assert!(e.to_string().contains("Rotation"));
    }
}
