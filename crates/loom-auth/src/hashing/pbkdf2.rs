//! PBKDF2 hashing handler
//!
//! Hashes look like `$PBKDF2$<internal>$<rounds>$<salt_length>$<payload>`
//! where the payload is base64 of the salt followed by the derived key.

use super::HashingHandler;
use crate::config::HashingConfig;
use crate::error::HashingError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::{thread_rng, RngCore};
use sha2::{Sha224, Sha256, Sha384, Sha512};

const ALGORITHM: &str = "PBKDF2";
const SEPARATOR: char = '$';

/// Internal algorithms and their digest length in bytes.
const INTERNAL_ALGORITHMS: &[(&str, usize)] = &[
    ("sha224", 28),
    ("sha256", 32),
    ("sha384", 48),
    ("sha512", 64),
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct HashParts {
    internal_algorithm: String,
    rounds: u32,
    salt: Vec<u8>,
    text_hash: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Pbkdf2Handler {
    internal_algorithm: String,
    rounds: u32,
    salt_length: usize,
}

impl Pbkdf2Handler {
    pub fn new(internal_algorithm: impl Into<String>, rounds: u32, salt_length: usize) -> Self {
        Self {
            internal_algorithm: internal_algorithm.into(),
            rounds,
            salt_length,
        }
    }

    pub fn from_config(config: &HashingConfig) -> Self {
        Self::new(
            config.pbkdf2_internal_algorithm.clone(),
            config.pbkdf2_rounds,
            config.pbkdf2_salt_length,
        )
    }

    /// Hash with explicit parameters and salt.
    pub fn hash_with(
        &self,
        text: &str,
        internal_algorithm: &str,
        rounds: u32,
        salt: &[u8],
    ) -> Result<String, HashingError> {
        validate_attributes(internal_algorithm, rounds, salt.len())?;
        let text_hash = derive(internal_algorithm, text.as_bytes(), salt, rounds)?;

        let mut payload = Vec::with_capacity(salt.len() + text_hash.len());
        payload.extend_from_slice(salt);
        payload.extend_from_slice(&text_hash);

        Ok(format!(
            "{sep}{ALGORITHM}{sep}{internal_algorithm}{sep}{rounds}{sep}{salt_length}{sep}{payload}",
            sep = SEPARATOR,
            salt_length = salt.len(),
            payload = STANDARD.encode(payload),
        ))
    }

    fn extract_parts(&self, full_hash: &str) -> Result<HashParts, HashingError> {
        let invalid = || HashingError::InvalidHash {
            handler: ALGORITHM.to_string(),
        };

        let rest = full_hash.strip_prefix(SEPARATOR).ok_or_else(invalid)?;
        let parts: Vec<&str> = rest.splitn(5, SEPARATOR).collect();
        let [handler, internal_algorithm, rounds, salt_length, payload] = parts[..] else {
            return Err(invalid());
        };
        if handler != ALGORITHM {
            return Err(invalid());
        }

        let rounds: u32 = rounds.parse().map_err(|_| invalid())?;
        let salt_length: usize = salt_length.parse().map_err(|_| invalid())?;
        validate_attributes(internal_algorithm, rounds, salt_length)?;

        let payload = STANDARD.decode(payload).map_err(|_| invalid())?;
        if payload.len() <= salt_length {
            return Err(invalid());
        }
        let (salt, text_hash) = payload.split_at(salt_length);

        Ok(HashParts {
            internal_algorithm: internal_algorithm.to_string(),
            rounds,
            salt: salt.to_vec(),
            text_hash: text_hash.to_vec(),
        })
    }
}

fn digest_length(internal_algorithm: &str) -> Option<usize> {
    INTERNAL_ALGORITHMS
        .iter()
        .find(|(name, _)| *name == internal_algorithm)
        .map(|(_, length)| *length)
}

fn validate_attributes(internal_algorithm: &str, rounds: u32, salt_length: usize) -> Result<(), HashingError> {
    if digest_length(internal_algorithm).is_none() {
        return Err(HashingError::InvalidInternalAlgorithm {
            algorithm: internal_algorithm.to_string(),
        });
    }
    if rounds < 1 {
        return Err(HashingError::InvalidRounds { rounds });
    }
    if salt_length < 1 {
        return Err(HashingError::InvalidSaltLength { length: salt_length });
    }
    Ok(())
}

fn derive(internal_algorithm: &str, text: &[u8], salt: &[u8], rounds: u32) -> Result<Vec<u8>, HashingError> {
    let length = digest_length(internal_algorithm).ok_or_else(|| HashingError::InvalidInternalAlgorithm {
        algorithm: internal_algorithm.to_string(),
    })?;
    let mut output = vec![0u8; length];
    match internal_algorithm {
        "sha224" => pbkdf2_hmac::<Sha224>(text, salt, rounds, &mut output),
        "sha256" => pbkdf2_hmac::<Sha256>(text, salt, rounds, &mut output),
        "sha384" => pbkdf2_hmac::<Sha384>(text, salt, rounds, &mut output),
        _ => pbkdf2_hmac::<Sha512>(text, salt, rounds, &mut output),
    }
    Ok(output)
}

impl HashingHandler for Pbkdf2Handler {
    fn name(&self) -> &'static str {
        "pbkdf2"
    }

    fn generate_hash(&self, text: &str) -> Result<String, HashingError> {
        validate_attributes(&self.internal_algorithm, self.rounds, self.salt_length)?;
        let mut salt = vec![0u8; self.salt_length];
        thread_rng().fill_bytes(&mut salt);
        self.hash_with(text, &self.internal_algorithm, self.rounds, &salt)
    }

    fn is_match(&self, text: &str, full_hash: &str) -> bool {
        let Ok(parts) = self.extract_parts(full_hash) else {
            return false;
        };
        match derive(&parts.internal_algorithm, text.as_bytes(), &parts.salt, parts.rounds) {
            Ok(text_hash) => text_hash == parts.text_hash,
            Err(_) => false,
        }
    }

    fn recognizes(&self, full_hash: &str) -> bool {
        full_hash.starts_with("$PBKDF2$")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> Pbkdf2Handler {
        Pbkdf2Handler::new("sha256", 100, 8)
    }

    #[test]
    fn test_generate_and_match() {
        let handler = handler();
        let hash = handler.generate_hash("correct horse").unwrap();
        assert!(hash.starts_with("$PBKDF2$sha256$100$8$"));
        assert!(handler.recognizes(&hash));
        assert!(handler.is_match("correct horse", &hash));
        assert!(!handler.is_match("battery staple", &hash));
    }

    #[test]
    fn test_stored_parameters_win_over_configured_ones() {
        let stored = Pbkdf2Handler::new("sha512", 10, 4).generate_hash("secret").unwrap();
        assert!(handler().is_match("secret", &stored));
    }

    #[test]
    fn test_known_salt_is_deterministic() {
        let handler = handler();
        let first = handler.hash_with("text", "sha384", 5, b"salt").unwrap();
        let second = handler.hash_with("text", "sha384", 5, b"salt").unwrap();
        assert_eq!(first, second);
        assert_eq!(handler.extract_parts(&first).unwrap().text_hash.len(), 48);
    }

    #[test]
    fn test_malformed_hashes_never_match() {
        let handler = handler();
        let valid = handler.hash_with("text", "sha256", 5, b"salt").unwrap();
        let malformed = [
            "",
            "PBKDF2$sha256$5$4$AAAA",
            "$BCRYPT$sha256$5$4$AAAA",
            "$PBKDF2$md5$5$4$AAAA",
            "$PBKDF2$sha256$0$4$AAAA",
            "$PBKDF2$sha256$5$0$AAAA",
            "$PBKDF2$sha256$x$4$AAAA",
            "$PBKDF2$sha256$5$4$not-base64!",
            "$PBKDF2$sha256$5$4",
            "$PBKDF2$sha256$5$400$AAAA",
        ];
        for hash in malformed {
            assert!(!handler.is_match("text", hash), "{}", hash);
        }
        assert!(handler.is_match("text", &valid));
    }

    #[test]
    fn test_invalid_configuration_is_reported() {
        let err = Pbkdf2Handler::new("md5", 10, 8).generate_hash("x").unwrap_err();
        assert!(matches!(err, HashingError::InvalidInternalAlgorithm { .. }));
        let err = Pbkdf2Handler::new("sha256", 0, 8).generate_hash("x").unwrap_err();
        assert!(matches!(err, HashingError::InvalidRounds { rounds: 0 }));
        let err = Pbkdf2Handler::new("sha256", 1, 0).generate_hash("x").unwrap_err();
        assert!(matches!(err, HashingError::InvalidSaltLength { length: 0 }));
    }
}
