//! Lobby code generation.

use pairlink_core::LobbyCode;
use rand::Rng;

/// Source of candidate lobby codes.
///
/// The registry checks candidates for uniqueness and asks again on collision.
pub trait CodeSource: Send + Sync {
    /// Produce the next candidate.
    fn next_code(&self) -> LobbyCode;
}

/// Uniformly random codes from [`LobbyCode::ALPHABET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self) -> LobbyCode {
        let mut rng = rand::rng();
        let mut indices = [0usize; LobbyCode::LEN];
        for slot in &mut indices {
            *slot = rng.random_range(0..LobbyCode::ALPHABET.len());
        }
        LobbyCode::from_indices(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_codes_have_fixed_length() {
        let code = RandomCodes.next_code();
        assert_eq!(code.as_str().len(), LobbyCode::LEN);
    }

    #[test]
    fn random_codes_use_alphabet() {
        for _ in 0..100 {
            let code = RandomCodes.next_code();
            assert!(code.as_str().bytes().all(|b| LobbyCode::ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn random_codes_vary() {
        let a = RandomCodes.next_code();
        let differs = (0..10).any(|_| RandomCodes.next_code() != a);
        assert!(differs);
    }
}
