use rand_core::{OsRng, RngCore};

pub(crate) const NONCE_LEN: usize = 12;

/// Draw a fresh 96-bit GCM nonce from the operating system RNG.
///
/// Nonces must not repeat under one key, including across restarts.
pub(crate) fn random() -> [u8; NONCE_LEN] {
    fill(&mut OsRng)
}

pub(crate) fn fill<R: RngCore>(rng: &mut R) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    #[test]
    fn seeded_rng_is_deterministic() {
        let a = fill(&mut ChaCha20Rng::from_seed([7; 32]));
        let b = fill(&mut ChaCha20Rng::from_seed([7; 32]));
        assert_eq!(a, b);
    }

    #[test]
    fn os_nonces_differ() {
        assert_ne!(random(), random());
    }
}
