use rand::Rng as _;

/// A pluggable source of randomness for identifier generation.
///
/// Injected rather than reached for globally so that tests can supply a fixed
/// sequence and get reproducible identifiers. A shared source may be drawn
/// from by multiple workers; safety under that sharing is the source's own
/// contract.
pub trait RandomGenerator {
    /// Draws the next random value from the source.
    fn random(&mut self) -> u64;
}

/// Random source backed by the calling thread's RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRandomGenerator;

impl RandomGenerator for ThreadRandomGenerator {
    fn random(&mut self) -> u64 {
        rand::rng().random()
    }
}

/// Generates a globally-distinguishing identifier from two draws of `rng`.
///
/// Each draw is rendered as 16 zero-padded lowercase hex digits, giving a
/// fixed 32-character identifier. Deterministic for a deterministic source.
pub fn generate_id<R>(rng: &mut R) -> String
where
    R: RandomGenerator + ?Sized,
{
    format!("{:016x}{:016x}", rng.random(), rng.random())
}
