// Seedable pseudo-random generator
// Used for ephemeral ports, DHCP transaction ids and retry jitter. Not suitable
// for anything security related.

use rand_core::{impls, Error, RngCore};

/// Replaces an all-zero state, which xorshift can never leave.
const ZERO_SEED_SUBSTITUTE: u64 = 0x9E37_79B9_7F4A_7C15;

/// xorshift64 generator with an explicit, re-settable seed.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    /// Create a generator from a seed (typically a hardware-derived sample)
    pub fn new(seed: u64) -> Self {
        let mut rng = Self { state: 0 };
        rng.reseed(seed);
        rng
    }

    /// Restart the sequence from `seed`
    pub fn reseed(&mut self, seed: u64) {
        self.state = if seed == 0 { ZERO_SEED_SUBSTITUTE } else { seed };
    }

    fn step(&mut self) -> u64 {
        let mut s = self.state;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.state = s;
        s
    }
}

impl RngCore for SeededRng {
    fn next_u32(&mut self) -> u32 {
        (self.step() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.step()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
