//! Per-build opcode permutation.
//!
//! Each build picks a seed; the whole byte space is shuffled with it so that
//! the serialized opcode bytes of one build say nothing about another's.
//! Both sides regenerate the table from the seed, so it never has to be
//! stored next to the stubs.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

#[derive(Clone, PartialEq, Eq)]
pub struct OpcodeTable {
    encode: [u8; 256],
    decode: [u8; 256],
    seed: Option<u64>,
}

impl OpcodeTable {
    /// The table that leaves every opcode unchanged.
    pub fn identity() -> Self {
        let mut encode = [0u8; 256];
        for (i, slot) in encode.iter_mut().enumerate() {
            *slot = i as u8;
        }
        Self {
            encode,
            decode: encode,
            seed: None,
        }
    }

    /// Generate the permutation for a build seed.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut shuffled: Vec<u8> = (0..=u8::MAX).collect();
        shuffled.shuffle(&mut rng);

        let mut encode = [0u8; 256];
        let mut decode = [0u8; 256];
        for (logical, physical) in shuffled.into_iter().enumerate() {
            encode[logical] = physical;
            decode[physical as usize] = logical as u8;
        }
        Self {
            encode,
            decode,
            seed: Some(seed),
        }
    }

    #[inline]
    pub fn encode(&self, opcode: u8) -> u8 {
        self.encode[opcode as usize]
    }

    #[inline]
    pub fn decode(&self, byte: u8) -> u8 {
        self.decode[byte as usize]
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Debug for OpcodeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.seed {
            Some(seed) => write!(f, "OpcodeTable(seed={:#x})", seed),
            None => write!(f, "OpcodeTable(identity)"),
        }
    }
}
