//! Entropy sources for randomized layout decisions.
//!
//! [`EntropyProvider`] is an explicitly constructed ChaCha8 generator: seed it for
//! reproducible output, or draw the seed from the operating system. [`SharedEntropy`]
//! wraps one provider for hosts that draw randomness from several threads; the provider
//! is created on first use.
//!
//! # Examples
//!
//! ```rust
//! use vmir::utils::EntropyProvider;
//!
//! let mut a = EntropyProvider::from_seed(7);
//! let mut b = EntropyProvider::from_seed(7);
//! assert_eq!(a.gen_u64(), b.gen_u64());
//! assert!(a.gen_range(10) < 10);
//! ```

use std::sync::Mutex;

use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A seedable random number generator.
#[derive(Debug, Clone)]
pub struct EntropyProvider {
    rng: ChaCha8Rng,
}

impl EntropyProvider {
    /// Creates a deterministic provider from `seed`.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        EntropyProvider {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Creates a provider seeded by the operating system.
    #[must_use]
    pub fn from_entropy() -> Self {
        EntropyProvider {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Returns a uniformly distributed `u32`.
    pub fn gen_u32(&mut self) -> u32 {
        self.rng.gen()
    }

    /// Returns a uniformly distributed `u64`.
    pub fn gen_u64(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Returns a value in `0..upper`, or 0 if `upper` is 0.
    pub fn gen_range(&mut self, upper: u32) -> u32 {
        if upper == 0 {
            return 0;
        }
        self.rng.gen_range(0..upper)
    }

    /// Returns true with probability `p`, clamped to `0.0..=1.0`.
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Shuffles `items` in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}

/// A thread-safe, lazily created [`EntropyProvider`].
///
/// Suitable for a `static`: construction is `const` and the generator is created on the
/// first draw.
#[derive(Debug)]
pub struct SharedEntropy {
    seed: Option<u64>,
    inner: Mutex<Option<EntropyProvider>>,
}

impl SharedEntropy {
    /// Creates a shared provider seeded by the operating system on first use.
    #[must_use]
    pub const fn new() -> Self {
        SharedEntropy {
            seed: None,
            inner: Mutex::new(None),
        }
    }

    /// Creates a shared provider seeded with `seed` on first use.
    #[must_use]
    pub const fn with_seed(seed: u64) -> Self {
        SharedEntropy {
            seed: Some(seed),
            inner: Mutex::new(None),
        }
    }

    /// Runs `f` against the provider, creating it first if needed.
    pub fn with<R>(&self, f: impl FnOnce(&mut EntropyProvider) -> R) -> R {
        let seed = self.seed;
        with_lock!(self.inner, |slot: &mut Option<EntropyProvider>| {
            let provider = slot.get_or_insert_with(|| match seed {
                Some(seed) => EntropyProvider::from_seed(seed),
                None => EntropyProvider::from_entropy(),
            });
            f(provider)
        })
    }

    /// Returns a uniformly distributed `u64`.
    pub fn gen_u64(&self) -> u64 {
        self.with(EntropyProvider::gen_u64)
    }

    /// Returns a value in `0..upper`, or 0 if `upper` is 0.
    pub fn gen_range(&self, upper: u32) -> u32 {
        self.with(|rng| rng.gen_range(upper))
    }

    /// Returns true once the provider has been created.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        lock!(self.inner).is_some()
    }
}

impl Default for SharedEntropy {
    fn default() -> Self {
        Self::new()
    }
}
