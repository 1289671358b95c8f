use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use chanswap_core::{Item, ItemId};

/// Uniform draw of the next active item.
///
/// With two or more items the current one is excluded, so a switch always
/// changes what viewers see. A single item is returned as-is.
pub fn pick_next<R: Rng + ?Sized>(
    items: &[Item],
    current: Option<ItemId>,
    rng: &mut R,
) -> Option<Item> {
    match items {
        [] => None,
        [only] => Some(only.clone()),
        _ => {
            let candidates: Vec<&Item> = items
                .iter()
                .filter(|item| Some(item.id) != current)
                .collect();
            candidates.choose(rng).map(|item| (*item).clone())
        }
    }
}

/// Owns the random source used for channel switches.
pub struct Selector {
    rng: StdRng,
}

impl Selector {
    /// Seeded from the operating system; draws differ from run to run.
    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic sequence, for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn pick_next(&mut self, items: &[Item], current: Option<ItemId>) -> Option<Item> {
        pick_next(items, current, &mut self.rng)
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::from_os_rng()
    }
}
