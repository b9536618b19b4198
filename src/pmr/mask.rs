use smallvec::SmallVec;

const BITS: usize = 64;

/// The set of sites flipped by a permutation operator, stored as packed
/// 64-bit blocks. Doubles as a GF(2) vector for closure checks and the
/// cycle-basis computation: composing permutations is block-wise XOR.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FlipMask {
    blocks: SmallVec<[u64; 1]>,
}

impl FlipMask {
    /// The empty mask over `len` sites.
    pub fn empty(len: usize) -> Self {
        let nblocks = (len + BITS - 1) / BITS;
        Self {
            blocks: std::iter::repeat(0).take(nblocks.max(1)).collect(),
        }
    }

    /// Build a mask over `len` sites from the given site indices.
    pub fn from_sites<I: IntoIterator<Item = usize>>(len: usize, sites: I) -> Self {
        let mut mask = Self::empty(len);
        for site in sites {
            mask.set(site);
        }
        mask
    }

    /// Set one site.
    pub fn set(&mut self, site: usize) {
        self.blocks[site / BITS] |= 1u64 << (site % BITS);
    }

    /// Check whether `site` is in the mask.
    pub fn get(&self, site: usize) -> bool {
        let block = site / BITS;
        block < self.blocks.len() && (self.blocks[block] >> (site % BITS)) & 1 == 1
    }

    /// XOR another mask into this one (permutation composition).
    pub fn xor_assign(&mut self, other: &FlipMask) {
        debug_assert_eq!(self.blocks.len(), other.blocks.len());
        for (a, b) in self.blocks.iter_mut().zip(other.blocks.iter()) {
            *a ^= *b;
        }
    }

    /// True for the identity permutation.
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| *b == 0)
    }

    /// Number of sites in the mask.
    pub fn weight(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// The lowest site in the mask, if any.
    pub fn first_site(&self) -> Option<usize> {
        self.blocks
            .iter()
            .enumerate()
            .find(|(_, b)| **b != 0)
            .map(|(i, b)| i * BITS + b.trailing_zeros() as usize)
    }

    /// Flip every masked site of `state`.
    pub fn apply(&self, state: &mut [bool]) {
        for site in self.iter_sites() {
            state[site] = !state[site];
        }
    }

    /// Iterate over the sites in the mask, ascending.
    pub fn iter_sites(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks.iter().enumerate().flat_map(|(i, block)| {
            let mut bits = *block;
            std::iter::from_fn(move || {
                if bits == 0 {
                    None
                } else {
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some(i * BITS + tz)
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_iter() {
        let mask = FlipMask::from_sites(130, [0, 63, 64, 129]);
        assert!(mask.get(0) && mask.get(63) && mask.get(64) && mask.get(129));
        assert!(!mask.get(1) && !mask.get(128));
        assert_eq!(mask.iter_sites().collect::<Vec<_>>(), vec![0, 63, 64, 129]);
        assert_eq!(mask.weight(), 4);
        assert_eq!(mask.first_site(), Some(0));
    }

    #[test]
    fn xor_is_involution() {
        let a = FlipMask::from_sites(70, [3, 65]);
        let mut b = a.clone();
        b.xor_assign(&a);
        assert!(b.is_empty());
        assert_eq!(b.first_site(), None);
    }

    #[test]
    fn apply_flips() {
        let mask = FlipMask::from_sites(4, [1, 3]);
        let mut state = vec![false; 4];
        mask.apply(&mut state);
        assert_eq!(state, vec![false, true, false, true]);
        mask.apply(&mut state);
        assert_eq!(state, vec![false; 4]);
    }
}
