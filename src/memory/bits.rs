//! Block occupancy table
//!
//! One bit per heap block, `true` meaning the block is in use. Bits are packed
//! into `u64` words; only set/clear/test and the two searches the allocator
//! needs are exposed.

const WORD_BITS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitTable {
    words: Vec<u64>,
    len: usize,
    ones: usize,
}

impl BitTable {
    /// Create a table of `len` clear bits
    pub fn new(len: usize) -> Self {
        BitTable {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
            ones: 0,
        }
    }

    /// Number of bits in the table
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        self.ones
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    pub fn set(&mut self, index: usize) {
        let mask = 1u64 << (index % WORD_BITS);
        let word = &mut self.words[index / WORD_BITS];
        if *word & mask == 0 {
            *word |= mask;
            self.ones += 1;
        }
    }

    pub fn clear(&mut self, index: usize) {
        let mask = 1u64 << (index % WORD_BITS);
        let word = &mut self.words[index / WORD_BITS];
        if *word & mask != 0 {
            *word &= !mask;
            self.ones -= 1;
        }
    }

    /// Set every bit in `[start, end)`
    pub fn set_range(&mut self, start: usize, end: usize) {
        for index in start..end {
            self.set(index);
        }
    }

    /// Clear every bit in `[start, end)`
    pub fn clear_range(&mut self, start: usize, end: usize) {
        for index in start..end {
            self.clear(index);
        }
    }

    /// Whether every bit in `[start, end)` is set
    pub fn all_set(&self, start: usize, end: usize) -> bool {
        end <= self.len && (start..end).all(|index| self.get(index))
    }

    /// First clear bit scanning forward from 0
    pub fn first_clear(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)
            .map(|(i, word)| i * WORD_BITS + (!word).trailing_zeros() as usize)
            .filter(|&index| index < self.len)
    }

    /// Highest set bit in the inclusive range `[low, high]`
    pub fn last_set_in(&self, low: usize, high: usize) -> Option<usize> {
        if low > high || high >= self.len {
            return None;
        }

        let mut word_index = high / WORD_BITS;
        let low_word = low / WORD_BITS;

        loop {
            let mut word = self.words[word_index];

            // Mask off bits above `high` in the first word and below `low` in the last
            if word_index == high / WORD_BITS {
                let shift = WORD_BITS - 1 - high % WORD_BITS;
                word &= u64::MAX >> shift;
            }
            if word_index == low_word {
                word &= u64::MAX << (low % WORD_BITS);
            }

            if word != 0 {
                let offset = WORD_BITS - 1 - word.leading_zeros() as usize;
                return Some(word_index * WORD_BITS + offset);
            }

            if word_index == low_word {
                return None;
            }
            word_index -= 1;
        }
    }

    /// Length of the longest run of clear bits
    pub fn longest_clear_run(&self) -> usize {
        let mut longest = 0;
        let mut current = 0;
        for index in 0..self.len {
            if self.get(index) {
                current = 0;
            } else {
                current += 1;
                longest = longest.max(current);
            }
        }
        longest
    }
}
