use crate::{Error, Result};

/// Round-robin cursor over a non-empty token list.
///
/// The cycle count increases each time the cursor comes back to where it
/// stood at the last reset, so a non-zero count means every token has been
/// offered once since then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclicIterator {
    tokens: Vec<String>,
    index: usize,
    origin: usize,
    cycle_count: usize,
}

impl CyclicIterator {
    pub fn new(tokens: Vec<String>) -> Result<Self> {
        if tokens.is_empty() {
            return Err(Error::DictionaryEmpty("cyclic iterator".into()));
        }
        Ok(Self {
            tokens,
            index: 0,
            origin: 0,
            cycle_count: 0,
        })
    }

    /// Returns the token under the cursor and advances, wrapping at the end.
    pub fn next_token(&mut self) -> &str {
        let current = self.index;
        self.index = (self.index + 1) % self.tokens.len();
        if self.index == self.origin {
            self.cycle_count += 1;
        }
        &self.tokens[current]
    }

    pub fn cycle_count(&self) -> usize {
        self.cycle_count
    }

    /// Zeroes the cycle count and starts the next cycle at the current
    /// position, which is kept.
    pub fn reset_cycle_count(&mut self) {
        self.cycle_count = 0;
        self.origin = self.index;
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
