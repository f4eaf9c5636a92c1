use serde::{Deserialize, Serialize};

/// Green-screen classifier.
///
/// A pixel is background when its green channel is above `min_green` and beats
/// both red and blue by more than `margin`. Background pixels get alpha 0; every
/// other byte of the buffer is left untouched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChromaKey {
    pub min_green: u8,
    pub margin: u8,
}

impl ChromaKey {
    pub const GREEN_SCREEN: Self = Self {
        min_green: 100,
        margin: 50,
    };

    #[inline]
    pub fn is_background(&self, r: u8, g: u8, b: u8) -> bool {
        let g = u16::from(g);
        let margin = u16::from(self.margin);
        g > u16::from(self.min_green) && g > u16::from(r) + margin && g > u16::from(b) + margin
    }

    /// Key a tightly packed RGBA8 buffer in place. Returns the number of pixels made transparent.
    pub fn apply(&self, rgba: &mut [u8]) -> usize {
        let mut keyed = 0;
        for px in rgba.chunks_exact_mut(4) {
            if self.is_background(px[0], px[1], px[2]) {
                px[3] = 0;
                keyed += 1;
            }
        }
        keyed
    }
}

impl Default for ChromaKey {
    fn default() -> Self {
        Self::GREEN_SCREEN
    }
}
