//! The tiled bitmap ("form") produced by the form generator, and the
//! tagged sentinel type that replaces the C implementation's
//! `InvalidForm`/`DeferredForm`/`FormLevelIsUsed` pointer aliases.

use crate::types::BlitWord;

/// A tiled bitmap of one specific tint of one specific screen.
///
/// The buffer is blit-word aligned so the blit engine can load/store
/// whole words instead of individual bytes. Memory for `buffer` is
/// always sized to belong to exactly one [`crate::form_class::FormClass`];
/// moving a `Form` between a screen's levels array and the class free
/// chain never reallocates it.
#[derive(Debug)]
pub struct Form {
    pub width: u32,
    pub height: u32,
    /// Bytes per scanline, rounded up to a whole number of [`BlitWord`]s.
    pub line_bytes: u32,
    /// Total size of `buffer` in bytes (`line_bytes * height`).
    pub size: usize,
    pub buffer: Vec<BlitWord>,
    /// Whether `buffer` currently holds valid tiled contents. Forms
    /// pulled fresh from a class free chain start `false`; the
    /// generator sets this once `init_form`/`regenerate_form` has
    /// filled them in. Corresponds to the C `hoff == HT_FORM_INITED`
    /// flag, but kept as its own field instead of being overlaid on
    /// another field.
    pub initialized: bool,
}

impl Form {
    /// Allocate a zeroed form buffer of the given pixel dimensions for
    /// a form class whose cell is `line_bytes` wide.
    pub fn new(width: u32, height: u32, line_bytes: u32) -> Self {
        let words_per_line = (line_bytes as usize + std::mem::size_of::<BlitWord>() - 1)
            / std::mem::size_of::<BlitWord>();
        let size = words_per_line * std::mem::size_of::<BlitWord>() * height as usize;

        Self {
            width,
            height,
            line_bytes,
            size,
            buffer: vec![0 as BlitWord; words_per_line * height as usize],
            initialized: false,
        }
    }

    pub fn words_per_line(&self) -> usize {
        self.buffer.len() / self.height.max(1) as usize
    }

    /// Fill the entire form with an all-zero (white, for additive
    /// output) pedestal. Used by `init_form`/`regenerate_form` for the
    /// `area0fill` case.
    pub fn fill_zero(&mut self) {
        self.buffer.iter_mut().for_each(|w| *w = 0);
    }

    /// Fill the entire form with an all-one (black) pedestal. Used for
    /// the `area1fill` case.
    pub fn fill_one(&mut self) {
        self.buffer.iter_mut().for_each(|w| *w = BlitWord::MAX);
    }

    /// Fill with a repeating byte pattern, used for multibit pedestal
    /// depths between pure black and pure white.
    pub fn fill_pattern(&mut self, byte: u8) {
        let word = BlitWord::from_ne_bytes(
            [byte; std::mem::size_of::<BlitWord>()]
                .as_slice()
                .try_into()
                .unwrap(),
        );
        self.buffer.iter_mut().for_each(|w| *w = word);
    }

    /// Toggle (XOR) the bit at `(x, y)` within the form. Used by
    /// `set_cell_bits` callers to flip individual dot-sites when
    /// moving between adjacent tint levels.
    pub fn toggle_bit(&mut self, x: u32, y: u32) {
        let idx = self.bit_location(x, y);
        self.buffer[idx.0] ^= 1 << idx.1;
    }

    /// Force the bit at `(x, y)` to 1, regardless of its current state.
    pub fn set_bit(&mut self, x: u32, y: u32) {
        let idx = self.bit_location(x, y);
        self.buffer[idx.0] |= 1 << idx.1;
    }

    /// Force the bit at `(x, y)` to 0, regardless of its current state.
    pub fn clear_bit(&mut self, x: u32, y: u32) {
        let idx = self.bit_location(x, y);
        self.buffer[idx.0] &= !(1 << idx.1);
    }

    /// `(word_index, bit_in_word)` for pixel `(x, y)`.
    fn bit_location(&self, x: u32, y: u32) -> (usize, u32) {
        let bit_index = x as usize;
        let word_index = bit_index / BlitWord::BITS as usize;
        let bit_in_word = (bit_index % BlitWord::BITS as usize) as u32;
        let words_per_line = self.words_per_line();
        (y as usize * words_per_line + word_index, bit_in_word)
    }

    pub fn get_bit(&self, x: u32, y: u32) -> bool {
        let (word, bit) = self.bit_location(x, y);
        (self.buffer[word] >> bit) & 1 != 0
    }
}

/// The contents of one slot of a screen's per-DL levels array.
///
/// Replaces the C `FORM*` sentinel pointers (`NULL`, `INVALID_FORM`,
/// `DEFERRED_FORM`) with an explicit enum, per REDESIGN FLAGS.
#[derive(Debug, Default)]
pub enum FormSlot {
    /// The tint has not been touched by any blit on this DL.
    #[default]
    Empty,
    /// The tint has been used but no form has been allocated for it
    /// yet (front-end marking, or a failed allocation under memory
    /// pressure).
    InvalidMarker,
    /// The tint has been used and allocation was explicitly deferred
    /// (see `defer_allocation`/`resume_allocation`).
    DeferredMarker,
    /// A real, generated form.
    Form(Box<Form>),
}

impl FormSlot {
    pub fn is_real(&self) -> bool {
        matches!(self, FormSlot::Form(_))
    }

    pub fn is_used(&self) -> bool {
        !matches!(self, FormSlot::Empty)
    }

    pub fn as_form(&self) -> Option<&Form> {
        match self {
            FormSlot::Form(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_form_mut(&mut self) -> Option<&mut Form> {
        match self {
            FormSlot::Form(f) => Some(f),
            _ => None,
        }
    }

    /// Take the real form out of this slot, leaving `Empty` behind.
    /// Used when returning a form to a class free chain.
    pub fn take_form(&mut self) -> Option<Box<Form>> {
        match std::mem::take(self) {
            FormSlot::Form(f) => Some(f),
            other => {
                *self = other;
                None
            }
        }
    }
}
