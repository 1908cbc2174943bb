//! Thread stack and call frames
//!
//! Each script thread owns a fixed-capacity array of 16-bit words. The stack
//! grows downward: the empty stack has `top == capacity`, `push` decrements
//! `top` before storing and `pop` reads before incrementing.
//!
//! # Frame Layout
//!
//! After `CALL` + `ENTER n` the current frame looks like this:
//!
//! ```text
//! index         contents
//! ─────────────────────────────────────────
//! frame + 3..   arguments (first pushed is highest)
//! frame + 2     argument count
//! frame + 1     return offset
//! frame         caller's frame index          ← frame
//! frame - 1     local word 0
//! ...           local words (n / 2 of them)
//! top           operand stack                 ← top
//! ```
//!
//! The stack region addresses bytes relative to `frame * 2`, so locals sit at
//! negative offsets and arguments at positive ones.

use crate::{VmError, VmResult};
use quill_bytecode::Region;

/// Downward-growing word stack with a frame index
#[derive(Debug, Clone)]
pub struct Stack {
    /// Stack slots
    words: Vec<i16>,

    /// Index of the most recently pushed word (`capacity` when empty)
    top: usize,

    /// Index of the current frame's saved-frame word
    frame: usize,
}

impl Stack {
    /// Create an empty stack of `capacity` words
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity],
            top: capacity,
            frame: capacity,
        }
    }

    /// Capacity in words
    #[inline]
    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    /// Number of words currently pushed
    #[inline]
    pub fn pushed_size(&self) -> usize {
        self.capacity() - self.top
    }

    /// Check if the stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.top == self.capacity()
    }

    /// Current top index
    #[inline]
    pub fn top(&self) -> usize {
        self.top
    }

    /// Current frame index
    #[inline]
    pub fn frame(&self) -> usize {
        self.frame
    }

    // ========================================================================
    // Operand Stack Operations
    // ========================================================================

    /// Push a word
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackOverflow` if the stack is full.
    #[inline]
    pub fn push(&mut self, value: i16) -> VmResult<()> {
        if self.top == 0 {
            return Err(VmError::StackOverflow {
                capacity: self.capacity(),
            });
        }
        self.top -= 1;
        self.words[self.top] = value;
        Ok(())
    }

    /// Pop a word
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackUnderflow` if the stack is empty.
    #[inline]
    pub fn pop(&mut self) -> VmResult<i16> {
        if self.top >= self.capacity() {
            return Err(VmError::StackUnderflow);
        }
        let value = self.words[self.top];
        self.top += 1;
        Ok(value)
    }

    /// Read the top word without popping
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackUnderflow` if the stack is empty.
    #[inline]
    pub fn peek(&self) -> VmResult<i16> {
        if self.top >= self.capacity() {
            return Err(VmError::StackUnderflow);
        }
        Ok(self.words[self.top])
    }

    /// Pop and discard `count` words
    pub fn discard(&mut self, count: usize) -> VmResult<()> {
        if count > self.pushed_size() {
            return Err(VmError::StackUnderflow);
        }
        self.top += count;
        Ok(())
    }

    // ========================================================================
    // Call Frame Management
    // ========================================================================

    /// Open a frame: save the caller's frame, point the frame at the new top
    /// and reserve `local_bytes / 2` words of locals
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackOverflow` if the locals do not fit and
    /// `VmError::StackUnderflow` for a negative local size.
    pub fn enter(&mut self, local_bytes: i16) -> VmResult<()> {
        let locals = i32::from(local_bytes) / 2;
        if locals < 0 {
            return Err(VmError::StackUnderflow);
        }
        let locals = locals as usize;

        self.push(self.frame as i16)?;
        self.frame = self.top;
        if locals > self.top {
            return Err(VmError::StackOverflow {
                capacity: self.capacity(),
            });
        }
        self.top -= locals;
        Ok(())
    }

    /// Close the current frame: drop locals and operands above it and restore
    /// the caller's frame index
    pub fn leave(&mut self) -> VmResult<()> {
        self.top = self.frame;
        let saved = self.pop()?;
        match usize::try_from(saved) {
            Ok(frame) if frame <= self.capacity() => {
                self.frame = frame;
                Ok(())
            }
            _ => Err(VmError::AddressOutOfRange {
                region: Region::Stack,
                offset: i32::from(saved),
                len: self.capacity(),
            }),
        }
    }

    // ========================================================================
    // Frame-Relative Byte Access
    // ========================================================================

    fn frame_byte_index(&self, offset: i32) -> VmResult<usize> {
        let index = self.frame as i64 * 2 + i64::from(offset);
        if index < 0 || index >= self.capacity() as i64 * 2 {
            return Err(VmError::AddressOutOfRange {
                region: Region::Stack,
                offset,
                len: self.capacity() * 2,
            });
        }
        Ok(index as usize)
    }

    /// Read the byte at `offset` bytes from the frame
    pub fn frame_byte(&self, offset: i32) -> VmResult<u8> {
        let index = self.frame_byte_index(offset)?;
        Ok(word_byte(self.words[index / 2], index % 2))
    }

    /// Write the byte at `offset` bytes from the frame
    pub fn set_frame_byte(&mut self, offset: i32, value: u8) -> VmResult<()> {
        let index = self.frame_byte_index(offset)?;
        let word = &mut self.words[index / 2];
        *word = with_word_byte(*word, index % 2, value);
        Ok(())
    }

    /// Word at an absolute index, for introspection
    pub fn word(&self, index: usize) -> Option<i16> {
        self.words.get(index).copied()
    }

    /// Pushed words from top to bottom
    pub fn pushed(&self) -> &[i16] {
        &self.words[self.top..]
    }
}

/// Byte `which` (0 = low) of a little-endian word
#[inline]
pub(crate) fn word_byte(word: i16, which: usize) -> u8 {
    word.to_le_bytes()[which]
}

/// `word` with byte `which` replaced
#[inline]
pub(crate) fn with_word_byte(word: i16, which: usize, value: u8) -> i16 {
    let mut bytes = word.to_le_bytes();
    bytes[which] = value;
    i16::from_le_bytes(bytes)
}
