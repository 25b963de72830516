//! WebAssembly value stack implementation
//!
//! One flat stack of untagged 64-bit slots holds every frame's locals and
//! operands. Types are not stored: validated code never reads a slot as the
//! wrong type.

use super::value::{canonical_f32, canonical_f64};
use super::RuntimeError;

#[derive(Debug, Default)]
pub struct Stack {
    slots: Vec<u64>,
}

impl Stack {
    pub fn new() -> Self {
        Stack { slots: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Stack {
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Push a raw slot
    #[inline]
    pub fn push(&mut self, slot: u64) {
        self.slots.push(slot);
    }

    #[inline]
    pub fn push_i32(&mut self, v: i32) {
        self.slots.push(v as u32 as u64);
    }

    #[inline]
    pub fn push_i64(&mut self, v: i64) {
        self.slots.push(v as u64);
    }

    #[inline]
    pub fn push_f32(&mut self, v: f32) {
        self.slots.push(canonical_f32(v.to_bits()) as u64);
    }

    #[inline]
    pub fn push_f64(&mut self, v: f64) {
        self.slots.push(canonical_f64(v.to_bits()));
    }

    /// Pop a raw slot
    #[inline]
    pub fn pop(&mut self) -> Result<u64, RuntimeError> {
        self.slots.pop().ok_or(RuntimeError::StackUnderflow)
    }

    #[inline]
    pub fn pop_i32(&mut self) -> Result<i32, RuntimeError> {
        Ok(self.pop()? as u32 as i32)
    }

    #[inline]
    pub fn pop_u32(&mut self) -> Result<u32, RuntimeError> {
        Ok(self.pop()? as u32)
    }

    #[inline]
    pub fn pop_i64(&mut self) -> Result<i64, RuntimeError> {
        Ok(self.pop()? as i64)
    }

    #[inline]
    pub fn pop_f32(&mut self) -> Result<f32, RuntimeError> {
        Ok(f32::from_bits(self.pop()? as u32))
    }

    #[inline]
    pub fn pop_f64(&mut self) -> Result<f64, RuntimeError> {
        Ok(f64::from_bits(self.pop()?))
    }

    #[inline]
    pub fn get(&self, index: usize) -> Result<u64, RuntimeError> {
        self.slots
            .get(index)
            .copied()
            .ok_or(RuntimeError::StackUnderflow)
    }

    #[inline]
    pub fn set(&mut self, index: usize, slot: u64) -> Result<(), RuntimeError> {
        let s = self
            .slots
            .get_mut(index)
            .ok_or(RuntimeError::StackUnderflow)?;
        *s = slot;
        Ok(())
    }

    #[inline]
    pub fn peek(&self) -> Result<u64, RuntimeError> {
        self.slots.last().copied().ok_or(RuntimeError::StackUnderflow)
    }

    /// Push `count` zero slots (fresh locals).
    pub fn push_zeros(&mut self, count: usize) {
        self.slots.resize(self.slots.len() + count, 0);
    }

    /// Move the top `keep` slots down to `dest` and drop everything above.
    pub fn unwind(&mut self, dest: usize, keep: usize) -> Result<(), RuntimeError> {
        let len = self.slots.len();
        if keep > len || dest > len - keep {
            return Err(RuntimeError::StackUnderflow);
        }
        let src = len - keep;
        if src != dest {
            self.slots.copy_within(src..len, dest);
        }
        self.slots.truncate(dest + keep);
        Ok(())
    }

    /// The top `count` slots, oldest first.
    pub fn top(&self, count: usize) -> Result<&[u64], RuntimeError> {
        let len = self.slots.len();
        if count > len {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(&self.slots[len - count..])
    }

    pub fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
