//! WebAssembly table implementation
//!
//! Tables are typed vectors of references. Slots hold the same encoding as
//! the value stack (`NULL_REF` or index + 1), so `table.get` and `table.set`
//! move slots without conversion.
//!
//! Tables are security-critical because they enable indirect function calls:
//! `call_indirect` must trap on an empty slot or a signature mismatch rather
//! than call through.

use super::value::{slot_to_ref, NULL_REF};
use super::{RuntimeError, TrapKind};
use crate::parser::limits::MAX_TABLE_SIZE;
use crate::parser::module::{TableType, ValueType};

const OUT_OF_BOUNDS: RuntimeError = RuntimeError::Trap(TrapKind::TableOutOfBounds);

#[derive(Debug)]
pub struct Table {
    ref_type: ValueType,
    elements: Vec<u64>,
    max: Option<u32>,
}

impl Table {
    /// A table of `limits.min` null references.
    pub fn new(table_type: TableType) -> Result<Self, RuntimeError> {
        let initial = table_type.limits.min;
        if initial > MAX_TABLE_SIZE {
            return Err(RuntimeError::Misuse(format!(
                "table size {initial} exceeds {MAX_TABLE_SIZE}"
            )));
        }
        Ok(Table {
            ref_type: table_type.ref_type,
            elements: vec![NULL_REF; initial as usize],
            max: table_type.limits.max,
        })
    }

    pub fn ref_type(&self) -> ValueType {
        self.ref_type
    }

    pub fn size(&self) -> u32 {
        self.elements.len() as u32
    }

    pub fn get(&self, index: u32) -> Result<u64, RuntimeError> {
        self.elements
            .get(index as usize)
            .copied()
            .ok_or(OUT_OF_BOUNDS)
    }

    pub fn set(&mut self, index: u32, slot: u64) -> Result<(), RuntimeError> {
        let elem = self
            .elements
            .get_mut(index as usize)
            .ok_or(OUT_OF_BOUNDS)?;
        *elem = slot;
        Ok(())
    }

    /// Resolve a slot for `call_indirect`.
    pub fn function_at(&self, index: u32) -> Result<u32, RuntimeError> {
        let slot = self
            .elements
            .get(index as usize)
            .copied()
            .ok_or(RuntimeError::Trap(TrapKind::UndefinedElement))?;
        slot_to_ref(slot).ok_or(RuntimeError::Trap(TrapKind::UninitializedElement))
    }

    /// Grow by `delta` slots set to `init`.
    ///
    /// Returns the previous size, or -1 past the maximum.
    pub fn grow(&mut self, delta: u32, init: u64) -> i32 {
        let current = self.size();
        let Some(new_size) = current.checked_add(delta) else {
            return -1;
        };
        if new_size > self.max.unwrap_or(MAX_TABLE_SIZE).min(MAX_TABLE_SIZE) {
            return -1;
        }
        if self.elements.try_reserve_exact(delta as usize).is_err() {
            return -1;
        }
        self.elements.resize(new_size as usize, init);
        current as i32
    }

    fn range(&self, start: u32, len: u32) -> Result<std::ops::Range<usize>, RuntimeError> {
        let end = start as u64 + len as u64;
        if end > self.elements.len() as u64 {
            return Err(OUT_OF_BOUNDS);
        }
        Ok(start as usize..end as usize)
    }

    /// `table.fill`
    pub fn fill(&mut self, start: u32, slot: u64, len: u32) -> Result<(), RuntimeError> {
        let range = self.range(start, len)?;
        self.elements[range].fill(slot);
        Ok(())
    }

    /// `table.copy` within this table; the ranges may overlap.
    pub fn copy(&mut self, dst: u32, src: u32, len: u32) -> Result<(), RuntimeError> {
        let src = self.range(src, len)?;
        let dst = self.range(dst, len)?;
        self.elements.copy_within(src, dst.start);
        Ok(())
    }

    /// `table.init` from an element segment's evaluated slots.
    pub fn init(&mut self, dst: u32, segment: &[u64], src: u32, len: u32) -> Result<(), RuntimeError> {
        let end = src as u64 + len as u64;
        if end > segment.len() as u64 {
            return Err(OUT_OF_BOUNDS);
        }
        let dst = self.range(dst, len)?;
        self.elements[dst].copy_from_slice(&segment[src as usize..end as usize]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::module::Limits;

    fn table(min: u32, max: Option<u32>) -> Table {
        Table::new(TableType {
            ref_type: ValueType::FuncRef,
            limits: Limits { min, max },
        })
        .unwrap()
    }

    const TRAP: RuntimeError = RuntimeError::Trap(TrapKind::TableOutOfBounds);

    #[test]
    fn test_table_creation() {
        let t = table(10, Some(100));
        assert_eq!(t.size(), 10);
        assert_eq!(t.ref_type(), ValueType::FuncRef);
        assert_eq!(t.get(0).unwrap(), NULL_REF);
        assert_eq!(t.get(10), Err(TRAP));
    }

    #[test]
    fn test_get_set() {
        let mut t = table(2, None);
        t.set(1, 6).unwrap();
        assert_eq!(t.get(1).unwrap(), 6);
        assert_eq!(t.set(2, 1), Err(TRAP));
    }

    #[test]
    fn test_function_at() {
        let mut t = table(2, None);
        t.set(0, 4).unwrap();
        assert_eq!(t.function_at(0).unwrap(), 3);
        assert_eq!(
            t.function_at(1),
            Err(RuntimeError::Trap(TrapKind::UninitializedElement))
        );
        assert_eq!(
            t.function_at(2),
            Err(RuntimeError::Trap(TrapKind::UndefinedElement))
        );
    }

    #[test]
    fn test_grow() {
        let mut t = table(1, Some(3));
        assert_eq!(t.grow(2, 9), 1);
        assert_eq!(t.size(), 3);
        assert_eq!(t.get(2).unwrap(), 9);
        assert_eq!(t.grow(1, 0), -1);
        assert_eq!(t.size(), 3);
        assert_eq!(t.grow(0, 0), 3);

        let mut t = table(0, None);
        assert_eq!(t.grow(u32::MAX, 0), -1);
    }

    #[test]
    fn test_fill_copy_init() {
        let mut t = table(5, None);
        t.fill(1, 2, 3).unwrap();
        assert_eq!(t.elements, vec![0, 2, 2, 2, 0]);
        assert_eq!(t.fill(4, 2, 2), Err(TRAP));

        t.init(0, &[7, 8, 9], 1, 2).unwrap();
        assert_eq!(t.elements, vec![8, 9, 2, 2, 0]);
        assert_eq!(t.init(0, &[7, 8, 9], 2, 2), Err(TRAP));

        t.copy(1, 0, 4).unwrap();
        assert_eq!(t.elements, vec![8, 8, 9, 2, 2]);
        assert_eq!(t.copy(0, 3, 3), Err(TRAP));

        // zero-length at the end is in bounds
        t.copy(5, 5, 0).unwrap();
        assert_eq!(t.fill(6, 0, 0), Err(TRAP));
    }
}
