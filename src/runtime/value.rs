//! WebAssembly value representation

use crate::parser::module::ValueType;
use fhex::ToHex;
use std::fmt;

/// Slot encoding of a null reference.
pub const NULL_REF: u64 = 0;

/// Runtime representation of WebAssembly values
///
/// Equality is by bit pattern, so two NaNs with the same payload compare
/// equal.
#[derive(Debug, Clone, Copy)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    FuncRef(Option<u32>),
    ExternRef(Option<u32>),
}

/// Canonical quiet NaN for f32 with the sign of `bits`.
#[inline]
pub fn canonical_f32(bits: u32) -> u32 {
    if bits & 0x7fff_ffff > 0x7f80_0000 {
        (bits & 0x8000_0000) | 0x7fc0_0000
    } else {
        bits
    }
}

/// Canonical quiet NaN for f64 with the sign of `bits`.
#[inline]
pub fn canonical_f64(bits: u64) -> u64 {
    if bits & 0x7fff_ffff_ffff_ffff > 0x7ff0_0000_0000_0000 {
        (bits & 0x8000_0000_0000_0000) | 0x7ff8_0000_0000_0000
    } else {
        bits
    }
}

#[inline]
pub(crate) fn ref_to_slot(r: Option<u32>) -> u64 {
    match r {
        Some(index) => index as u64 + 1,
        None => NULL_REF,
    }
}

#[inline]
pub(crate) fn slot_to_ref(slot: u64) -> Option<u32> {
    if slot == NULL_REF {
        None
    } else {
        Some((slot - 1) as u32)
    }
}

impl Value {
    /// The null reference of a reference type.
    pub fn null(ref_type: ValueType) -> Value {
        match ref_type {
            ValueType::ExternRef => Value::ExternRef(None),
            _ => Value::FuncRef(None),
        }
    }

    /// The zero value of a type, used for fresh locals.
    pub fn default_for(value_type: ValueType) -> Value {
        match value_type {
            ValueType::I32 => Value::I32(0),
            ValueType::I64 => Value::I64(0),
            ValueType::F32 => Value::F32(0.0),
            ValueType::F64 => Value::F64(0.0),
            ValueType::FuncRef => Value::FuncRef(None),
            ValueType::ExternRef => Value::ExternRef(None),
        }
    }

    /// Get the WebAssembly type of this value
    pub fn typ(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::FuncRef(_) => ValueType::FuncRef,
            Value::ExternRef(_) => ValueType::ExternRef,
        }
    }

    /// Untagged stack slot. Floats entering the machine are canonicalised.
    pub fn to_slot(&self) -> u64 {
        match *self {
            Value::I32(v) => v as u32 as u64,
            Value::I64(v) => v as u64,
            Value::F32(v) => canonical_f32(v.to_bits()) as u64,
            Value::F64(v) => canonical_f64(v.to_bits()),
            Value::FuncRef(r) | Value::ExternRef(r) => ref_to_slot(r),
        }
    }

    /// Rebuild a value from a slot, given the type the validator proved.
    pub fn from_slot(value_type: ValueType, slot: u64) -> Value {
        match value_type {
            ValueType::I32 => Value::I32(slot as u32 as i32),
            ValueType::I64 => Value::I64(slot as i64),
            ValueType::F32 => Value::F32(f32::from_bits(slot as u32)),
            ValueType::F64 => Value::F64(f64::from_bits(slot)),
            ValueType::FuncRef => Value::FuncRef(slot_to_ref(slot)),
            ValueType::ExternRef => Value::ExternRef(slot_to_ref(slot)),
        }
    }

    /// Convert to i32, returning None if wrong type
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to i64, returning None if wrong type
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to f32, returning None if wrong type
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to f64, returning None if wrong type
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::FuncRef(None) | Value::ExternRef(None))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::FuncRef(a), Value::FuncRef(b)) => a == b,
            (Value::ExternRef(a), Value::ExternRef(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "i32:{v}"),
            Value::I64(v) => write!(f, "i64:{v}"),
            Value::F32(v) => write!(f, "f32:{}", v.to_hex()),
            Value::F64(v) => write!(f, "f64:{}", v.to_hex()),
            Value::FuncRef(Some(i)) => write!(f, "funcref:{i}"),
            Value::ExternRef(Some(i)) => write!(f, "externref:{i}"),
            Value::FuncRef(None) | Value::ExternRef(None) => write!(f, "ref.null"),
        }
    }
}
