//! Instruction representation and decoding
//!
//! Instructions are decoded one at a time straight from the function body
//! bytes. The validator and both linearizer passes walk the same bytes with
//! the same decoder, so they always agree on where each instruction starts.

pub mod decode;

use super::module::ValueType;
use super::opcode;
use std::fmt;

/// Memory argument for memory access instructions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemArg {
    /// Memory alignment (as power of 2)
    pub align: u32,
    /// Memory offset
    pub offset: u32,
}

/// Block type for structured control instructions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockType {
    /// Empty block type (no parameters or results)
    Empty,
    /// Single value type result
    Value(ValueType),
    /// Function type index for multi-value blocks
    FuncType(u32),
}

/// One decoded instruction: its tag plus whatever immediates it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub tag: u16,
    pub kind: InstructionKind,
}

/// Immediates, grouped by shape. The tag tells instructions of the same
/// shape apart (`local.get` and `local.set` are both `Local`).
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    /// No immediates (numeric instructions, `drop`, `return`, ...). Reserved
    /// zero bytes such as the memory index of `memory.size` are consumed.
    Plain,
    /// `block`, `loop`, `if`
    Block { block_type: BlockType },
    /// `br`, `br_if`
    Br { label_idx: u32 },
    BrTable { labels: Vec<u32>, default: u32 },
    Call { func_idx: u32 },
    CallIndirect { type_idx: u32, table_idx: u32 },
    SelectTyped { value_types: Vec<ValueType> },
    /// `local.get`, `local.set`, `local.tee`
    Local { local_idx: u32 },
    /// `global.get`, `global.set`
    Global { global_idx: u32 },
    /// `table.get`, `table.set`, `table.size`, `table.grow`, `table.fill`
    Table { table_idx: u32 },
    /// loads and stores
    Memory { memarg: MemArg },
    MemoryInit { data_idx: u32 },
    DataDrop { data_idx: u32 },
    TableInit { elem_idx: u32, table_idx: u32 },
    ElemDrop { elem_idx: u32 },
    TableCopy { dst_table: u32, src_table: u32 },
    I32Const { value: i32 },
    I64Const { value: i64 },
    /// raw bits, NaN payload preserved
    F32Const { bits: u32 },
    F64Const { bits: u64 },
    RefNull { ref_type: ValueType },
    RefFunc { func_idx: u32 },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", opcode::name(self.tag).unwrap_or("<unknown>"))
    }
}
