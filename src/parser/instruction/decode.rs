//! Instruction decoding from binary format

use super::super::limits;
use super::{BlockType, Instruction, InstructionKind, MemArg};
use crate::parser::module::ValueType;
use crate::parser::opcode::{self, *};
use crate::parser::reader::Reader;
use crate::parser::validate::ValidationError;
use crate::parser::ParseError;

const BLOCK_TYPE_EMPTY: u8 = 0x40;

impl MemArg {
    /// Decode a memory argument from the reader
    pub fn decode(reader: &mut Reader) -> Result<Self, ParseError> {
        let align = reader.read_vu32()?;
        let offset = reader.read_vu32()?;
        Ok(MemArg { align, offset })
    }
}

impl BlockType {
    /// Decode a block type from the reader
    pub fn decode(reader: &mut Reader) -> Result<Self, ParseError> {
        let b = reader.peek_byte().ok_or(ParseError::UnexpectedEof)?;
        if b == BLOCK_TYPE_EMPTY {
            reader.read_byte()?;
            Ok(BlockType::Empty)
        } else if let Some(vt) = ValueType::decode(b) {
            reader.read_byte()?;
            Ok(BlockType::Value(vt))
        } else {
            // Not a value type, a non-negative s33 type index
            let type_idx = reader.read_vs33()?;
            if type_idx < 0 {
                return Err(ValidationError::UnknownBlockType.into());
            }
            Ok(BlockType::FuncType(type_idx as u32))
        }
    }
}

fn read_ref_type(reader: &mut Reader) -> Result<ValueType, ParseError> {
    match ValueType::decode(reader.read_byte()?) {
        Some(vt) if vt.is_ref() => Ok(vt),
        _ => Err(ValidationError::MalformedReferenceType.into()),
    }
}

fn read_zero_byte(reader: &mut Reader) -> Result<(), ParseError> {
    match reader.read_byte()? {
        0x00 => Ok(()),
        _ => Err(ValidationError::ZeroByteExpected.into()),
    }
}

impl Instruction {
    /// Decode one instruction from the reader, folding the `0xFC` prefix
    /// into the tag.
    pub fn decode(reader: &mut Reader) -> Result<Self, ParseError> {
        let byte = reader.read_byte()?;
        let tag = if byte == opcode::PREFIX_FC {
            let sub = reader.read_vu32()?;
            if sub > 0xff {
                return Err(ValidationError::UnknownOpcode(0xfcff).into());
            }
            0xfc00 | sub as u16
        } else {
            byte as u16
        };

        use InstructionKind::*;
        let kind = match tag {
            // Control instructions
            BLOCK | LOOP | IF => Block {
                block_type: BlockType::decode(reader)?,
            },
            BR | BR_IF => Br {
                label_idx: reader.read_vu32()?,
            },
            BR_TABLE => {
                let count = reader.read_vu32()?;
                let count =
                    reader.validate_item_count(count, limits::MAX_BR_TABLE_LABELS, 1)?;
                let mut labels = Vec::with_capacity(count);
                for _ in 0..count {
                    labels.push(reader.read_vu32()?);
                }
                let default = reader.read_vu32()?;
                BrTable { labels, default }
            }
            CALL => Call {
                func_idx: reader.read_vu32()?,
            },
            CALL_INDIRECT => CallIndirect {
                type_idx: reader.read_vu32()?,
                table_idx: reader.read_vu32()?,
            },

            // Parametric instructions
            SELECT_T => {
                let count = reader.read_vu32()?;
                let count =
                    reader.validate_item_count(count, limits::MAX_SELECT_TYPED_VALUES, 1)?;
                let mut value_types = Vec::with_capacity(count);
                for _ in 0..count {
                    let b = reader.read_byte()?;
                    value_types
                        .push(ValueType::decode(b).ok_or(ValidationError::InvalidValueType(b))?);
                }
                SelectTyped { value_types }
            }

            // Variable instructions
            LOCAL_GET | LOCAL_SET | LOCAL_TEE => Local {
                local_idx: reader.read_vu32()?,
            },
            GLOBAL_GET | GLOBAL_SET => Global {
                global_idx: reader.read_vu32()?,
            },

            // Table instructions
            TABLE_GET | TABLE_SET | TABLE_SIZE | TABLE_GROW | TABLE_FILL => Table {
                table_idx: reader.read_vu32()?,
            },
            TABLE_INIT => {
                let elem_idx = reader.read_vu32()?;
                let table_idx = reader.read_vu32()?;
                TableInit { elem_idx, table_idx }
            }
            ELEM_DROP => ElemDrop {
                elem_idx: reader.read_vu32()?,
            },
            TABLE_COPY => {
                let dst_table = reader.read_vu32()?;
                let src_table = reader.read_vu32()?;
                TableCopy {
                    dst_table,
                    src_table,
                }
            }

            // Memory instructions
            I32_LOAD..=I64_STORE32 => Memory {
                memarg: MemArg::decode(reader)?,
            },
            MEMORY_SIZE | MEMORY_GROW | MEMORY_FILL => {
                read_zero_byte(reader)?;
                Plain
            }
            MEMORY_COPY => {
                read_zero_byte(reader)?;
                read_zero_byte(reader)?;
                Plain
            }
            MEMORY_INIT => {
                let data_idx = reader.read_vu32()?;
                read_zero_byte(reader)?;
                MemoryInit { data_idx }
            }
            DATA_DROP => DataDrop {
                data_idx: reader.read_vu32()?,
            },

            // Numeric constants
            I32_CONST => I32Const {
                value: reader.read_vs32()?,
            },
            I64_CONST => I64Const {
                value: reader.read_vs64()?,
            },
            F32_CONST => F32Const {
                bits: reader.read_f32_bits()?,
            },
            F64_CONST => F64Const {
                bits: reader.read_f64_bits()?,
            },

            // Reference instructions
            REF_NULL => RefNull {
                ref_type: read_ref_type(reader)?,
            },
            REF_FUNC => RefFunc {
                func_idx: reader.read_vu32()?,
            },

            _ if opcode::is_known(tag) => Plain,
            _ => return Err(ValidationError::UnknownOpcode(tag).into()),
        };

        Ok(Instruction { tag, kind })
    }
}
