//! Bytecode linearizer.
//!
//! Turns a validated function body into a flat stream the executor can run
//! without a control stack. Every tag is a little-endian `u16`, immediates
//! are fixed-width little-endian, and every branch carries its absolute
//! target offset together with the number of values to keep and the stack
//! height to unwind to.
//!
//! | tag                      | immediates                                          |
//! |--------------------------|-----------------------------------------------------|
//! | `if`                     | else-arm (or end) offset                            |
//! | `else`                   | end offset                                          |
//! | `br`, `br_if`            | target, keep, height                                |
//! | `br_table`               | count, keep, (count + 1) x (target, height)         |
//! | `call`                   | function index                                      |
//! | `call_indirect`          | type index, table index                             |
//! | loads and stores         | offset                                              |
//! | `i64.const`, `f64.const` | 8 bytes                                             |
//! | other constants, indices | 4 bytes each                                        |
//!
//! `block`, `loop`, `nop` and every `end` except the last emit nothing. Heights
//! are measured from the frame base, so they already include params and locals.
//!
//! The first pass sizes the output and resolves every label to an offset; the
//! second pass writes into a buffer of exactly that size.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use std::fmt::Write;

use super::instruction::{Instruction, InstructionKind};
use super::opcode::{self, *};
use super::reader::Reader;
use super::validate::{FunctionAnalysis, ValidationError};
use super::ParseError;

trait Sink {
    fn pos(&self) -> u32;
    fn put_u16(&mut self, v: u16);
    fn put_u32(&mut self, v: u32);
    fn put_u64(&mut self, v: u64);
}

/// Counts bytes without storing them.
#[derive(Default)]
struct Sizer {
    len: u32,
}

impl Sink for Sizer {
    fn pos(&self) -> u32 {
        self.len
    }

    fn put_u16(&mut self, _: u16) {
        self.len += 2;
    }

    fn put_u32(&mut self, _: u32) {
        self.len += 4;
    }

    fn put_u64(&mut self, _: u64) {
        self.len += 8;
    }
}

impl Sink for Vec<u8> {
    fn pos(&self) -> u32 {
        self.len() as u32
    }

    fn put_u16(&mut self, v: u16) {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, v);
        self.extend_from_slice(&buf);
    }

    fn put_u32(&mut self, v: u32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, v);
        self.extend_from_slice(&buf);
    }

    fn put_u64(&mut self, v: u64) {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, v);
        self.extend_from_slice(&buf);
    }
}

fn internal(msg: &str) -> ParseError {
    ValidationError::Internal(msg.to_string()).into()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LabelKind {
    Function,
    /// `block` and `if`: resolved at `end`
    Block,
    Loop,
}

/// A label under construction.
struct Ctl {
    kind: LabelKind,
    /// slot a branch to this label jumps to
    label: usize,
    /// for `if`, the slot the false condition jumps to
    else_slot: Option<usize>,
    /// index into `FunctionAnalysis::blocks`
    block: usize,
}

/// Target slots, indexed by allocation order. Pass 1 fills them in, pass 2
/// allocates in the same order and checks it lands on the same offsets.
struct Slots {
    offsets: Vec<Option<u32>>,
    frozen: bool,
    next: usize,
}

impl Slots {
    fn alloc(&mut self) -> Result<usize, ParseError> {
        let id = self.next;
        self.next += 1;
        if self.frozen {
            if id >= self.offsets.len() {
                return Err(internal("slot allocated in emission pass only"));
            }
        } else {
            self.offsets.push(None);
        }
        Ok(id)
    }

    fn resolve(&mut self, id: usize, pos: u32) -> Result<(), ParseError> {
        let slot = self
            .offsets
            .get_mut(id)
            .ok_or_else(|| internal("unknown slot"))?;
        if self.frozen {
            if *slot != Some(pos) {
                return Err(internal("label moved between passes"));
            }
        } else {
            *slot = Some(pos);
        }
        Ok(())
    }

    fn target(&self, id: usize) -> Result<u32, ParseError> {
        match self.offsets.get(id).copied().flatten() {
            Some(pos) => Ok(pos),
            // forward label in the sizing pass; only the width matters
            None if !self.frozen => Ok(0),
            None => Err(internal("unresolved label")),
        }
    }
}

struct Walker<'a, S: Sink> {
    analysis: &'a FunctionAnalysis,
    slots: Slots,
    ctls: Vec<Ctl>,
    next_block: usize,
    out: S,
}

impl<'a, S: Sink> Walker<'a, S> {
    fn new(analysis: &'a FunctionAnalysis, slots: Slots, out: S) -> Self {
        Walker {
            analysis,
            slots,
            ctls: vec![],
            next_block: 0,
            out,
        }
    }

    fn open(&mut self, kind: LabelKind, with_else: bool) -> Result<(), ParseError> {
        let label = self.slots.alloc()?;
        let else_slot = if with_else {
            Some(self.slots.alloc()?)
        } else {
            None
        };
        if self.next_block >= self.analysis.blocks.len() {
            return Err(internal("more blocks than the validator saw"));
        }
        self.ctls.push(Ctl {
            kind,
            label,
            else_slot,
            block: self.next_block,
        });
        self.next_block += 1;
        Ok(())
    }

    /// (target slot, keep, absolute height) for a branch `depth` labels out.
    fn branch(&self, depth: u32) -> Result<(usize, u32, u32), ParseError> {
        let index = self
            .ctls
            .len()
            .checked_sub(depth as usize + 1)
            .ok_or_else(|| internal("branch depth out of range"))?;
        let ctl = &self.ctls[index];
        let block = self.analysis.blocks[ctl.block];
        Ok((
            ctl.label,
            block.label_arity,
            self.analysis.locals_count + block.height,
        ))
    }

    fn walk(&mut self, code: &[u8]) -> Result<(), ParseError> {
        let mut reader = Reader::new(code);
        self.open(LabelKind::Function, false)?;

        while !reader.is_empty() {
            let inst = Instruction::decode(&mut reader)?;
            if self.step(&inst)? {
                if !reader.is_empty() {
                    return Err(ValidationError::TrailingBytes.into());
                }
                return Ok(());
            }
        }
        Err(ValidationError::MissingEnd.into())
    }

    /// Emit one instruction; `true` once the function's final `end` is out.
    fn step(&mut self, inst: &Instruction) -> Result<bool, ParseError> {
        use InstructionKind as K;

        match (inst.tag, &inst.kind) {
            (NOP, _) => {}

            (BLOCK, _) => self.open(LabelKind::Block, false)?,

            (LOOP, _) => {
                self.open(LabelKind::Loop, false)?;
                let label = self.ctls[self.ctls.len() - 1].label;
                self.slots.resolve(label, self.out.pos())?;
            }

            (IF, _) => {
                self.open(LabelKind::Block, true)?;
                let ctl = &self.ctls[self.ctls.len() - 1];
                let else_slot = ctl.else_slot.ok_or_else(|| internal("if without else slot"))?;
                self.out.put_u16(IF);
                let target = self.slots.target(else_slot)?;
                self.out.put_u32(target);
            }

            (ELSE, _) => {
                let ctl = self.ctls.last().ok_or_else(|| internal("else outside if"))?;
                let (label, else_slot) = (ctl.label, ctl.else_slot);
                let else_slot = else_slot.ok_or_else(|| internal("else outside if"))?;
                self.out.put_u16(ELSE);
                let target = self.slots.target(label)?;
                self.out.put_u32(target);
                self.slots.resolve(else_slot, self.out.pos())?;
                // consumed; `end` must not resolve it again
                if let Some(ctl) = self.ctls.last_mut() {
                    ctl.else_slot = None;
                }
            }

            (END, _) => {
                let ctl = self.ctls.pop().ok_or_else(|| internal("unbalanced end"))?;
                let pos = self.out.pos();
                if let Some(else_slot) = ctl.else_slot {
                    self.slots.resolve(else_slot, pos)?;
                }
                match ctl.kind {
                    // a loop label was resolved at its header
                    LabelKind::Loop => {}
                    LabelKind::Block => self.slots.resolve(ctl.label, pos)?,
                    LabelKind::Function => {
                        // branches to the function label land on the final end
                        self.slots.resolve(ctl.label, pos)?;
                        self.out.put_u16(END);
                        return Ok(true);
                    }
                }
            }

            (BR | BR_IF, K::Br { label_idx }) => {
                let (slot, keep, height) = self.branch(*label_idx)?;
                self.out.put_u16(inst.tag);
                let target = self.slots.target(slot)?;
                self.out.put_u32(target);
                self.out.put_u32(keep);
                self.out.put_u32(height);
            }

            (BR_TABLE, K::BrTable { labels, default }) => {
                let (_, keep, _) = self.branch(*default)?;
                self.out.put_u16(BR_TABLE);
                self.out.put_u32(labels.len() as u32);
                self.out.put_u32(keep);
                for label in labels.iter().chain(std::iter::once(default)) {
                    let (slot, _, height) = self.branch(*label)?;
                    let target = self.slots.target(slot)?;
                    self.out.put_u32(target);
                    self.out.put_u32(height);
                }
            }

            (_, K::Call { func_idx }) => {
                self.out.put_u16(inst.tag);
                self.out.put_u32(*func_idx);
            }

            (_, K::CallIndirect { type_idx, table_idx }) => {
                self.out.put_u16(inst.tag);
                self.out.put_u32(*type_idx);
                self.out.put_u32(*table_idx);
            }

            (_, K::Local { local_idx: idx })
            | (_, K::Global { global_idx: idx })
            | (_, K::Table { table_idx: idx })
            | (_, K::MemoryInit { data_idx: idx })
            | (_, K::DataDrop { data_idx: idx })
            | (_, K::ElemDrop { elem_idx: idx })
            | (_, K::RefFunc { func_idx: idx }) => {
                self.out.put_u16(inst.tag);
                self.out.put_u32(*idx);
            }

            (_, K::TableInit { elem_idx, table_idx }) => {
                self.out.put_u16(inst.tag);
                self.out.put_u32(*elem_idx);
                self.out.put_u32(*table_idx);
            }

            (
                _,
                K::TableCopy {
                    dst_table,
                    src_table,
                },
            ) => {
                self.out.put_u16(inst.tag);
                self.out.put_u32(*dst_table);
                self.out.put_u32(*src_table);
            }

            (_, K::Memory { memarg }) => {
                // alignment is only a hint; it was checked by the validator
                self.out.put_u16(inst.tag);
                self.out.put_u32(memarg.offset);
            }

            (_, K::I32Const { value }) => {
                self.out.put_u16(inst.tag);
                self.out.put_u32(*value as u32);
            }

            (_, K::I64Const { value }) => {
                self.out.put_u16(inst.tag);
                self.out.put_u64(*value as u64);
            }

            (_, K::F32Const { bits }) => {
                self.out.put_u16(inst.tag);
                self.out.put_u32(*bits);
            }

            (_, K::F64Const { bits }) => {
                self.out.put_u16(inst.tag);
                self.out.put_u64(*bits);
            }

            // the null sentinel is the same for every reference type, and a
            // typed select runs like an untyped one
            (_, K::RefNull { .. }) | (_, K::SelectTyped { .. }) | (_, K::Plain) => {
                self.out.put_u16(inst.tag);
            }

            (_, K::Block { .. }) | (_, K::Br { .. }) | (_, K::BrTable { .. }) => {
                return Err(internal("control immediates on a non-control tag"));
            }
        }
        Ok(false)
    }
}

/// Linearize one validated function body.
pub fn linearize(code: &[u8], analysis: &FunctionAnalysis) -> Result<Vec<u8>, ParseError> {
    let slots = Slots {
        offsets: Vec::with_capacity(analysis.blocks.len() * 2),
        frozen: false,
        next: 0,
    };
    let mut sizing = Walker::new(analysis, slots, Sizer::default());
    sizing.walk(code)?;
    let size = sizing.out.len as usize;

    let slots = Slots {
        offsets: sizing.slots.offsets,
        frozen: true,
        next: 0,
    };
    let mut emission = Walker::new(analysis, slots, Vec::with_capacity(size));
    emission.walk(code)?;

    if emission.out.len() != size {
        return Err(internal("emitted size differs from sized"));
    }
    debug!(
        "linearized {} bytes into {} ({} labels)",
        code.len(),
        size,
        emission.slots.offsets.len()
    );
    Ok(emission.out)
}

/// Number of 32-bit immediate words that follow a tag, for the fixed-layout
/// tags. `br_table` is variable and handled by the caller.
fn immediate_words(tag: u16) -> usize {
    match tag {
        BR | BR_IF => 3,
        CALL_INDIRECT | TABLE_INIT | TABLE_COPY | I64_CONST | F64_CONST => 2,
        IF | ELSE | CALL | LOCAL_GET | LOCAL_SET | LOCAL_TEE | GLOBAL_GET | GLOBAL_SET
        | TABLE_GET | TABLE_SET | TABLE_SIZE | TABLE_GROW | TABLE_FILL | ELEM_DROP
        | MEMORY_INIT | DATA_DROP | REF_FUNC | I32_CONST | F32_CONST => 1,
        I32_LOAD..=I64_STORE32 => 1,
        _ => 0,
    }
}

/// Render linearized bytecode one instruction per line, prefixed by its
/// offset.
pub fn disassemble(code: &[u8]) -> Result<String, ParseError> {
    let mut reader = Reader::new(code);
    let mut out = String::new();

    while !reader.is_empty() {
        let pos = reader.pos();
        let tag = reader.read_u16()?;
        let name = opcode::name(tag).ok_or(ValidationError::UnknownOpcode(tag))?;
        write!(out, "{:04}: {}", pos, name)?;

        let words = if tag == BR_TABLE {
            let count = reader.read_u32()?;
            let keep = reader.read_u32()?;
            write!(out, " {} {}", count, keep)?;
            (count as usize + 1) * 2
        } else {
            immediate_words(tag)
        };
        if tag == I64_CONST || tag == F64_CONST {
            write!(out, " {:#x}", reader.read_u64()?)?;
        } else {
            for _ in 0..words {
                write!(out, " {}", reader.read_u32()?)?;
            }
        }
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::module::{FunctionType, Locals, Module, ValueType};
    use crate::parser::validate::validate_function;

    fn linear(params: Vec<ValueType>, results: Vec<ValueType>, code: &str) -> Vec<u8> {
        let code = hex::decode(code.replace(' ', "")).unwrap();
        let func_type = FunctionType {
            parameters: params,
            return_types: results,
        };
        let module = Module::default();
        let analysis = validate_function(&module, &func_type, &Locals::default(), &code).unwrap();
        linearize(&code, &analysis).unwrap()
    }

    #[test]
    fn test_straight_line() {
        let code = linear(
            vec![ValueType::I32, ValueType::I32],
            vec![ValueType::I32],
            "2000 2001 6a 0b",
        );
        assert_eq!(
            disassemble(&code).unwrap(),
            "0000: local.get 0\n0006: local.get 1\n0012: i32.add\n0014: end\n"
        );
    }

    #[test]
    fn test_block_and_nop_emit_nothing() {
        let code = linear(vec![], vec![], "01 0240 01 0b 0b");
        assert_eq!(disassemble(&code).unwrap(), "0000: end\n");
    }

    #[test]
    fn test_forward_branch_targets_block_end() {
        // block br 0 end end
        let code = linear(vec![], vec![], "0240 0c00 0b 0b");
        assert_eq!(disassemble(&code).unwrap(), "0000: br 14 0 0\n0014: end\n");
    }

    #[test]
    fn test_loop_branch_is_backward() {
        // (param i32) loop i32.const 1 br_if 0 end end
        let code = linear(vec![ValueType::I32], vec![], "0340 4101 0d00 0b 0b");
        // height counts the one param
        assert_eq!(
            disassemble(&code).unwrap(),
            "0000: i32.const 1\n0006: br_if 0 0 1\n0020: end\n"
        );
    }

    #[test]
    fn test_if_else_offsets() {
        // i32.const 1 if (result i32) i32.const 2 else i32.const 3 end end
        let code = linear(vec![], vec![ValueType::I32], "4101 047f 4102 05 4103 0b 0b");
        assert_eq!(
            disassemble(&code).unwrap(),
            "0000: i32.const 1\n\
             0006: if 24\n\
             0012: i32.const 2\n\
             0018: else 30\n\
             0024: i32.const 3\n\
             0030: end\n"
        );
    }

    #[test]
    fn test_if_without_else_targets_end() {
        let code = linear(vec![], vec![], "4100 0440 01 0b 0b");
        assert_eq!(
            disassemble(&code).unwrap(),
            "0000: i32.const 0\n0006: if 12\n0012: end\n"
        );
    }

    #[test]
    fn test_br_table_default_last() {
        // block block i32.const 0 br_table 0 1 2 (default) end end end
        let code = linear(vec![], vec![], "0240 0240 4100 0e02 0001 02 0b 0b 0b");
        assert_eq!(
            disassemble(&code).unwrap(),
            "0000: i32.const 0\n0006: br_table 2 0 40 0 40 0 40 0\n0040: end\n"
        );
    }

    #[test]
    fn test_branch_to_function_label_lands_on_end() {
        // i32.const 7 br 0 end
        let code = linear(vec![], vec![ValueType::I32], "4107 0c00 0b");
        assert_eq!(
            disassemble(&code).unwrap(),
            "0000: i32.const 7\n0006: br 20 1 0\n0020: end\n"
        );
    }

    #[test]
    fn test_constants_are_fixed_width() {
        let code = linear(vec![], vec![ValueType::I64], "42 7f 0b");
        assert_eq!(code.len(), 2 + 8 + 2);
        assert_eq!(
            disassemble(&code).unwrap(),
            "0000: i64.const 0xffffffffffffffff\n0010: end\n"
        );
    }

    #[test]
    fn test_disassemble_malformed() {
        let code = linear(vec![], vec![ValueType::I32], "4101 0b");
        assert_eq!(disassemble(&code[..4]), Err(ParseError::UnexpectedEof));
        assert_eq!(
            disassemble(&[0xff, 0xff]),
            Err(ParseError::ValidationFailed(ValidationError::UnknownOpcode(0xffff)))
        );
        assert_eq!(disassemble(&[]).unwrap(), "");
    }
}
