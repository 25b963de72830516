//! WebAssembly instruction executor
//!
//! Runs linearized code. The loop keeps three hot variables: the current
//! function, the code cursor, and the frame base on the value stack. They are
//! reloaded whenever a frame is pushed or popped; nothing else about control
//! flow exists at run time, because every branch already carries its target
//! offset, the number of values it keeps, and the height it unwinds to.

use byteorder::{ByteOrder, LittleEndian};

use super::frame::Frame;
use super::instance::Instance;
use super::memory::Memory;
use super::ops::{conversion, float, numeric};
use super::value::{canonical_f32, canonical_f64, ref_to_slot, NULL_REF};
use super::{RuntimeError, TrapKind};
use crate::parser::module::Module;
use crate::parser::opcode::*;

/// Read position in one function's linear code.
struct Cursor<'c> {
    code: &'c [u8],
    ip: usize,
}

fn truncated() -> RuntimeError {
    RuntimeError::Misuse("linear code ended unexpectedly".to_string())
}

impl<'c> Cursor<'c> {
    fn new(code: &'c [u8], ip: usize) -> Self {
        Cursor { code, ip }
    }

    #[inline]
    fn take(&mut self, n: usize) -> Result<&'c [u8], RuntimeError> {
        let bytes = self.code.get(self.ip..self.ip + n).ok_or_else(truncated)?;
        self.ip += n;
        Ok(bytes)
    }

    #[inline]
    fn u16(&mut self) -> Result<u16, RuntimeError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    #[inline]
    fn u32(&mut self) -> Result<u32, RuntimeError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    #[inline]
    fn u64(&mut self) -> Result<u64, RuntimeError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    #[inline]
    fn jump(&mut self, target: u32) {
        self.ip = target as usize;
    }
}

macro_rules! unop {
    ($self:ident, $pop:ident, $push:ident, |$a:ident| $e:expr) => {{
        let $a = $self.stack.$pop()?;
        $self.stack.$push($e);
    }};
}

macro_rules! binop {
    ($self:ident, $pop:ident, $push:ident, |$a:ident, $b:ident| $e:expr) => {{
        let $b = $self.stack.$pop()?;
        let $a = $self.stack.$pop()?;
        $self.stack.$push($e);
    }};
}

macro_rules! load {
    ($self:ident, $pc:ident, $read:ident, |$v:ident| $slot:expr) => {{
        let offset = $pc.u32()?;
        let addr = $self.stack.pop_u32()?;
        let $v = $self.mem()?.$read(addr, offset)?;
        $self.stack.push($slot);
    }};
}

macro_rules! store {
    ($self:ident, $pc:ident, $write:ident, |$v:ident| $value:expr) => {{
        let offset = $pc.u32()?;
        let $v = $self.stack.pop()?;
        let addr = $self.stack.pop_u32()?;
        $self.mem()?.$write(addr, offset, $value)?;
    }};
}

impl<'m> Instance<'m> {
    fn mem(&mut self) -> Result<&mut Memory, RuntimeError> {
        self.memory
            .as_mut()
            .ok_or_else(|| RuntimeError::Misuse("module has no memory".to_string()))
    }

    fn code_of(module: &'m Module, func_index: u32) -> Result<&'m [u8], RuntimeError> {
        module
            .body(func_index)
            .map(|body| body.linear.as_slice())
            .ok_or_else(|| RuntimeError::NotFound(format!("func #{}", func_index)))
    }

    /// Push a frame for `func_index`, whose params are already on the stack.
    /// Returns its code and frame base.
    fn enter(&mut self, func_index: u32) -> Result<(&'m [u8], usize), RuntimeError> {
        let module = self.module;
        let func_type = module
            .func_type(func_index)
            .ok_or_else(|| RuntimeError::NotFound(format!("func #{}", func_index)))?;
        let body = module
            .body(func_index)
            .ok_or_else(|| RuntimeError::NotFound(format!("func #{}", func_index)))?;

        if self.frames.len() >= self.config.max_call_depth {
            return Err(RuntimeError::CallStackOverflow);
        }
        let base = self
            .stack
            .len()
            .checked_sub(func_type.parameters.len())
            .ok_or(RuntimeError::StackUnderflow)?;
        let locals = body.locals.len() as usize;
        if self.stack.len() + locals + body.max_stack_depth as usize > self.config.max_value_stack {
            return Err(RuntimeError::CallStackOverflow);
        }

        self.stack.push_zeros(locals);
        self.frames.push(Frame::new(func_index, base));
        Ok((body.linear.as_slice(), base))
    }

    fn save_ip(&mut self, ip: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip = ip;
        }
    }

    fn indirect_target(&self, type_index: u32, table_index: u32, slot: u32) -> Result<u32, RuntimeError> {
        let module = self.module;
        let table = self
            .tables
            .get(table_index as usize)
            .ok_or_else(|| RuntimeError::NotFound(format!("table #{}", table_index)))?;
        let callee = table.function_at(slot)?;
        let expected = module.types.get(type_index as usize);
        let actual = module.func_type(callee);
        match (expected, actual) {
            (Some(expected), Some(actual)) if expected == actual => Ok(callee),
            _ => Err(TrapKind::IndirectCallTypeMismatch.into()),
        }
    }

    /// Run `func_index` to completion. Its params must be on top of the
    /// stack; its results replace them.
    pub(crate) fn execute(&mut self, func_index: u32) -> Result<(), RuntimeError> {
        let module = self.module;
        let (code, mut base) = self.enter(func_index)?;
        let mut func = func_index;
        let mut pc = Cursor::new(code, 0);

        loop {
            let tag = pc.u16()?;
            match tag {
                // control
                UNREACHABLE => return Err(TrapKind::Unreachable.into()),

                IF => {
                    let target = pc.u32()?;
                    if self.stack.pop_i32()? == 0 {
                        pc.jump(target);
                    }
                }

                // reached only when the then-arm falls through
                ELSE => {
                    let target = pc.u32()?;
                    pc.jump(target);
                }

                BR => {
                    let target = pc.u32()?;
                    let keep = pc.u32()?;
                    let height = pc.u32()?;
                    self.stack.unwind(base + height as usize, keep as usize)?;
                    pc.jump(target);
                }

                BR_IF => {
                    let target = pc.u32()?;
                    let keep = pc.u32()?;
                    let height = pc.u32()?;
                    if self.stack.pop_i32()? != 0 {
                        self.stack.unwind(base + height as usize, keep as usize)?;
                        pc.jump(target);
                    }
                }

                BR_TABLE => {
                    let count = pc.u32()?;
                    let keep = pc.u32()?;
                    // out of range selects the trailing default
                    let index = self.stack.pop_u32()?.min(count);
                    pc.ip += index as usize * 8;
                    let target = pc.u32()?;
                    let height = pc.u32()?;
                    self.stack.unwind(base + height as usize, keep as usize)?;
                    pc.jump(target);
                }

                RETURN | END => {
                    let arity = module.func_type(func).map_or(0, |ty| ty.return_types.len());
                    self.stack.unwind(base, arity)?;
                    self.frames.pop();
                    let Some(caller) = self.frames.last() else {
                        return Ok(());
                    };
                    func = caller.func_index;
                    base = caller.locals_offset;
                    pc = Cursor::new(Self::code_of(module, func)?, caller.ip);
                }

                CALL => {
                    let callee = pc.u32()?;
                    self.save_ip(pc.ip);
                    let (code, callee_base) = self.enter(callee)?;
                    func = callee;
                    base = callee_base;
                    pc = Cursor::new(code, 0);
                }

                CALL_INDIRECT => {
                    let type_index = pc.u32()?;
                    let table_index = pc.u32()?;
                    let slot = self.stack.pop_u32()?;
                    let callee = self.indirect_target(type_index, table_index, slot)?;
                    self.save_ip(pc.ip);
                    let (code, callee_base) = self.enter(callee)?;
                    func = callee;
                    base = callee_base;
                    pc = Cursor::new(code, 0);
                }

                // parametric
                DROP => {
                    self.stack.pop()?;
                }

                SELECT | SELECT_T => {
                    let c = self.stack.pop_i32()?;
                    let b = self.stack.pop()?;
                    let a = self.stack.pop()?;
                    self.stack.push(if c != 0 { a } else { b });
                }

                // variable
                LOCAL_GET => {
                    let index = pc.u32()? as usize;
                    let v = self.stack.get(base + index)?;
                    self.stack.push(v);
                }

                LOCAL_SET => {
                    let index = pc.u32()? as usize;
                    let v = self.stack.pop()?;
                    self.stack.set(base + index, v)?;
                }

                LOCAL_TEE => {
                    let index = pc.u32()? as usize;
                    let v = self.stack.peek()?;
                    self.stack.set(base + index, v)?;
                }

                GLOBAL_GET => {
                    let index = pc.u32()? as usize;
                    let v = *self
                        .globals
                        .get(index)
                        .ok_or_else(|| RuntimeError::NotFound(format!("global #{}", index)))?;
                    self.stack.push(v);
                }

                GLOBAL_SET => {
                    let index = pc.u32()? as usize;
                    let v = self.stack.pop()?;
                    let global = self
                        .globals
                        .get_mut(index)
                        .ok_or_else(|| RuntimeError::NotFound(format!("global #{}", index)))?;
                    *global = v;
                }

                // table
                TABLE_GET => {
                    let t = pc.u32()?;
                    let i = self.stack.pop_u32()?;
                    let v = self.table(t)?.get(i)?;
                    self.stack.push(v);
                }

                TABLE_SET => {
                    let t = pc.u32()?;
                    let v = self.stack.pop()?;
                    let i = self.stack.pop_u32()?;
                    self.table(t)?.set(i, v)?;
                }

                TABLE_SIZE => {
                    let t = pc.u32()?;
                    let size = self.table(t)?.size();
                    self.stack.push_i32(size as i32);
                }

                TABLE_GROW => {
                    let t = pc.u32()?;
                    let n = self.stack.pop_u32()?;
                    let init = self.stack.pop()?;
                    let old = self.table(t)?.grow(n, init);
                    self.stack.push_i32(old);
                }

                TABLE_FILL => {
                    let t = pc.u32()?;
                    let n = self.stack.pop_u32()?;
                    let v = self.stack.pop()?;
                    let i = self.stack.pop_u32()?;
                    self.table(t)?.fill(i, v, n)?;
                }

                TABLE_COPY => {
                    let dst_table = pc.u32()?;
                    let src_table = pc.u32()?;
                    let n = self.stack.pop_u32()?;
                    let s = self.stack.pop_u32()?;
                    let d = self.stack.pop_u32()?;
                    if dst_table == src_table {
                        self.table(dst_table)?.copy(d, s, n)?;
                    } else {
                        let src = self.table(src_table)?;
                        let slots = (0..src.size()).map(|i| src.get(i)).collect::<Result<Vec<_>, _>>()?;
                        self.table(dst_table)?.init(d, &slots, s, n)?;
                    }
                }

                TABLE_INIT => {
                    let elem = pc.u32()? as usize;
                    let t = pc.u32()?;
                    let n = self.stack.pop_u32()?;
                    let s = self.stack.pop_u32()?;
                    let d = self.stack.pop_u32()?;
                    let segment = self
                        .elements
                        .get(elem)
                        .ok_or_else(|| RuntimeError::NotFound(format!("elem #{}", elem)))?;
                    let table = self
                        .tables
                        .get_mut(t as usize)
                        .ok_or_else(|| RuntimeError::NotFound(format!("table #{}", t)))?;
                    table.init(d, segment, s, n)?;
                }

                ELEM_DROP => {
                    let elem = pc.u32()? as usize;
                    if let Some(segment) = self.elements.get_mut(elem) {
                        *segment = Vec::new();
                    }
                }

                // memory
                I32_LOAD => load!(self, pc, read_u32, |v| v as u64),
                I64_LOAD => load!(self, pc, read_u64, |v| v),
                F32_LOAD => load!(self, pc, read_u32, |v| canonical_f32(v) as u64),
                F64_LOAD => load!(self, pc, read_u64, |v| canonical_f64(v)),
                I32_LOAD8_S => load!(self, pc, read_u8, |v| v as i8 as i32 as u32 as u64),
                I32_LOAD8_U => load!(self, pc, read_u8, |v| v as u64),
                I32_LOAD16_S => load!(self, pc, read_u16, |v| v as i16 as i32 as u32 as u64),
                I32_LOAD16_U => load!(self, pc, read_u16, |v| v as u64),
                I64_LOAD8_S => load!(self, pc, read_u8, |v| v as i8 as i64 as u64),
                I64_LOAD8_U => load!(self, pc, read_u8, |v| v as u64),
                I64_LOAD16_S => load!(self, pc, read_u16, |v| v as i16 as i64 as u64),
                I64_LOAD16_U => load!(self, pc, read_u16, |v| v as u64),
                I64_LOAD32_S => load!(self, pc, read_u32, |v| v as i32 as i64 as u64),
                I64_LOAD32_U => load!(self, pc, read_u32, |v| v as u64),

                I32_STORE => store!(self, pc, write_u32, |v| v as u32),
                I64_STORE => store!(self, pc, write_u64, |v| v),
                F32_STORE => store!(self, pc, write_u32, |v| canonical_f32(v as u32)),
                F64_STORE => store!(self, pc, write_u64, |v| canonical_f64(v)),
                I32_STORE8 | I64_STORE8 => store!(self, pc, write_u8, |v| v as u8),
                I32_STORE16 | I64_STORE16 => store!(self, pc, write_u16, |v| v as u16),
                I64_STORE32 => store!(self, pc, write_u32, |v| v as u32),

                MEMORY_SIZE => {
                    let pages = self.mem()?.size();
                    self.stack.push_i32(pages as i32);
                }

                MEMORY_GROW => {
                    let delta = self.stack.pop_u32()?;
                    let old = self.mem()?.grow(delta);
                    self.stack.push_i32(old);
                }

                MEMORY_INIT => {
                    let data = pc.u32()? as usize;
                    let n = self.stack.pop_u32()?;
                    let s = self.stack.pop_u32()?;
                    let d = self.stack.pop_u32()?;
                    let segment = *self
                        .data
                        .get(data)
                        .ok_or_else(|| RuntimeError::NotFound(format!("data #{}", data)))?;
                    self.mem()?.init(d, segment, s, n)?;
                }

                DATA_DROP => {
                    let data = pc.u32()? as usize;
                    if let Some(segment) = self.data.get_mut(data) {
                        *segment = &[];
                    }
                }

                MEMORY_COPY => {
                    let n = self.stack.pop_u32()?;
                    let s = self.stack.pop_u32()?;
                    let d = self.stack.pop_u32()?;
                    self.mem()?.copy(d, s, n)?;
                }

                MEMORY_FILL => {
                    let n = self.stack.pop_u32()?;
                    let v = self.stack.pop_u32()?;
                    let d = self.stack.pop_u32()?;
                    self.mem()?.fill(d, v as u8, n)?;
                }

                // constants
                I32_CONST => {
                    let v = pc.u32()?;
                    self.stack.push(v as u64);
                }
                I64_CONST => {
                    let v = pc.u64()?;
                    self.stack.push(v);
                }
                F32_CONST => {
                    let bits = pc.u32()?;
                    self.stack.push(canonical_f32(bits) as u64);
                }
                F64_CONST => {
                    let bits = pc.u64()?;
                    self.stack.push(canonical_f64(bits));
                }

                // reference
                REF_NULL => self.stack.push(NULL_REF),
                REF_IS_NULL => unop!(self, pop, push_i32, |r| (r == NULL_REF) as i32),
                REF_FUNC => {
                    let f = pc.u32()?;
                    self.stack.push(ref_to_slot(Some(f)));
                }

                // itestop, irelop
                I32_EQZ => unop!(self, pop_i32, push_i32, |a| (a == 0) as i32),
                I32_EQ => binop!(self, pop_i32, push_i32, |a, b| (a == b) as i32),
                I32_NE => binop!(self, pop_i32, push_i32, |a, b| (a != b) as i32),
                I32_LT_S => binop!(self, pop_i32, push_i32, |a, b| (a < b) as i32),
                I32_LT_U => binop!(self, pop_u32, push_i32, |a, b| (a < b) as i32),
                I32_GT_S => binop!(self, pop_i32, push_i32, |a, b| (a > b) as i32),
                I32_GT_U => binop!(self, pop_u32, push_i32, |a, b| (a > b) as i32),
                I32_LE_S => binop!(self, pop_i32, push_i32, |a, b| (a <= b) as i32),
                I32_LE_U => binop!(self, pop_u32, push_i32, |a, b| (a <= b) as i32),
                I32_GE_S => binop!(self, pop_i32, push_i32, |a, b| (a >= b) as i32),
                I32_GE_U => binop!(self, pop_u32, push_i32, |a, b| (a >= b) as i32),

                I64_EQZ => unop!(self, pop_i64, push_i32, |a| (a == 0) as i32),
                I64_EQ => binop!(self, pop_i64, push_i32, |a, b| (a == b) as i32),
                I64_NE => binop!(self, pop_i64, push_i32, |a, b| (a != b) as i32),
                I64_LT_S => binop!(self, pop_i64, push_i32, |a, b| (a < b) as i32),
                I64_LT_U => binop!(self, pop, push_i32, |a, b| (a < b) as i32),
                I64_GT_S => binop!(self, pop_i64, push_i32, |a, b| (a > b) as i32),
                I64_GT_U => binop!(self, pop, push_i32, |a, b| (a > b) as i32),
                I64_LE_S => binop!(self, pop_i64, push_i32, |a, b| (a <= b) as i32),
                I64_LE_U => binop!(self, pop, push_i32, |a, b| (a <= b) as i32),
                I64_GE_S => binop!(self, pop_i64, push_i32, |a, b| (a >= b) as i32),
                I64_GE_U => binop!(self, pop, push_i32, |a, b| (a >= b) as i32),

                // frelop
                F32_EQ => binop!(self, pop_f32, push_i32, |a, b| (a == b) as i32),
                F32_NE => binop!(self, pop_f32, push_i32, |a, b| (a != b) as i32),
                F32_LT => binop!(self, pop_f32, push_i32, |a, b| (a < b) as i32),
                F32_GT => binop!(self, pop_f32, push_i32, |a, b| (a > b) as i32),
                F32_LE => binop!(self, pop_f32, push_i32, |a, b| (a <= b) as i32),
                F32_GE => binop!(self, pop_f32, push_i32, |a, b| (a >= b) as i32),

                F64_EQ => binop!(self, pop_f64, push_i32, |a, b| (a == b) as i32),
                F64_NE => binop!(self, pop_f64, push_i32, |a, b| (a != b) as i32),
                F64_LT => binop!(self, pop_f64, push_i32, |a, b| (a < b) as i32),
                F64_GT => binop!(self, pop_f64, push_i32, |a, b| (a > b) as i32),
                F64_LE => binop!(self, pop_f64, push_i32, |a, b| (a <= b) as i32),
                F64_GE => binop!(self, pop_f64, push_i32, |a, b| (a >= b) as i32),

                // iunop, ibinop
                I32_CLZ => unop!(self, pop_i32, push_i32, |a| a.leading_zeros() as i32),
                I32_CTZ => unop!(self, pop_i32, push_i32, |a| a.trailing_zeros() as i32),
                I32_POPCNT => unop!(self, pop_i32, push_i32, |a| a.count_ones() as i32),
                I32_ADD => binop!(self, pop_i32, push_i32, |a, b| a.wrapping_add(b)),
                I32_SUB => binop!(self, pop_i32, push_i32, |a, b| a.wrapping_sub(b)),
                I32_MUL => binop!(self, pop_i32, push_i32, |a, b| a.wrapping_mul(b)),
                I32_DIV_S => binop!(self, pop_i32, push_i32, |a, b| numeric::i32_div_s(a, b)?),
                I32_DIV_U => binop!(self, pop_i32, push_i32, |a, b| numeric::i32_div_u(a, b)?),
                I32_REM_S => binop!(self, pop_i32, push_i32, |a, b| numeric::i32_rem_s(a, b)?),
                I32_REM_U => binop!(self, pop_i32, push_i32, |a, b| numeric::i32_rem_u(a, b)?),
                I32_AND => binop!(self, pop_i32, push_i32, |a, b| a & b),
                I32_OR => binop!(self, pop_i32, push_i32, |a, b| a | b),
                I32_XOR => binop!(self, pop_i32, push_i32, |a, b| a ^ b),
                I32_SHL => binop!(self, pop_i32, push_i32, |a, b| a.wrapping_shl(b as u32)),
                I32_SHR_S => binop!(self, pop_i32, push_i32, |a, b| a.wrapping_shr(b as u32)),
                I32_SHR_U => binop!(self, pop_u32, push_i32, |a, b| a.wrapping_shr(b) as i32),
                I32_ROTL => binop!(self, pop_u32, push_i32, |a, b| a.rotate_left(b & 31) as i32),
                I32_ROTR => binop!(self, pop_u32, push_i32, |a, b| a.rotate_right(b & 31) as i32),

                I64_CLZ => unop!(self, pop_i64, push_i64, |a| a.leading_zeros() as i64),
                I64_CTZ => unop!(self, pop_i64, push_i64, |a| a.trailing_zeros() as i64),
                I64_POPCNT => unop!(self, pop_i64, push_i64, |a| a.count_ones() as i64),
                I64_ADD => binop!(self, pop_i64, push_i64, |a, b| a.wrapping_add(b)),
                I64_SUB => binop!(self, pop_i64, push_i64, |a, b| a.wrapping_sub(b)),
                I64_MUL => binop!(self, pop_i64, push_i64, |a, b| a.wrapping_mul(b)),
                I64_DIV_S => binop!(self, pop_i64, push_i64, |a, b| numeric::i64_div_s(a, b)?),
                I64_DIV_U => binop!(self, pop_i64, push_i64, |a, b| numeric::i64_div_u(a, b)?),
                I64_REM_S => binop!(self, pop_i64, push_i64, |a, b| numeric::i64_rem_s(a, b)?),
                I64_REM_U => binop!(self, pop_i64, push_i64, |a, b| numeric::i64_rem_u(a, b)?),
                I64_AND => binop!(self, pop_i64, push_i64, |a, b| a & b),
                I64_OR => binop!(self, pop_i64, push_i64, |a, b| a | b),
                I64_XOR => binop!(self, pop_i64, push_i64, |a, b| a ^ b),
                I64_SHL => binop!(self, pop_i64, push_i64, |a, b| a.wrapping_shl(b as u32)),
                I64_SHR_S => binop!(self, pop_i64, push_i64, |a, b| a.wrapping_shr(b as u32)),
                I64_SHR_U => binop!(self, pop, push, |a, b| a.wrapping_shr(b as u32)),
                I64_ROTL => binop!(self, pop, push, |a, b| a.rotate_left((b & 63) as u32)),
                I64_ROTR => binop!(self, pop, push, |a, b| a.rotate_right((b & 63) as u32)),

                // funop, fbinop
                F32_ABS => unop!(self, pop_f32, push_f32, |a| a.abs()),
                F32_NEG => unop!(self, pop_f32, push_f32, |a| -a),
                F32_CEIL => unop!(self, pop_f32, push_f32, |a| a.ceil()),
                F32_FLOOR => unop!(self, pop_f32, push_f32, |a| a.floor()),
                F32_TRUNC => unop!(self, pop_f32, push_f32, |a| a.trunc()),
                F32_NEAREST => unop!(self, pop_f32, push_f32, |a| float::f32_nearest(a)),
                F32_SQRT => unop!(self, pop_f32, push_f32, |a| a.sqrt()),
                F32_ADD => binop!(self, pop_f32, push_f32, |a, b| a + b),
                F32_SUB => binop!(self, pop_f32, push_f32, |a, b| a - b),
                F32_MUL => binop!(self, pop_f32, push_f32, |a, b| a * b),
                F32_DIV => binop!(self, pop_f32, push_f32, |a, b| a / b),
                F32_MIN => binop!(self, pop_f32, push_f32, |a, b| float::f32_min(a, b)),
                F32_MAX => binop!(self, pop_f32, push_f32, |a, b| float::f32_max(a, b)),
                F32_COPYSIGN => binop!(self, pop_f32, push_f32, |a, b| a.copysign(b)),

                F64_ABS => unop!(self, pop_f64, push_f64, |a| a.abs()),
                F64_NEG => unop!(self, pop_f64, push_f64, |a| -a),
                F64_CEIL => unop!(self, pop_f64, push_f64, |a| a.ceil()),
                F64_FLOOR => unop!(self, pop_f64, push_f64, |a| a.floor()),
                F64_TRUNC => unop!(self, pop_f64, push_f64, |a| a.trunc()),
                F64_NEAREST => unop!(self, pop_f64, push_f64, |a| float::f64_nearest(a)),
                F64_SQRT => unop!(self, pop_f64, push_f64, |a| a.sqrt()),
                F64_ADD => binop!(self, pop_f64, push_f64, |a, b| a + b),
                F64_SUB => binop!(self, pop_f64, push_f64, |a, b| a - b),
                F64_MUL => binop!(self, pop_f64, push_f64, |a, b| a * b),
                F64_DIV => binop!(self, pop_f64, push_f64, |a, b| a / b),
                F64_MIN => binop!(self, pop_f64, push_f64, |a, b| float::f64_min(a, b)),
                F64_MAX => binop!(self, pop_f64, push_f64, |a, b| float::f64_max(a, b)),
                F64_COPYSIGN => binop!(self, pop_f64, push_f64, |a, b| a.copysign(b)),

                // cvtop
                I32_WRAP_I64 => unop!(self, pop_i64, push_i32, |a| a as i32),
                I64_EXTEND_I32_S => unop!(self, pop_i32, push_i64, |a| a as i64),
                I64_EXTEND_I32_U => unop!(self, pop_u32, push_i64, |a| a as i64),
                I32_EXTEND8_S => unop!(self, pop_i32, push_i32, |a| a as i8 as i32),
                I32_EXTEND16_S => unop!(self, pop_i32, push_i32, |a| a as i16 as i32),
                I64_EXTEND8_S => unop!(self, pop_i64, push_i64, |a| a as i8 as i64),
                I64_EXTEND16_S => unop!(self, pop_i64, push_i64, |a| a as i16 as i64),
                I64_EXTEND32_S => unop!(self, pop_i64, push_i64, |a| a as i32 as i64),

                I32_TRUNC_F32_S => unop!(self, pop_f32, push_i32, |a| conversion::i32_trunc_f32_s(a)?),
                I32_TRUNC_F32_U => unop!(self, pop_f32, push_i32, |a| conversion::i32_trunc_f32_u(a)?),
                I32_TRUNC_F64_S => unop!(self, pop_f64, push_i32, |a| conversion::i32_trunc_f64_s(a)?),
                I32_TRUNC_F64_U => unop!(self, pop_f64, push_i32, |a| conversion::i32_trunc_f64_u(a)?),
                I64_TRUNC_F32_S => unop!(self, pop_f32, push_i64, |a| conversion::i64_trunc_f32_s(a)?),
                I64_TRUNC_F32_U => unop!(self, pop_f32, push_i64, |a| conversion::i64_trunc_f32_u(a)?),
                I64_TRUNC_F64_S => unop!(self, pop_f64, push_i64, |a| conversion::i64_trunc_f64_s(a)?),
                I64_TRUNC_F64_U => unop!(self, pop_f64, push_i64, |a| conversion::i64_trunc_f64_u(a)?),

                I32_TRUNC_SAT_F32_S => unop!(self, pop_f32, push_i32, |a| conversion::i32_trunc_sat_f32_s(a)),
                I32_TRUNC_SAT_F32_U => unop!(self, pop_f32, push_i32, |a| conversion::i32_trunc_sat_f32_u(a)),
                I32_TRUNC_SAT_F64_S => unop!(self, pop_f64, push_i32, |a| conversion::i32_trunc_sat_f64_s(a)),
                I32_TRUNC_SAT_F64_U => unop!(self, pop_f64, push_i32, |a| conversion::i32_trunc_sat_f64_u(a)),
                I64_TRUNC_SAT_F32_S => unop!(self, pop_f32, push_i64, |a| conversion::i64_trunc_sat_f32_s(a)),
                I64_TRUNC_SAT_F32_U => unop!(self, pop_f32, push_i64, |a| conversion::i64_trunc_sat_f32_u(a)),
                I64_TRUNC_SAT_F64_S => unop!(self, pop_f64, push_i64, |a| conversion::i64_trunc_sat_f64_s(a)),
                I64_TRUNC_SAT_F64_U => unop!(self, pop_f64, push_i64, |a| conversion::i64_trunc_sat_f64_u(a)),

                F32_CONVERT_I32_S => unop!(self, pop_i32, push_f32, |a| a as f32),
                F32_CONVERT_I32_U => unop!(self, pop_u32, push_f32, |a| a as f32),
                F32_CONVERT_I64_S => unop!(self, pop_i64, push_f32, |a| a as f32),
                F32_CONVERT_I64_U => unop!(self, pop, push_f32, |a| a as f32),
                F32_DEMOTE_F64 => unop!(self, pop_f64, push_f32, |a| a as f32),
                F64_CONVERT_I32_S => unop!(self, pop_i32, push_f64, |a| a as f64),
                F64_CONVERT_I32_U => unop!(self, pop_u32, push_f64, |a| a as f64),
                F64_CONVERT_I64_S => unop!(self, pop_i64, push_f64, |a| a as f64),
                F64_CONVERT_I64_U => unop!(self, pop, push_f64, |a| a as f64),
                F64_PROMOTE_F32 => unop!(self, pop_f32, push_f64, |a| a as f64),

                // an i32 slot and an f32 slot hold the same 32 bits, so
                // reinterpretation leaves the stack untouched
                I32_REINTERPRET_F32 | F32_REINTERPRET_I32 | I64_REINTERPRET_F64
                | F64_REINTERPRET_I64 => {}

                _ => {
                    return Err(RuntimeError::Misuse(format!(
                        "unexpected tag {:#06x} at {}",
                        tag,
                        pc.ip - 2
                    )))
                }
            }
        }
    }

    fn table(&mut self, index: u32) -> Result<&mut super::table::Table, RuntimeError> {
        self.tables
            .get_mut(index as usize)
            .ok_or_else(|| RuntimeError::NotFound(format!("table #{}", index)))
    }
}
