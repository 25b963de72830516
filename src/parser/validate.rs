use super::instruction::{BlockType, Instruction, InstructionKind};
use super::module::{ConstExpr, FunctionType, GlobalType, Locals, Module, ValueType, ValueType::*};
use super::opcode::*;
use super::reader::Reader;
use super::ParseError;
use crate::runtime::Value;
use thiserror::Error;
use MaybeValue::{Unknown, Val};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("type mismatch")]
    TypeMismatch,

    #[error("unknown type")]
    UnknownType,

    #[error("unknown function")]
    UnknownFunction,

    #[error("unknown table")]
    UnknownTable,

    #[error("unknown memory")]
    UnknownMemory,

    #[error("unknown local")]
    UnknownLocal,

    #[error("unknown global")]
    UnknownGlobal,

    #[error("unknown label")]
    UnknownLabel,

    #[error("unknown elem segment")]
    UnknownElement,

    #[error("unknown data segment")]
    UnknownData,

    #[error("unknown block type")]
    UnknownBlockType,

    #[error("illegal opcode {0:#x}")]
    UnknownOpcode(u16),

    #[error("global is immutable")]
    ImmutableGlobal,

    #[error("alignment must not be larger than natural")]
    BadAlignment,

    #[error("data count section required")]
    DataCountSectionRequired,

    #[error("undeclared function reference")]
    UndeclaredFunctionReference,

    #[error("else without matching if")]
    ElseWithoutIf,

    #[error("invalid result arity")]
    InvalidResultArity,

    #[error("unexpected end of function")]
    MissingEnd,

    #[error("operators remaining after end of function")]
    TrailingBytes,

    #[error("constant expression required")]
    ConstantExpressionRequired,

    #[error("malformed value type {0:#x}")]
    InvalidValueType(u8),

    #[error("malformed reference type")]
    MalformedReferenceType,

    #[error("malformed function type {0:#x}")]
    MalformedFunctionType(u8),

    #[error("malformed limits flags {0:#x}")]
    MalformedLimits(u8),

    #[error("malformed mutability")]
    MalformedMutability,

    #[error("malformed import kind {0:#x}")]
    MalformedExternKind(u8),

    #[error("malformed element kind")]
    MalformedElementKind,

    #[error("malformed segment flags {0}")]
    MalformedSegmentFlags(u32),

    #[error("zero byte expected")]
    ZeroByteExpected,

    #[error("malformed UTF-8 encoding")]
    MalformedUtf8,

    #[error("section {0} out of order or duplicated")]
    SectionOutOfOrder(u8),

    #[error("section {0} size mismatch")]
    SectionSizeMismatch(u8),

    #[error("function and code section have inconsistent lengths")]
    FunctionCodeCountMismatch,

    #[error("data count and data section have inconsistent lengths")]
    DataCountMismatch,

    #[error("duplicate export name {0:?}")]
    DuplicateExportName(String),

    #[error("start function must have type [] -> []")]
    InvalidStartFunction,

    #[error("multiple tables")]
    MultipleTables,

    #[error("multiple memories")]
    MultipleMemories,

    #[error("memory size must be at most 65536 pages (4GiB)")]
    MemorySizeTooLarge,

    #[error("size minimum must not be greater than maximum")]
    SizeMinimumGreaterThanMaximum,

    #[error("linearizer: {0}")]
    Internal(String),
}

/// Per-block facts gathered during validation and consumed by the linearizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Operand stack height at block entry, relative to the function's
    /// operand base (params and locals excluded).
    pub height: u32,
    /// Number of values a branch to this block's label carries.
    pub label_arity: u32,
}

/// Result of validating one function body.
///
/// `blocks[0]` describes the function scope itself; the rest follow the
/// `block`/`loop`/`if` instructions in encounter order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionAnalysis {
    pub max_stack_depth: u32,
    /// Params plus declared locals.
    pub locals_count: u32,
    pub blocks: Vec<BlockInfo>,
}

/// Validate one function body, stopping at the first error.
pub fn validate_function(
    module: &Module,
    func_type: &FunctionType,
    locals: &Locals,
    code: &[u8],
) -> Result<FunctionAnalysis, ParseError> {
    let mut validator = CodeValidator::new(module, func_type, locals);
    let mut reader = Reader::new(code);

    while !reader.is_empty() {
        if validator.finished {
            return Err(ValidationError::TrailingBytes.into());
        }
        let inst = Instruction::decode(&mut reader)?;
        validator.validate(&inst)?;
    }
    if !validator.finished {
        return Err(ValidationError::MissingEnd.into());
    }

    Ok(FunctionAnalysis {
        max_stack_depth: validator.max_depth as u32,
        locals_count: (func_type.parameters.len() as u64 + locals.len()) as u32,
        blocks: validator.blocks,
    })
}

/// Read and check a constant expression of type `expected`, terminated by
/// `end`. Plain constants are evaluated on the spot.
pub fn read_constant_expression(
    reader: &mut Reader,
    module: &Module,
    expected: ValueType,
) -> Result<ConstExpr, ParseError> {
    let inst = Instruction::decode(reader)?;
    let (expr, value_type) = match inst.kind {
        InstructionKind::I32Const { value } => (ConstExpr::Value(Value::I32(value)), I32),
        InstructionKind::I64Const { value } => (ConstExpr::Value(Value::I64(value)), I64),
        InstructionKind::F32Const { bits } => {
            (ConstExpr::Value(Value::F32(f32::from_bits(bits))), F32)
        }
        InstructionKind::F64Const { bits } => {
            (ConstExpr::Value(Value::F64(f64::from_bits(bits))), F64)
        }
        InstructionKind::RefNull { ref_type } => (ConstExpr::Value(Value::null(ref_type)), ref_type),
        InstructionKind::RefFunc { func_idx } => {
            if func_idx as usize >= module.functions.len() {
                return Err(ValidationError::UnknownFunction.into());
            }
            (ConstExpr::Value(Value::FuncRef(Some(func_idx))), FuncRef)
        }
        InstructionKind::Global { global_idx } if inst.tag == GLOBAL_GET => {
            // only imported globals are visible to constant expressions
            if global_idx >= module.imported_global_count() {
                return Err(ValidationError::UnknownGlobal.into());
            }
            let global = &module.globals[global_idx as usize];
            if global.global_type.mutable {
                return Err(ValidationError::ConstantExpressionRequired.into());
            }
            (ConstExpr::GlobalGet(global_idx), global.global_type.value_type)
        }
        _ => return Err(ValidationError::ConstantExpressionRequired.into()),
    };

    if value_type != expected {
        return Err(ValidationError::TypeMismatch.into());
    }
    match Instruction::decode(reader)?.tag {
        END => Ok(expr),
        // a second value would leave the stack unbalanced
        _ => Err(ValidationError::TypeMismatch.into()),
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
enum MaybeValue {
    Val(ValueType),
    Unknown,
}

impl MaybeValue {
    fn is_num(&self) -> bool {
        match self {
            Val(v) => v.is_num(),
            Unknown => true,
        }
    }

    fn is_ref(&self) -> bool {
        match self {
            Val(v) => v.is_ref(),
            Unknown => true,
        }
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
enum FrameKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

#[derive(Debug, Clone)]
struct CtrlFrame {
    kind: FrameKind,
    start_types: Vec<ValueType>,
    end_types: Vec<ValueType>,
    height: usize,
    unreachable: bool,
}

pub struct CodeValidator<'a> {
    module: &'a Module,
    params: &'a [ValueType],
    locals: &'a Locals,
    vals: Vec<MaybeValue>,
    ctrls: Vec<CtrlFrame>,
    blocks: Vec<BlockInfo>,
    max_depth: usize,
    finished: bool,
}

impl<'a> CodeValidator<'a> {
    pub fn new(
        module: &'a Module,
        function_type: &'a FunctionType,
        locals: &'a Locals,
    ) -> CodeValidator<'a> {
        let mut v = CodeValidator {
            module,
            params: &function_type.parameters,
            locals,
            vals: vec![],
            ctrls: vec![],
            blocks: vec![],
            max_depth: 0,
            finished: false,
        };

        // the function scope is the outermost frame; parameters live in
        // locals, not on the operand stack
        v.enter(FrameKind::Function, vec![], function_type.return_types.clone());
        v
    }

    fn push_val(&mut self, val_type: MaybeValue) {
        self.vals.push(val_type);
        if self.vals.len() > self.max_depth {
            self.max_depth = self.vals.len();
        }
    }

    fn push_vals(&mut self, val_types: &[ValueType]) {
        for val_type in val_types {
            self.push_val(Val(*val_type));
        }
    }

    fn pop_val(&mut self) -> Result<MaybeValue, ValidationError> {
        let frame = self.ctrls.last().ok_or(ValidationError::TypeMismatch)?;
        if self.vals.len() == frame.height {
            if frame.unreachable {
                return Ok(Unknown);
            }
            return Err(ValidationError::TypeMismatch);
        }
        self.vals.pop().ok_or(ValidationError::TypeMismatch)
    }

    fn pop_expected(&mut self, val_type: ValueType) -> Result<MaybeValue, ValidationError> {
        let popped = self.pop_val()?;
        match popped {
            Val(actual) if actual != val_type => Err(ValidationError::TypeMismatch),
            _ => Ok(popped),
        }
    }

    /// Pop `val_types` (last one first); the popped values come back in
    /// stack order.
    fn pop_expecteds(&mut self, val_types: &[ValueType]) -> Result<Vec<MaybeValue>, ValidationError> {
        let mut popped = Vec::with_capacity(val_types.len());
        for val_type in val_types.iter().rev() {
            popped.push(self.pop_expected(*val_type)?);
        }
        popped.reverse();
        Ok(popped)
    }

    fn push_ctrl(&mut self, kind: FrameKind, start_types: Vec<ValueType>, end_types: Vec<ValueType>) {
        let height = self.vals.len();
        self.push_vals(&start_types);
        self.ctrls.push(CtrlFrame {
            kind,
            start_types,
            end_types,
            height,
            unreachable: false,
        });
    }

    /// Push a frame that opens a new label and record it for the linearizer.
    fn enter(&mut self, kind: FrameKind, start_types: Vec<ValueType>, end_types: Vec<ValueType>) {
        let label_arity = if kind == FrameKind::Loop {
            start_types.len()
        } else {
            end_types.len()
        };
        self.blocks.push(BlockInfo {
            height: self.vals.len() as u32,
            label_arity: label_arity as u32,
        });
        self.push_ctrl(kind, start_types, end_types);
    }

    fn pop_ctrl(&mut self) -> Result<CtrlFrame, ValidationError> {
        let end_types = self
            .ctrls
            .last()
            .ok_or(ValidationError::TypeMismatch)?
            .end_types
            .clone();
        self.pop_expecteds(&end_types)?;
        let frame = self.ctrls.pop().ok_or(ValidationError::TypeMismatch)?;
        if self.vals.len() != frame.height {
            return Err(ValidationError::TypeMismatch);
        }
        Ok(frame)
    }

    fn unreachable(&mut self) -> Result<(), ValidationError> {
        let ctrl = self.ctrls.last_mut().ok_or(ValidationError::TypeMismatch)?;
        self.vals.truncate(ctrl.height);
        ctrl.unreachable = true;
        Ok(())
    }

    fn sig_unary(&mut self, in_type: ValueType, out_type: ValueType) -> Result<(), ValidationError> {
        self.pop_expected(in_type)?;
        self.push_val(Val(out_type));
        Ok(())
    }

    fn sig_binary(&mut self, in_type: ValueType, out_type: ValueType) -> Result<(), ValidationError> {
        self.pop_expected(in_type)?;
        self.pop_expected(in_type)?;
        self.push_val(Val(out_type));
        Ok(())
    }

    fn local(&self, local_index: u32) -> Result<ValueType, ValidationError> {
        let li = local_index as usize;
        let local = if li < self.params.len() {
            self.params.get(li)
        } else {
            self.locals.get((li - self.params.len()) as u32)
        };

        local.copied().ok_or(ValidationError::UnknownLocal)
    }

    fn global(&self, global_index: u32) -> Result<GlobalType, ValidationError> {
        self.module
            .globals
            .get(global_index as usize)
            .map(|g| g.global_type)
            .ok_or(ValidationError::UnknownGlobal)
    }

    fn table(&self, table_index: u32) -> Result<ValueType, ValidationError> {
        self.module
            .tables
            .get(table_index as usize)
            .map(|t| t.ref_type)
            .ok_or(ValidationError::UnknownTable)
    }

    fn element(&self, elem_index: u32) -> Result<ValueType, ValidationError> {
        self.module
            .elements
            .get(elem_index as usize)
            .map(|e| e.ref_type)
            .ok_or(ValidationError::UnknownElement)
    }

    fn require_memory(&self) -> Result<(), ValidationError> {
        if self.module.memories.is_empty() {
            return Err(ValidationError::UnknownMemory);
        }
        Ok(())
    }

    fn require_data(&self, data_index: u32) -> Result<(), ValidationError> {
        match self.module.data_count {
            None => Err(ValidationError::DataCountSectionRequired),
            Some(count) if data_index >= count => Err(ValidationError::UnknownData),
            Some(_) => Ok(()),
        }
    }

    fn label_types_at(&self, li: u32) -> Result<Vec<ValueType>, ValidationError> {
        if self.ctrls.len() <= li as usize {
            return Err(ValidationError::UnknownLabel);
        }
        let frame = &self.ctrls[self.ctrls.len() - li as usize - 1];
        Ok(if frame.kind == FrameKind::Loop {
            frame.start_types.clone()
        } else {
            frame.end_types.clone()
        })
    }

    fn block_signature(
        &self,
        block_type: BlockType,
    ) -> Result<(Vec<ValueType>, Vec<ValueType>), ValidationError> {
        match block_type {
            BlockType::Empty => Ok((vec![], vec![])),
            BlockType::Value(vt) => Ok((vec![], vec![vt])),
            BlockType::FuncType(ti) => self
                .module
                .types
                .get(ti as usize)
                .map(|ft| (ft.parameters.clone(), ft.return_types.clone()))
                .ok_or(ValidationError::UnknownType),
        }
    }

    fn call(&mut self, func_type: &FunctionType) -> Result<(), ValidationError> {
        self.pop_expecteds(&func_type.parameters)?;
        self.push_vals(&func_type.return_types);
        Ok(())
    }

    fn memory_access(
        &mut self,
        natural_align: u32,
        align: u32,
        value_type: ValueType,
        store: bool,
    ) -> Result<(), ValidationError> {
        self.require_memory()?;
        if align > natural_align {
            return Err(ValidationError::BadAlignment);
        }
        if store {
            self.pop_expected(value_type)?;
            self.pop_expected(I32)?;
        } else {
            self.pop_expected(I32)?;
            self.push_val(Val(value_type));
        }
        Ok(())
    }

    pub fn validate(&mut self, inst: &Instruction) -> Result<(), ValidationError> {
        use InstructionKind as K;

        match (inst.tag, &inst.kind) {
            // Control instructions
            (UNREACHABLE, _) => self.unreachable(),
            (NOP, _) => Ok(()),

            (BLOCK | LOOP | IF, K::Block { block_type }) => {
                let (params, results) = self.block_signature(*block_type)?;
                if inst.tag == IF {
                    self.pop_expected(I32)?;
                }
                self.pop_expecteds(&params)?;
                let kind = match inst.tag {
                    BLOCK => FrameKind::Block,
                    LOOP => FrameKind::Loop,
                    _ => FrameKind::If,
                };
                self.enter(kind, params, results);
                Ok(())
            }

            (ELSE, _) => {
                let frame = self.pop_ctrl()?;
                if frame.kind != FrameKind::If {
                    return Err(ValidationError::ElseWithoutIf);
                }
                self.push_ctrl(FrameKind::Else, frame.start_types, frame.end_types);
                Ok(())
            }

            (END, _) => {
                let frame = self.pop_ctrl()?;
                // an if without else must map its params straight to its results
                if frame.kind == FrameKind::If && frame.start_types != frame.end_types {
                    return Err(ValidationError::TypeMismatch);
                }
                self.push_vals(&frame.end_types);
                if frame.kind == FrameKind::Function {
                    self.finished = true;
                }
                Ok(())
            }

            (BR, K::Br { label_idx }) => {
                let types = self.label_types_at(*label_idx)?;
                self.pop_expecteds(&types)?;
                self.unreachable()
            }

            (BR_IF, K::Br { label_idx }) => {
                self.pop_expected(I32)?;
                let types = self.label_types_at(*label_idx)?;
                self.pop_expecteds(&types)?;
                self.push_vals(&types);
                Ok(())
            }

            (BR_TABLE, K::BrTable { labels, default }) => {
                self.pop_expected(I32)?;
                let default_types = self.label_types_at(*default)?;
                for label in labels {
                    let types = self.label_types_at(*label)?;
                    if types.len() != default_types.len() {
                        return Err(ValidationError::TypeMismatch);
                    }
                    let popped = self.pop_expecteds(&types)?;
                    for val in popped {
                        self.push_val(val);
                    }
                }
                self.pop_expecteds(&default_types)?;
                self.unreachable()
            }

            (RETURN, _) => {
                let results = self.ctrls[0].end_types.clone();
                self.pop_expecteds(&results)?;
                self.unreachable()
            }

            (CALL, K::Call { func_idx }) => {
                let func_type = self
                    .module
                    .func_type(*func_idx)
                    .ok_or(ValidationError::UnknownFunction)?;
                self.call(func_type)
            }

            (CALL_INDIRECT, K::CallIndirect { type_idx, table_idx }) => {
                if self.table(*table_idx)? != FuncRef {
                    return Err(ValidationError::TypeMismatch);
                }
                let func_type = self
                    .module
                    .types
                    .get(*type_idx as usize)
                    .ok_or(ValidationError::UnknownType)?;
                self.pop_expected(I32)?;
                self.call(func_type)
            }

            // Parametric instructions
            (DROP, _) => self.pop_val().map(|_| ()),

            (SELECT, _) => {
                self.pop_expected(I32)?;
                let t1 = self.pop_val()?;
                let t2 = self.pop_val()?;
                if !t1.is_num() || !t2.is_num() {
                    return Err(ValidationError::TypeMismatch);
                }
                match (t1, t2) {
                    (Val(a), Val(b)) if a != b => Err(ValidationError::TypeMismatch),
                    (Unknown, t) | (t, _) => {
                        self.push_val(t);
                        Ok(())
                    }
                }
            }

            (SELECT_T, K::SelectTyped { value_types }) => {
                if value_types.len() != 1 {
                    return Err(ValidationError::InvalidResultArity);
                }
                let t = value_types[0];
                self.pop_expected(I32)?;
                self.pop_expected(t)?;
                self.pop_expected(t)?;
                self.push_val(Val(t));
                Ok(())
            }

            // Variable instructions
            (LOCAL_GET, K::Local { local_idx }) => {
                let local = self.local(*local_idx)?;
                self.push_val(Val(local));
                Ok(())
            }

            (LOCAL_SET, K::Local { local_idx }) => {
                let local = self.local(*local_idx)?;
                self.pop_expected(local).map(|_| ())
            }

            (LOCAL_TEE, K::Local { local_idx }) => {
                let local = self.local(*local_idx)?;
                self.pop_expected(local)?;
                self.push_val(Val(local));
                Ok(())
            }

            (GLOBAL_GET, K::Global { global_idx }) => {
                let global = self.global(*global_idx)?;
                self.push_val(Val(global.value_type));
                Ok(())
            }

            (GLOBAL_SET, K::Global { global_idx }) => {
                let global = self.global(*global_idx)?;
                if !global.mutable {
                    return Err(ValidationError::ImmutableGlobal);
                }
                self.pop_expected(global.value_type).map(|_| ())
            }

            // Table instructions
            (TABLE_GET, K::Table { table_idx }) => {
                let ref_type = self.table(*table_idx)?;
                self.pop_expected(I32)?;
                self.push_val(Val(ref_type));
                Ok(())
            }

            (TABLE_SET, K::Table { table_idx }) => {
                let ref_type = self.table(*table_idx)?;
                self.pop_expected(ref_type)?;
                self.pop_expected(I32).map(|_| ())
            }

            (TABLE_SIZE, K::Table { table_idx }) => {
                self.table(*table_idx)?;
                self.push_val(Val(I32));
                Ok(())
            }

            (TABLE_GROW, K::Table { table_idx }) => {
                let ref_type = self.table(*table_idx)?;
                self.pop_expected(I32)?;
                self.pop_expected(ref_type)?;
                self.push_val(Val(I32));
                Ok(())
            }

            (TABLE_FILL, K::Table { table_idx }) => {
                let ref_type = self.table(*table_idx)?;
                self.pop_expected(I32)?;
                self.pop_expected(ref_type)?;
                self.pop_expected(I32).map(|_| ())
            }

            (
                TABLE_COPY,
                K::TableCopy {
                    dst_table,
                    src_table,
                },
            ) => {
                if self.table(*dst_table)? != self.table(*src_table)? {
                    return Err(ValidationError::TypeMismatch);
                }
                self.pop_expecteds(&[I32, I32, I32]).map(|_| ())
            }

            (TABLE_INIT, K::TableInit { elem_idx, table_idx }) => {
                if self.table(*table_idx)? != self.element(*elem_idx)? {
                    return Err(ValidationError::TypeMismatch);
                }
                self.pop_expecteds(&[I32, I32, I32]).map(|_| ())
            }

            (ELEM_DROP, K::ElemDrop { elem_idx }) => self.element(*elem_idx).map(|_| ()),

            // Memory instructions
            (_, K::Memory { memarg }) => {
                let (natural, value_type, store) = match inst.tag {
                    I32_LOAD => (2, I32, false),
                    I64_LOAD => (3, I64, false),
                    F32_LOAD => (2, F32, false),
                    F64_LOAD => (3, F64, false),
                    I32_LOAD8_S | I32_LOAD8_U => (0, I32, false),
                    I32_LOAD16_S | I32_LOAD16_U => (1, I32, false),
                    I64_LOAD8_S | I64_LOAD8_U => (0, I64, false),
                    I64_LOAD16_S | I64_LOAD16_U => (1, I64, false),
                    I64_LOAD32_S | I64_LOAD32_U => (2, I64, false),
                    I32_STORE => (2, I32, true),
                    I64_STORE => (3, I64, true),
                    F32_STORE => (2, F32, true),
                    F64_STORE => (3, F64, true),
                    I32_STORE8 => (0, I32, true),
                    I32_STORE16 => (1, I32, true),
                    I64_STORE8 => (0, I64, true),
                    I64_STORE16 => (1, I64, true),
                    I64_STORE32 => (2, I64, true),
                    other => return Err(ValidationError::UnknownOpcode(other)),
                };
                self.memory_access(natural, memarg.align, value_type, store)
            }

            (MEMORY_SIZE, _) => {
                self.require_memory()?;
                self.push_val(Val(I32));
                Ok(())
            }

            (MEMORY_GROW, _) => {
                self.require_memory()?;
                self.sig_unary(I32, I32)
            }

            (MEMORY_FILL | MEMORY_COPY, _) => {
                self.require_memory()?;
                self.pop_expecteds(&[I32, I32, I32]).map(|_| ())
            }

            (MEMORY_INIT, K::MemoryInit { data_idx }) => {
                self.require_memory()?;
                self.require_data(*data_idx)?;
                self.pop_expecteds(&[I32, I32, I32]).map(|_| ())
            }

            (DATA_DROP, K::DataDrop { data_idx }) => self.require_data(*data_idx),

            // Numeric constants
            (I32_CONST, _) => {
                self.push_val(Val(I32));
                Ok(())
            }
            (I64_CONST, _) => {
                self.push_val(Val(I64));
                Ok(())
            }
            (F32_CONST, _) => {
                self.push_val(Val(F32));
                Ok(())
            }
            (F64_CONST, _) => {
                self.push_val(Val(F64));
                Ok(())
            }

            // Reference instructions
            (REF_NULL, K::RefNull { ref_type }) => {
                self.push_val(Val(*ref_type));
                Ok(())
            }

            (REF_IS_NULL, _) => {
                if !self.pop_val()?.is_ref() {
                    return Err(ValidationError::TypeMismatch);
                }
                self.push_val(Val(I32));
                Ok(())
            }

            (REF_FUNC, K::RefFunc { func_idx }) => {
                if *func_idx as usize >= self.module.functions.len() {
                    return Err(ValidationError::UnknownFunction);
                }
                if !self.module.is_declared_function(*func_idx) {
                    return Err(ValidationError::UndeclaredFunctionReference);
                }
                self.push_val(Val(FuncRef));
                Ok(())
            }

            // itestop (i32):i32
            (I32_EQZ, _) => self.sig_unary(I32, I32),

            // irelop (i32,i32):i32
            (I32_EQ | I32_NE | I32_LT_S | I32_LT_U | I32_GT_S | I32_GT_U | I32_LE_S | I32_LE_U
            | I32_GE_S | I32_GE_U, _) => self.sig_binary(I32, I32),

            // itestop (i64):i32
            (I64_EQZ, _) => self.sig_unary(I64, I32),

            // irelop (i64,i64):i32
            (I64_EQ | I64_NE | I64_LT_S | I64_LT_U | I64_GT_S | I64_GT_U | I64_LE_S | I64_LE_U
            | I64_GE_S | I64_GE_U, _) => self.sig_binary(I64, I32),

            // frelop (f32,f32):i32
            (F32_EQ | F32_NE | F32_LT | F32_GT | F32_LE | F32_GE, _) => self.sig_binary(F32, I32),

            // frelop (f64,f64):i32
            (F64_EQ | F64_NE | F64_LT | F64_GT | F64_LE | F64_GE, _) => self.sig_binary(F64, I32),

            // iunop (i32):i32
            (I32_CLZ | I32_CTZ | I32_POPCNT | I32_EXTEND8_S | I32_EXTEND16_S, _) => {
                self.sig_unary(I32, I32)
            }

            // ibinop (i32,i32):i32
            (I32_ADD | I32_SUB | I32_MUL | I32_DIV_S | I32_DIV_U | I32_REM_S | I32_REM_U
            | I32_AND | I32_OR | I32_XOR | I32_SHL | I32_SHR_S | I32_SHR_U | I32_ROTL
            | I32_ROTR, _) => self.sig_binary(I32, I32),

            // iunop (i64):i64
            (I64_CLZ | I64_CTZ | I64_POPCNT | I64_EXTEND8_S | I64_EXTEND16_S | I64_EXTEND32_S, _) => {
                self.sig_unary(I64, I64)
            }

            // ibinop (i64,i64):i64
            (I64_ADD | I64_SUB | I64_MUL | I64_DIV_S | I64_DIV_U | I64_REM_S | I64_REM_U
            | I64_AND | I64_OR | I64_XOR | I64_SHL | I64_SHR_S | I64_SHR_U | I64_ROTL
            | I64_ROTR, _) => self.sig_binary(I64, I64),

            // funop (f32):f32
            (F32_ABS | F32_NEG | F32_CEIL | F32_FLOOR | F32_TRUNC | F32_NEAREST | F32_SQRT, _) => {
                self.sig_unary(F32, F32)
            }

            // fbinop (f32,f32):f32
            (F32_ADD | F32_SUB | F32_MUL | F32_DIV | F32_MIN | F32_MAX | F32_COPYSIGN, _) => {
                self.sig_binary(F32, F32)
            }

            // funop (f64):f64
            (F64_ABS | F64_NEG | F64_CEIL | F64_FLOOR | F64_TRUNC | F64_NEAREST | F64_SQRT, _) => {
                self.sig_unary(F64, F64)
            }

            // fbinop (f64,f64):f64
            (F64_ADD | F64_SUB | F64_MUL | F64_DIV | F64_MIN | F64_MAX | F64_COPYSIGN, _) => {
                self.sig_binary(F64, F64)
            }

            // cvtop (i64):i32
            (I32_WRAP_I64, _) => self.sig_unary(I64, I32),

            // cvtop (f32):i32
            (I32_TRUNC_F32_S | I32_TRUNC_F32_U | I32_TRUNC_SAT_F32_S | I32_TRUNC_SAT_F32_U
            | I32_REINTERPRET_F32, _) => self.sig_unary(F32, I32),

            // cvtop (f64):i32
            (I32_TRUNC_F64_S | I32_TRUNC_F64_U | I32_TRUNC_SAT_F64_S | I32_TRUNC_SAT_F64_U, _) => {
                self.sig_unary(F64, I32)
            }

            // cvtop (i32):i64
            (I64_EXTEND_I32_S | I64_EXTEND_I32_U, _) => self.sig_unary(I32, I64),

            // cvtop (f32):i64
            (I64_TRUNC_F32_S | I64_TRUNC_F32_U | I64_TRUNC_SAT_F32_S | I64_TRUNC_SAT_F32_U, _) => {
                self.sig_unary(F32, I64)
            }

            // cvtop (f64):i64
            (I64_TRUNC_F64_S | I64_TRUNC_F64_U | I64_TRUNC_SAT_F64_S | I64_TRUNC_SAT_F64_U
            | I64_REINTERPRET_F64, _) => self.sig_unary(F64, I64),

            // cvtop (i32):f32
            (F32_CONVERT_I32_S | F32_CONVERT_I32_U | F32_REINTERPRET_I32, _) => {
                self.sig_unary(I32, F32)
            }

            // cvtop (i64):f32
            (F32_CONVERT_I64_S | F32_CONVERT_I64_U, _) => self.sig_unary(I64, F32),

            // cvtop (f64):f32
            (F32_DEMOTE_F64, _) => self.sig_unary(F64, F32),

            // cvtop (i32):f64
            (F64_CONVERT_I32_S | F64_CONVERT_I32_U, _) => self.sig_unary(I32, F64),

            // cvtop (i64):f64
            (F64_CONVERT_I64_S | F64_CONVERT_I64_U | F64_REINTERPRET_I64, _) => {
                self.sig_unary(I64, F64)
            }

            // cvtop (f32):f64
            (F64_PROMOTE_F32, _) => self.sig_unary(F32, F64),

            (other, _) => Err(ValidationError::UnknownOpcode(other)),
        }
    }
}
