use std::collections::BTreeSet;
use std::fmt;

use crate::runtime::{RuntimeError, Value};

/// A parsed, validated and linearized module.
///
/// Index spaces (functions, tables, memories, globals) start with the
/// imported entities, followed by the ones the module defines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    /// Type index of every function in the function index space.
    pub functions: Vec<u32>,
    pub tables: Vec<TableType>,
    pub memories: Vec<Limits>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<Element>,
    pub data_count: Option<u32>,
    /// Bodies of the defined functions, in function index order after the
    /// imported functions.
    pub code: Vec<FunctionBody>,
    pub data: Vec<Data>,
    pub custom_sections: Vec<CustomSection>,

    pub(crate) imported_functions: u32,
    pub(crate) imported_globals: u32,
    pub(crate) declared_functions: BTreeSet<u32>,
}

impl Module {
    pub fn imported_function_count(&self) -> u32 {
        self.imported_functions
    }

    pub fn imported_global_count(&self) -> u32 {
        self.imported_globals
    }

    /// Number of functions the module defines itself, as declared by the
    /// function section.
    pub fn defined_function_count(&self) -> u32 {
        self.functions.len() as u32 - self.imported_functions
    }

    pub fn func_type(&self, func_index: u32) -> Option<&FunctionType> {
        let type_index = *self.functions.get(func_index as usize)?;
        self.types.get(type_index as usize)
    }

    /// Body of a defined function addressed by its function index.
    pub fn body(&self, func_index: u32) -> Option<&FunctionBody> {
        let defined = func_index.checked_sub(self.imported_functions)?;
        self.code.get(defined as usize)
    }

    /// Whether `ref.func` may name this function inside a function body.
    pub fn is_declared_function(&self, func_index: u32) -> bool {
        self.declared_functions.contains(&func_index)
    }

    // Export introspection ----------------------------------------------------

    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    pub fn export(&self, index: usize) -> Result<&Export, RuntimeError> {
        self.exports
            .get(index)
            .ok_or_else(|| RuntimeError::NotFound(format!("export #{}", index)))
    }

    pub fn export_by_name(&self, name: &str) -> Result<&Export, RuntimeError> {
        self.exports
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| RuntimeError::NotFound(format!("export {:?}", name)))
    }

    /// Describe any entity of the module, exported or not.
    pub fn describe(&self, kind: ExternKind, index: u32) -> Result<ExternDescriptor, RuntimeError> {
        let not_found = || RuntimeError::NotFound(format!("{} #{}", kind, index));
        let i = index as usize;
        match kind {
            ExternKind::Function => self
                .func_type(index)
                .map(|ty| ExternDescriptor::Function(ty.clone()))
                .ok_or_else(not_found),
            ExternKind::Table => self
                .tables
                .get(i)
                .map(|t| ExternDescriptor::Table(*t))
                .ok_or_else(not_found),
            ExternKind::Memory => self
                .memories
                .get(i)
                .map(|m| ExternDescriptor::Memory(*m))
                .ok_or_else(not_found),
            ExternKind::Global => self
                .globals
                .get(i)
                .map(|g| ExternDescriptor::Global(g.global_type))
                .ok_or_else(not_found),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    // Number types
    I32,
    I64,
    F32,
    F64,
    // Reference types
    FuncRef,
    ExternRef,
}

impl ValueType {
    pub fn decode(byte: u8) -> Option<Self> {
        match byte {
            0x7f => Some(ValueType::I32),
            0x7e => Some(ValueType::I64),
            0x7d => Some(ValueType::F32),
            0x7c => Some(ValueType::F64),
            0x70 => Some(ValueType::FuncRef),
            0x6f => Some(ValueType::ExternRef),
            _ => None,
        }
    }

    pub fn is_num(&self) -> bool {
        matches!(
            self,
            ValueType::I32 | ValueType::I64 | ValueType::F32 | ValueType::F64
        )
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, ValueType::FuncRef | ValueType::ExternRef)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ValueType::I32 => "i32",
                ValueType::I64 => "i64",
                ValueType::F32 => "f32",
                ValueType::F64 => "f64",
                ValueType::FuncRef => "funcref",
                ValueType::ExternRef => "externref",
            }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionType {
    pub parameters: Vec<ValueType>,
    pub return_types: Vec<ValueType>,
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let list = |types: &[ValueType]| {
            types
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<String>>()
                .join(", ")
        };
        write!(
            f,
            "({}) -> {}",
            list(&self.parameters),
            match self.return_types.len() {
                0 => "nil".to_string(),
                1 => list(&self.return_types),
                _ => format!("({})", list(&self.return_types)),
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl fmt::Display for Limits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{{min {}, max {}}}", self.min, max),
            None => write!(f, "{{min {}}}", self.min),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub ref_type: ValueType,
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub value_type: ValueType,
    pub mutable: bool,
}

/// A constant expression, already evaluated where the module alone allows it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstExpr {
    Value(Value),
    /// `global.get` of an imported global; only known at instantiation.
    GlobalGet(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub global_type: GlobalType,
    /// `None` for imported globals.
    pub init: Option<ConstExpr>,
}

impl Global {
    /// The parse-time initial value, when the initialiser is a plain
    /// constant.
    pub fn initial_value(&self) -> Option<Value> {
        match self.init {
            Some(ConstExpr::Value(v)) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternKind {
    Function,
    Table,
    Memory,
    Global,
}

impl ExternKind {
    pub fn decode(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(ExternKind::Function),
            0x01 => Some(ExternKind::Table),
            0x02 => Some(ExternKind::Memory),
            0x03 => Some(ExternKind::Global),
            _ => None,
        }
    }
}

impl fmt::Display for ExternKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ExternKind::Function => "func",
                ExternKind::Table => "table",
                ExternKind::Memory => "memory",
                ExternKind::Global => "global",
            }
        )
    }
}

/// Type information for one entity, as returned by [`Module::describe`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExternDescriptor {
    Function(FunctionType),
    Table(TableType),
    Memory(Limits),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportDesc {
    Function(u32),
    Table(TableType),
    Memory(Limits),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub kind: ExternKind,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementMode {
    Passive,
    Active { table_index: u32, offset: ConstExpr },
    Declarative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub ref_type: ValueType,
    pub items: Vec<ConstExpr>,
    pub mode: ElementMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataMode {
    Passive,
    Active { memory_index: u32, offset: ConstExpr },
}

#[derive(Clone, PartialEq)]
pub struct Data {
    pub init: Vec<u8>,
    pub mode: DataMode,
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Data")
            .field("init", &hex::encode(&self.init))
            .field("mode", &self.mode)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomSection {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Declared locals as run-length `(count, type)` entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Locals {
    entries: Vec<(u32, ValueType)>,
    /// Running total of counts; `ends[i]` is one past the last index of entry `i`.
    ends: Vec<u64>,
}

impl Locals {
    pub fn new(entries: Vec<(u32, ValueType)>) -> Self {
        let ends = entries
            .iter()
            .scan(0u64, |total, (count, _)| {
                *total += *count as u64;
                Some(*total)
            })
            .collect();
        Self { entries, ends }
    }

    pub fn len(&self) -> u64 {
        self.ends.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (u32, ValueType)> {
        self.entries.iter()
    }

    pub fn get(&self, index: u32) -> Option<&ValueType> {
        let entry = self.ends.partition_point(|&end| end <= index as u64);
        self.entries.get(entry).map(|(_, value_type)| value_type)
    }
}

#[derive(Clone, PartialEq)]
pub struct FunctionBody {
    pub locals: Locals,
    /// The expression bytes as they appeared in the code section.
    pub raw_code: Vec<u8>,
    /// Operand stack high-water mark, excluding params and locals.
    pub max_stack_depth: u32,
    /// Linearized bytecode consumed by the executor.
    pub linear: Vec<u8>,
}

impl fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FunctionBody")
            .field("locals", &self.locals)
            .field("raw_code", &hex::encode(&self.raw_code))
            .field("max_stack_depth", &self.max_stack_depth)
            .field("linear_len", &self.linear.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_type_display() {
        let ty = FunctionType {
            parameters: vec![ValueType::I32, ValueType::I64],
            return_types: vec![ValueType::F32],
        };
        assert_eq!(ty.to_string(), "(i32, i64) -> f32");

        let ty = FunctionType {
            parameters: vec![],
            return_types: vec![ValueType::I32, ValueType::FuncRef],
        };
        assert_eq!(ty.to_string(), "() -> (i32, funcref)");
        assert_eq!(FunctionType::default().to_string(), "() -> nil");
    }

    #[test]
    fn test_locals_get() {
        let locals = Locals::new(vec![(2, ValueType::I32), (1, ValueType::F64)]);
        assert_eq!(locals.len(), 3);
        assert_eq!(locals.get(1), Some(&ValueType::I32));
        assert_eq!(locals.get(2), Some(&ValueType::F64));
        assert_eq!(locals.get(3), None);

        // empty runs are skipped
        let locals = Locals::new(vec![
            (0, ValueType::I64),
            (1, ValueType::F32),
            (0, ValueType::I32),
            (u32::MAX, ValueType::FuncRef),
        ]);
        assert_eq!(locals.len(), 1 + u32::MAX as u64);
        assert_eq!(locals.get(0), Some(&ValueType::F32));
        assert_eq!(locals.get(1), Some(&ValueType::FuncRef));
        assert_eq!(locals.get(u32::MAX), Some(&ValueType::FuncRef));
        assert_eq!(Locals::default().get(0), None);
        assert!(Locals::default().is_empty());
    }

    #[test]
    fn test_value_type_rejects_v128() {
        assert_eq!(ValueType::decode(0x7f), Some(ValueType::I32));
        assert_eq!(ValueType::decode(0x7b), None);
    }

    #[test]
    fn test_describe_not_found() {
        let module = Module::default();
        assert!(matches!(
            module.describe(ExternKind::Memory, 0),
            Err(RuntimeError::NotFound(_))
        ));
        assert!(matches!(module.export(0), Err(RuntimeError::NotFound(_))));
    }
}
