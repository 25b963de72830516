//! Section sub-parsers. Each one reads exactly one section payload into the
//! module under construction.

use log::debug;
use std::collections::HashSet;

use super::limits;
use super::linear::linearize;
use super::module::{
    ConstExpr, CustomSection, Data, DataMode, Element, ElementMode, Export, ExternKind,
    FunctionBody, FunctionType, Global, GlobalType, Import, ImportDesc, Limits, Locals, Module,
    TableType, ValueType,
};
use super::reader::Reader;
use super::validate::{read_constant_expression, validate_function, ValidationError};
use super::ParseError;
use crate::runtime::memory::MAX_PAGES;
use crate::runtime::Value;

const TYPE_FUNC: u8 = 0x60;
const ELEMKIND_FUNCREF: u8 = 0x00;

// Element segment flags: bit 0 = not active, bit 1 = explicit table (or
// declarative when not active), bit 2 = expressions instead of indices
const ELEM_PASSIVE_OR_DECLARATIVE: u32 = 0b001;
const ELEM_EXPLICIT_TABLE_OR_DECLARATIVE: u32 = 0b010;
const ELEM_EXPRESSIONS: u32 = 0b100;

// Data segment flags
const DATA_ACTIVE: u32 = 0;
const DATA_PASSIVE: u32 = 1;
const DATA_ACTIVE_EXPLICIT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionId {
    Custom,
    Type,
    Import,
    Function,
    Table,
    Memory,
    Global,
    Export,
    Start,
    Element,
    Code,
    Data,
    DataCount,
}

impl SectionId {
    pub fn from_byte(id: u8) -> Option<Self> {
        match id {
            0 => Some(SectionId::Custom),
            1 => Some(SectionId::Type),
            2 => Some(SectionId::Import),
            3 => Some(SectionId::Function),
            4 => Some(SectionId::Table),
            5 => Some(SectionId::Memory),
            6 => Some(SectionId::Global),
            7 => Some(SectionId::Export),
            8 => Some(SectionId::Start),
            9 => Some(SectionId::Element),
            10 => Some(SectionId::Code),
            11 => Some(SectionId::Data),
            12 => Some(SectionId::DataCount),
            _ => None,
        }
    }

    /// Canonical position; data count sits between element and code.
    pub fn rank(&self) -> u8 {
        match self {
            SectionId::Custom => 0,
            SectionId::Type => 1,
            SectionId::Import => 2,
            SectionId::Function => 3,
            SectionId::Table => 4,
            SectionId::Memory => 5,
            SectionId::Global => 6,
            SectionId::Export => 7,
            SectionId::Start => 8,
            SectionId::Element => 9,
            SectionId::DataCount => 10,
            SectionId::Code => 11,
            SectionId::Data => 12,
        }
    }
}

pub fn read_section(
    id: SectionId,
    reader: &mut Reader,
    module: &mut Module,
) -> Result<(), ParseError> {
    match id {
        SectionId::Custom => read_section_custom(reader, module),
        SectionId::Type => read_section_type(reader, module),
        SectionId::Import => read_section_import(reader, module),
        SectionId::Function => read_section_function(reader, module),
        SectionId::Table => read_section_table(reader, module),
        SectionId::Memory => read_section_memory(reader, module),
        SectionId::Global => read_section_global(reader, module),
        SectionId::Export => read_section_export(reader, module),
        SectionId::Start => read_section_start(reader, module),
        SectionId::Element => read_section_element(reader, module),
        SectionId::DataCount => read_section_data_count(reader, module),
        SectionId::Code => read_section_code(reader, module),
        SectionId::Data => read_section_data(reader, module),
    }
}

/// Cross-section checks once every section has been read.
pub fn finish(module: &Module) -> Result<(), ParseError> {
    if module.code.len() as u32 != module.defined_function_count() {
        return Err(ValidationError::FunctionCodeCountMismatch.into());
    }
    if let Some(count) = module.data_count {
        if module.data.len() as u32 != count {
            return Err(ValidationError::DataCountMismatch.into());
        }
    }
    Ok(())
}

// Shared pieces ---------------------------------------------------------------

fn read_count(reader: &mut Reader, limit: u32, min_item_size: usize) -> Result<usize, ParseError> {
    let count = reader.read_vu32()?;
    reader.validate_item_count(count, limit, min_item_size)
}

fn read_value_type(reader: &mut Reader) -> Result<ValueType, ParseError> {
    let b = reader.read_byte()?;
    ValueType::decode(b).ok_or_else(|| ValidationError::InvalidValueType(b).into())
}

fn read_ref_type(reader: &mut Reader) -> Result<ValueType, ParseError> {
    match read_value_type(reader)? {
        vt if vt.is_ref() => Ok(vt),
        _ => Err(ValidationError::MalformedReferenceType.into()),
    }
}

fn read_value_types(reader: &mut Reader, limit: u32) -> Result<Vec<ValueType>, ParseError> {
    let count = read_count(reader, limit, 1)?;
    let mut types = Vec::with_capacity(count);
    for _ in 0..count {
        types.push(read_value_type(reader)?);
    }
    Ok(types)
}

fn read_limits(reader: &mut Reader) -> Result<Limits, ParseError> {
    match reader.read_byte()? {
        0x00 => Ok(Limits {
            min: reader.read_vu32()?,
            max: None,
        }),
        0x01 => {
            let min = reader.read_vu32()?;
            let max = reader.read_vu32()?;
            Ok(Limits {
                min,
                max: Some(max),
            })
        }
        flags => Err(ValidationError::MalformedLimits(flags).into()),
    }
}

fn check_min_max(limits: &Limits) -> Result<(), ParseError> {
    match limits.max {
        Some(max) if limits.min > max => {
            Err(ValidationError::SizeMinimumGreaterThanMaximum.into())
        }
        _ => Ok(()),
    }
}

fn read_table_type(reader: &mut Reader) -> Result<TableType, ParseError> {
    let ref_type = read_ref_type(reader)?;
    let limits = read_limits(reader)?;
    check_min_max(&limits)?;
    if limits.min > limits::MAX_TABLE_SIZE {
        return Err(ParseError::TooLarge);
    }
    Ok(TableType { ref_type, limits })
}

fn read_memory_type(reader: &mut Reader) -> Result<Limits, ParseError> {
    let limits = read_limits(reader)?;
    if limits.min > MAX_PAGES || limits.max.map_or(false, |max| max > MAX_PAGES) {
        return Err(ValidationError::MemorySizeTooLarge.into());
    }
    check_min_max(&limits)?;
    Ok(limits)
}

fn read_global_type(reader: &mut Reader) -> Result<GlobalType, ParseError> {
    let value_type = read_value_type(reader)?;
    let mutable = match reader.read_byte()? {
        0x00 => false,
        0x01 => true,
        _ => return Err(ValidationError::MalformedMutability.into()),
    };
    Ok(GlobalType {
        value_type,
        mutable,
    })
}

fn add_table(module: &mut Module, table: TableType) -> Result<(), ParseError> {
    if !module.tables.is_empty() {
        return Err(ValidationError::MultipleTables.into());
    }
    module.tables.push(table);
    Ok(())
}

fn add_memory(module: &mut Module, memory: Limits) -> Result<(), ParseError> {
    if !module.memories.is_empty() {
        return Err(ValidationError::MultipleMemories.into());
    }
    module.memories.push(memory);
    Ok(())
}

fn check_type_index(module: &Module, type_index: u32) -> Result<u32, ParseError> {
    if type_index as usize >= module.types.len() {
        return Err(ValidationError::UnknownType.into());
    }
    Ok(type_index)
}

/// Function references named outside code make `ref.func` legal inside it.
fn declare(module: &mut Module, expr: &ConstExpr) {
    if let ConstExpr::Value(Value::FuncRef(Some(func_index))) = expr {
        module.declared_functions.insert(*func_index);
    }
}

// Sections --------------------------------------------------------------------

fn read_section_custom(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let name = reader.read_name()?;
    let bytes = reader.read_rest().to_vec();
    debug!("custom section {:?} ({} bytes)", name, bytes.len());
    module.custom_sections.push(CustomSection { name, bytes });
    Ok(())
}

fn read_section_type(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = read_count(reader, limits::MAX_TYPES, 3)?;
    module.types.reserve(count);
    for _ in 0..count {
        let form = reader.read_byte()?;
        if form != TYPE_FUNC {
            return Err(ValidationError::MalformedFunctionType(form).into());
        }
        let parameters = read_value_types(reader, limits::MAX_FUNCTION_PARAMS)?;
        let return_types = read_value_types(reader, limits::MAX_FUNCTION_RETURNS)?;
        module.types.push(FunctionType {
            parameters,
            return_types,
        });
    }
    Ok(())
}

fn read_section_import(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = read_count(reader, limits::MAX_IMPORTS, 4)?;
    module.imports.reserve(count);
    for _ in 0..count {
        let module_name = reader.read_name()?;
        let name = reader.read_name()?;
        let kind = reader.read_byte()?;
        let desc = match ExternKind::decode(kind) {
            Some(ExternKind::Function) => {
                let type_index = check_type_index(module, reader.read_vu32()?)?;
                module.functions.push(type_index);
                module.imported_functions += 1;
                ImportDesc::Function(type_index)
            }
            Some(ExternKind::Table) => {
                let table = read_table_type(reader)?;
                add_table(module, table)?;
                ImportDesc::Table(table)
            }
            Some(ExternKind::Memory) => {
                let memory = read_memory_type(reader)?;
                add_memory(module, memory)?;
                ImportDesc::Memory(memory)
            }
            Some(ExternKind::Global) => {
                let global_type = read_global_type(reader)?;
                module.globals.push(Global {
                    global_type,
                    init: None,
                });
                module.imported_globals += 1;
                ImportDesc::Global(global_type)
            }
            None => return Err(ValidationError::MalformedExternKind(kind).into()),
        };
        module.imports.push(Import {
            module: module_name,
            name,
            desc,
        });
    }
    Ok(())
}

fn read_section_function(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = read_count(reader, limits::MAX_FUNCTIONS, 1)?;
    module.functions.reserve(count);
    for _ in 0..count {
        let type_index = check_type_index(module, reader.read_vu32()?)?;
        module.functions.push(type_index);
    }
    Ok(())
}

fn read_section_table(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = read_count(reader, limits::MAX_TABLES, 3)?;
    for _ in 0..count {
        let table = read_table_type(reader)?;
        add_table(module, table)?;
    }
    Ok(())
}

fn read_section_memory(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = read_count(reader, limits::MAX_MEMORIES, 2)?;
    for _ in 0..count {
        let memory = read_memory_type(reader)?;
        add_memory(module, memory)?;
    }
    Ok(())
}

fn read_section_global(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = read_count(reader, limits::MAX_GLOBALS, 4)?;
    module.globals.reserve(count);
    for _ in 0..count {
        let global_type = read_global_type(reader)?;
        let init = read_constant_expression(reader, module, global_type.value_type)?;
        declare(module, &init);
        module.globals.push(Global {
            global_type,
            init: Some(init),
        });
    }
    Ok(())
}

fn read_section_export(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = read_count(reader, limits::MAX_EXPORTS, 3)?;
    let mut names = HashSet::with_capacity(count);
    module.exports.reserve(count);
    for _ in 0..count {
        let name = reader.read_name()?;
        let kind_byte = reader.read_byte()?;
        let kind =
            ExternKind::decode(kind_byte).ok_or(ValidationError::MalformedExternKind(kind_byte))?;
        let index = reader.read_vu32()?;

        let (len, unknown) = match kind {
            ExternKind::Function => (module.functions.len(), ValidationError::UnknownFunction),
            ExternKind::Table => (module.tables.len(), ValidationError::UnknownTable),
            ExternKind::Memory => (module.memories.len(), ValidationError::UnknownMemory),
            ExternKind::Global => (module.globals.len(), ValidationError::UnknownGlobal),
        };
        if index as usize >= len {
            return Err(unknown.into());
        }
        if !names.insert(name.clone()) {
            return Err(ValidationError::DuplicateExportName(name).into());
        }
        if kind == ExternKind::Function {
            module.declared_functions.insert(index);
        }
        module.exports.push(Export { name, kind, index });
    }
    Ok(())
}

fn read_section_start(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let func_index = reader.read_vu32()?;
    let func_type = module
        .func_type(func_index)
        .ok_or(ValidationError::UnknownFunction)?;
    if !func_type.parameters.is_empty() || !func_type.return_types.is_empty() {
        return Err(ValidationError::InvalidStartFunction.into());
    }
    module.start = Some(func_index);
    Ok(())
}

fn read_section_element(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = read_count(reader, limits::MAX_ELEMENT_SEGMENTS, 2)?;
    module.elements.reserve(count);
    for _ in 0..count {
        let element = read_element(reader, module)?;
        for item in &element.items {
            declare(module, item);
        }
        module.elements.push(element);
    }
    Ok(())
}

fn read_element(reader: &mut Reader, module: &Module) -> Result<Element, ParseError> {
    let flags = reader.read_vu32()?;
    if flags > 7 {
        return Err(ValidationError::MalformedSegmentFlags(flags).into());
    }
    let active = flags & ELEM_PASSIVE_OR_DECLARATIVE == 0;
    let expressions = flags & ELEM_EXPRESSIONS != 0;

    let mut mode = if active {
        let table_index = if flags & ELEM_EXPLICIT_TABLE_OR_DECLARATIVE != 0 {
            reader.read_vu32()?
        } else {
            0
        };
        let offset = read_constant_expression(reader, module, ValueType::I32)?;
        ElementMode::Active {
            table_index,
            offset,
        }
    } else if flags & ELEM_EXPLICIT_TABLE_OR_DECLARATIVE != 0 {
        ElementMode::Declarative
    } else {
        ElementMode::Passive
    };

    // flags 0 and 4 leave the element type implicit
    let ref_type = if flags & !ELEM_EXPRESSIONS == 0 {
        ValueType::FuncRef
    } else if expressions {
        read_ref_type(reader)?
    } else {
        if reader.read_byte()? != ELEMKIND_FUNCREF {
            return Err(ValidationError::MalformedElementKind.into());
        }
        ValueType::FuncRef
    };

    let count = read_count(reader, limits::MAX_TABLE_INIT_ENTRIES, 1)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let item = if expressions {
            read_constant_expression(reader, module, ref_type)?
        } else {
            let func_index = reader.read_vu32()?;
            if func_index as usize >= module.functions.len() {
                return Err(ValidationError::UnknownFunction.into());
            }
            ConstExpr::Value(Value::FuncRef(Some(func_index)))
        };
        items.push(item);
    }

    if let ElementMode::Active { table_index, .. } = &mut mode {
        let table = module
            .tables
            .get(*table_index as usize)
            .ok_or(ValidationError::UnknownTable)?;
        if table.ref_type != ref_type {
            return Err(ValidationError::TypeMismatch.into());
        }
    }

    Ok(Element {
        ref_type,
        items,
        mode,
    })
}

fn read_section_data_count(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = reader.read_vu32()?;
    if count > limits::MAX_DATA_SEGMENTS {
        return Err(ParseError::TooLarge);
    }
    module.data_count = Some(count);
    Ok(())
}

fn read_section_code(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = read_count(reader, limits::MAX_FUNCTIONS, 2)?;
    if count as u32 != module.defined_function_count() {
        return Err(ValidationError::FunctionCodeCountMismatch.into());
    }

    let mut bodies = Vec::with_capacity(count);
    for i in 0..count {
        let size = reader.read_vu32()?;
        if size > limits::MAX_FUNCTION_SIZE {
            return Err(ParseError::TooLarge);
        }
        let mut body = reader.sub_reader(size as usize)?;
        let locals = read_locals(&mut body)?;
        let raw_code = body.read_rest();

        let func_index = module.imported_function_count() + i as u32;
        let func_type = module
            .func_type(func_index)
            .ok_or(ValidationError::UnknownFunction)?;
        let analysis = validate_function(module, func_type, &locals, raw_code)?;
        let linear = linearize(raw_code, &analysis)?;
        debug!(
            "function {} {}: max stack {}, {} blocks, {} linear bytes",
            func_index,
            func_type,
            analysis.max_stack_depth,
            analysis.blocks.len() - 1,
            linear.len()
        );

        bodies.push(FunctionBody {
            locals,
            raw_code: raw_code.to_vec(),
            max_stack_depth: analysis.max_stack_depth,
            linear,
        });
    }
    module.code = bodies;
    Ok(())
}

fn read_locals(reader: &mut Reader) -> Result<Locals, ParseError> {
    let count = read_count(reader, limits::MAX_FUNCTION_LOCALS, 2)?;
    let mut entries = Vec::with_capacity(count);
    let mut total: u64 = 0;
    for _ in 0..count {
        let n = reader.read_vu32()?;
        total += n as u64;
        if total > limits::MAX_FUNCTION_LOCALS as u64 {
            return Err(ParseError::TooLarge);
        }
        let value_type = read_value_type(reader)?;
        entries.push((n, value_type));
    }
    Ok(Locals::new(entries))
}

fn read_section_data(reader: &mut Reader, module: &mut Module) -> Result<(), ParseError> {
    let count = read_count(reader, limits::MAX_DATA_SEGMENTS, 2)?;
    if let Some(expected) = module.data_count {
        if count as u32 != expected {
            return Err(ValidationError::DataCountMismatch.into());
        }
    }
    module.data.reserve(count);
    for _ in 0..count {
        let flags = reader.read_vu32()?;
        let mode = match flags {
            DATA_PASSIVE => DataMode::Passive,
            DATA_ACTIVE | DATA_ACTIVE_EXPLICIT => {
                let memory_index = if flags == DATA_ACTIVE_EXPLICIT {
                    reader.read_vu32()?
                } else {
                    0
                };
                if memory_index as usize >= module.memories.len() {
                    return Err(ValidationError::UnknownMemory.into());
                }
                let offset = read_constant_expression(reader, module, ValueType::I32)?;
                DataMode::Active {
                    memory_index,
                    offset,
                }
            }
            _ => return Err(ValidationError::MalformedSegmentFlags(flags).into()),
        };
        let init = reader.read_byte_vec()?.to_vec();
        module.data.push(Data { init, mode });
    }
    Ok(())
}
