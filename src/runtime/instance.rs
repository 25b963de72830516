//! WebAssembly module instance
//!
//! An instance holds all mutable state of one instantiation: memory, tables,
//! globals, the segments not yet dropped, and the value and frame stacks
//! used while a call runs. It borrows the module it was created from, which
//! stays read-only.

use log::trace;

use super::frame::Frame;
use super::memory::Memory;
use super::stack::Stack;
use super::table::Table;
use super::{Config, RuntimeError, Value};
use crate::parser::module::{ConstExpr, DataMode, ElementMode, ExternKind, Module};

pub struct Instance<'m> {
    pub(crate) module: &'m Module,
    pub(crate) config: Config,
    pub(crate) memory: Option<Memory>,
    pub(crate) tables: Vec<Table>,
    pub(crate) globals: Vec<u64>,
    /// Data segment bytes; dropped segments are empty.
    pub(crate) data: Vec<&'m [u8]>,
    /// Evaluated element segments; dropped segments are empty.
    pub(crate) elements: Vec<Vec<u64>>,
    pub(crate) stack: Stack,
    pub(crate) frames: Vec<Frame>,
}

impl<'m> Instance<'m> {
    pub fn new(module: &'m Module) -> Result<Self, RuntimeError> {
        Self::with_config(module, Config::default())
    }

    /// Instantiate: allocate memory and tables, seed globals, apply active
    /// segments in module order, then run the start function.
    pub fn with_config(module: &'m Module, config: Config) -> Result<Self, RuntimeError> {
        if let Some(import) = module.imports.first() {
            return Err(RuntimeError::UnresolvedImport {
                module: import.module.clone(),
                name: import.name.clone(),
            });
        }

        let memory = module
            .memories
            .first()
            .map(|limits| Memory::new(limits.min, limits.max))
            .transpose()?;
        let tables = module
            .tables
            .iter()
            .map(|table_type| Table::new(*table_type))
            .collect::<Result<Vec<_>, _>>()?;
        trace!(
            "instantiate: {} memory pages, {} tables",
            memory.as_ref().map_or(0, |m| m.size()),
            tables.len()
        );

        let mut globals = Vec::with_capacity(module.globals.len());
        for (i, global) in module.globals.iter().enumerate() {
            let init = global
                .init
                .as_ref()
                .ok_or_else(|| RuntimeError::NotFound(format!("initialiser of global #{}", i)))?;
            let slot = eval(init, &globals)?;
            globals.push(slot);
        }

        let elements = module
            .elements
            .iter()
            .map(|element| {
                element
                    .items
                    .iter()
                    .map(|item| eval(item, &globals))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut instance = Instance {
            module,
            config,
            memory,
            tables,
            globals,
            data: module.data.iter().map(|d| d.init.as_slice()).collect(),
            elements,
            stack: Stack::with_capacity(64),
            frames: Vec::new(),
        };
        instance.init_elements()?;
        instance.init_data()?;

        if let Some(start) = module.start {
            trace!("instantiate: start function {}", start);
            instance.call(start, &[])?;
        }
        Ok(instance)
    }

    fn init_elements(&mut self) -> Result<(), RuntimeError> {
        let module = self.module;
        for (i, element) in module.elements.iter().enumerate() {
            match &element.mode {
                ElementMode::Active {
                    table_index,
                    offset,
                } => {
                    let offset = eval(offset, &self.globals)? as u32;
                    let segment = std::mem::take(&mut self.elements[i]);
                    trace!(
                        "instantiate: element {} -> table {} at {} ({} refs)",
                        i,
                        table_index,
                        offset,
                        segment.len()
                    );
                    let table = self
                        .tables
                        .get_mut(*table_index as usize)
                        .ok_or_else(|| RuntimeError::NotFound(format!("table #{}", table_index)))?;
                    table.init(offset, &segment, 0, segment.len() as u32)?;
                }
                ElementMode::Declarative => self.elements[i] = Vec::new(),
                ElementMode::Passive => {}
            }
        }
        Ok(())
    }

    fn init_data(&mut self) -> Result<(), RuntimeError> {
        let module = self.module;
        for (i, data) in module.data.iter().enumerate() {
            if let DataMode::Active { offset, .. } = &data.mode {
                let offset = eval(offset, &self.globals)? as u32;
                trace!(
                    "instantiate: data {} -> memory at {} ({} bytes)",
                    i,
                    offset,
                    data.init.len()
                );
                let memory = self
                    .memory
                    .as_mut()
                    .ok_or_else(|| RuntimeError::NotFound("memory #0".to_string()))?;
                memory.init(offset, &data.init, 0, data.init.len() as u32)?;
                self.data[i] = &[];
            }
        }
        Ok(())
    }

    /// Call a function by index.
    ///
    /// `params` must match the function's parameter types exactly. After an
    /// error the instance stays usable; effects already made are kept.
    pub fn call(&mut self, func_index: u32, params: &[Value]) -> Result<Vec<Value>, RuntimeError> {
        let module = self.module;
        let func_type = module
            .func_type(func_index)
            .ok_or_else(|| RuntimeError::NotFound(format!("func #{}", func_index)))?;

        if params.len() != func_type.parameters.len() {
            return Err(RuntimeError::ValidationFailed(format!(
                "expected {} arguments, got {}",
                func_type.parameters.len(),
                params.len()
            )));
        }
        for (i, (param, expected)) in params.iter().zip(&func_type.parameters).enumerate() {
            if param.typ() != *expected {
                return Err(RuntimeError::ValidationFailed(format!(
                    "argument {} is {}, expected {}",
                    i,
                    param.typ(),
                    expected
                )));
            }
        }

        self.stack.clear();
        self.frames.clear();
        for param in params {
            self.stack.push(param.to_slot());
        }

        let result = self.execute(func_index).and_then(|()| {
            let slots = self.stack.top(func_type.return_types.len())?;
            Ok(func_type
                .return_types
                .iter()
                .zip(slots)
                .map(|(ty, slot)| Value::from_slot(*ty, *slot))
                .collect())
        });

        self.stack.clear();
        self.frames.clear();
        result
    }

    /// Call an exported function by name.
    pub fn call_export(&mut self, name: &str, params: &[Value]) -> Result<Vec<Value>, RuntimeError> {
        let module = self.module;
        let export = module.export_by_name(name)?;
        if export.kind != ExternKind::Function {
            return Err(RuntimeError::Misuse(format!(
                "export {:?} is a {}, not a function",
                name, export.kind
            )));
        }
        self.call(export.index, params)
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn memory(&self) -> Option<&Memory> {
        self.memory.as_ref()
    }

    pub fn memory_mut(&mut self) -> Option<&mut Memory> {
        self.memory.as_mut()
    }

    pub fn global(&self, index: u32) -> Result<Value, RuntimeError> {
        let global = self
            .module
            .globals
            .get(index as usize)
            .ok_or_else(|| RuntimeError::NotFound(format!("global #{}", index)))?;
        let slot = self
            .globals
            .get(index as usize)
            .ok_or_else(|| RuntimeError::NotFound(format!("global #{}", index)))?;
        Ok(Value::from_slot(global.global_type.value_type, *slot))
    }

    /// Set a mutable global from the host.
    pub fn set_global(&mut self, index: u32, value: Value) -> Result<(), RuntimeError> {
        let global = self
            .module
            .globals
            .get(index as usize)
            .ok_or_else(|| RuntimeError::NotFound(format!("global #{}", index)))?;
        if !global.global_type.mutable {
            return Err(RuntimeError::Misuse(format!("global #{} is immutable", index)));
        }
        if value.typ() != global.global_type.value_type {
            return Err(RuntimeError::ValidationFailed(format!(
                "global #{} is {}, got {}",
                index,
                global.global_type.value_type,
                value.typ()
            )));
        }
        self.globals[index as usize] = value.to_slot();
        Ok(())
    }

    pub fn table_len(&self, index: u32) -> Result<u32, RuntimeError> {
        self.tables
            .get(index as usize)
            .map(|t| t.size())
            .ok_or_else(|| RuntimeError::NotFound(format!("table #{}", index)))
    }
}

/// Evaluate a constant expression against the globals seeded so far.
fn eval(expr: &ConstExpr, globals: &[u64]) -> Result<u64, RuntimeError> {
    match expr {
        ConstExpr::Value(v) => Ok(v.to_slot()),
        ConstExpr::GlobalGet(index) => globals
            .get(*index as usize)
            .copied()
            .ok_or_else(|| RuntimeError::NotFound(format!("global #{}", index))),
    }
}
