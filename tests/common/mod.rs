//! Common test utilities shared between integration tests
//!
//! `ModuleBuilder` assembles binary modules section by section so tests can
//! describe a module by its functions instead of by hand-counted bytes.

#![allow(dead_code)]

pub const I32: u8 = 0x7f;
pub const I64: u8 = 0x7e;
pub const F32: u8 = 0x7d;
pub const F64: u8 = 0x7c;
pub const FUNCREF: u8 = 0x70;
pub const EXTERNREF: u8 = 0x6f;

pub const KIND_FUNC: u8 = 0x00;
pub const KIND_TABLE: u8 = 0x01;
pub const KIND_MEMORY: u8 = 0x02;
pub const KIND_GLOBAL: u8 = 0x03;

pub const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

pub fn uleb(mut v: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

pub fn sleb(mut v: i64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// `i32.const v`
pub fn i32_const(v: i32) -> Vec<u8> {
    let mut out = vec![0x41];
    out.extend(sleb(v as i64));
    out
}

/// `i64.const v`
pub fn i64_const(v: i64) -> Vec<u8> {
    let mut out = vec![0x42];
    out.extend(sleb(v));
    out
}

fn name(s: &str) -> Vec<u8> {
    let mut out = uleb(s.len() as u64);
    out.extend_from_slice(s.as_bytes());
    out
}

fn vector(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = uleb(items.len() as u64);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

pub fn section(id: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![id];
    out.extend(uleb(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

/// Header followed by the given raw sections.
pub fn module_with(sections: &[Vec<u8>]) -> Vec<u8> {
    let mut out = HEADER.to_vec();
    for s in sections {
        out.extend_from_slice(s);
    }
    out
}

struct Func {
    type_index: u32,
    locals: Vec<(u32, u8)>,
    body: Vec<u8>,
}

#[derive(Default)]
pub struct ModuleBuilder {
    types: Vec<(Vec<u8>, Vec<u8>)>,
    imports: Vec<Vec<u8>>,
    funcs: Vec<Func>,
    tables: Vec<Vec<u8>>,
    memories: Vec<Vec<u8>>,
    globals: Vec<Vec<u8>>,
    exports: Vec<Vec<u8>>,
    start: Option<u32>,
    elements: Vec<Vec<u8>>,
    data: Vec<Vec<u8>>,
    data_count: bool,
    customs: Vec<Vec<u8>>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of a signature, adding it if new.
    pub fn type_index(&mut self, params: &[u8], results: &[u8]) -> u32 {
        let sig = (params.to_vec(), results.to_vec());
        if let Some(i) = self.types.iter().position(|t| *t == sig) {
            return i as u32;
        }
        self.types.push(sig);
        (self.types.len() - 1) as u32
    }

    pub fn with_type(mut self, params: &[u8], results: &[u8]) -> Self {
        self.type_index(params, results);
        self
    }

    /// A defined function; `body` is the instruction sequence without its
    /// final `end`.
    pub fn func(mut self, params: &[u8], results: &[u8], locals: &[(u32, u8)], body: &[u8]) -> Self {
        let type_index = self.type_index(params, results);
        let mut body = body.to_vec();
        body.push(0x0b);
        self.funcs.push(Func {
            type_index,
            locals: locals.to_vec(),
            body,
        });
        self
    }

    /// Like `func`, but the body is taken exactly as given.
    pub fn func_raw(mut self, params: &[u8], results: &[u8], body: &[u8]) -> Self {
        let type_index = self.type_index(params, results);
        self.funcs.push(Func {
            type_index,
            locals: Vec::new(),
            body: body.to_vec(),
        });
        self
    }

    pub fn import_func(mut self, module: &str, field: &str, params: &[u8], results: &[u8]) -> Self {
        let type_index = self.type_index(params, results);
        let mut import = name(module);
        import.extend(name(field));
        import.push(KIND_FUNC);
        import.extend(uleb(type_index as u64));
        self.imports.push(import);
        self
    }

    pub fn table(mut self, ref_type: u8, min: u32, max: Option<u32>) -> Self {
        let mut table = vec![ref_type];
        table.extend(limits(min, max));
        self.tables.push(table);
        self
    }

    pub fn memory(mut self, min: u32, max: Option<u32>) -> Self {
        self.memories.push(limits(min, max));
        self
    }

    /// A global; `init` is the constant expression without its `end`.
    pub fn global(mut self, value_type: u8, mutable: bool, init: &[u8]) -> Self {
        let mut global = vec![value_type, mutable as u8];
        global.extend_from_slice(init);
        global.push(0x0b);
        self.globals.push(global);
        self
    }

    pub fn export(mut self, field: &str, kind: u8, index: u32) -> Self {
        let mut export = name(field);
        export.push(kind);
        export.extend(uleb(index as u64));
        self.exports.push(export);
        self
    }

    pub fn start(mut self, func_index: u32) -> Self {
        self.start = Some(func_index);
        self
    }

    /// Active segment for table 0 at a constant offset.
    pub fn active_elem(mut self, offset: i32, funcs: &[u32]) -> Self {
        let mut elem = uleb(0);
        elem.extend(i32_const(offset));
        elem.push(0x0b);
        elem.extend(vector(&funcs.iter().map(|f| uleb(*f as u64)).collect::<Vec<_>>()));
        self.elements.push(elem);
        self
    }

    pub fn passive_elem(mut self, funcs: &[u32]) -> Self {
        let mut elem = uleb(1);
        elem.push(0x00);
        elem.extend(vector(&funcs.iter().map(|f| uleb(*f as u64)).collect::<Vec<_>>()));
        self.elements.push(elem);
        self
    }

    pub fn declared_elem(mut self, funcs: &[u32]) -> Self {
        let mut elem = uleb(3);
        elem.push(0x00);
        elem.extend(vector(&funcs.iter().map(|f| uleb(*f as u64)).collect::<Vec<_>>()));
        self.elements.push(elem);
        self
    }

    /// A raw element segment, flags included.
    pub fn elem_raw(mut self, segment: &[u8]) -> Self {
        self.elements.push(segment.to_vec());
        self
    }

    /// Active segment for memory 0 at a constant offset.
    pub fn active_data(mut self, offset: i32, bytes: &[u8]) -> Self {
        let mut data = uleb(0);
        data.extend(i32_const(offset));
        data.push(0x0b);
        data.extend(uleb(bytes.len() as u64));
        data.extend_from_slice(bytes);
        self.data.push(data);
        self
    }

    pub fn passive_data(mut self, bytes: &[u8]) -> Self {
        let mut data = uleb(1);
        data.extend(uleb(bytes.len() as u64));
        data.extend_from_slice(bytes);
        self.data.push(data);
        self
    }

    /// Emit a data count section matching the data segments.
    pub fn data_count(mut self) -> Self {
        self.data_count = true;
        self
    }

    pub fn custom(mut self, field: &str, bytes: &[u8]) -> Self {
        let mut custom = name(field);
        custom.extend_from_slice(bytes);
        self.customs.push(custom);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = HEADER.to_vec();

        if !self.types.is_empty() {
            let types: Vec<Vec<u8>> = self
                .types
                .iter()
                .map(|(params, results)| {
                    let mut t = vec![0x60];
                    t.extend(uleb(params.len() as u64));
                    t.extend_from_slice(params);
                    t.extend(uleb(results.len() as u64));
                    t.extend_from_slice(results);
                    t
                })
                .collect();
            out.extend(section(1, &vector(&types)));
        }
        if !self.imports.is_empty() {
            out.extend(section(2, &vector(&self.imports)));
        }
        if !self.funcs.is_empty() {
            let funcs: Vec<Vec<u8>> = self.funcs.iter().map(|f| uleb(f.type_index as u64)).collect();
            out.extend(section(3, &vector(&funcs)));
        }
        if !self.tables.is_empty() {
            out.extend(section(4, &vector(&self.tables)));
        }
        if !self.memories.is_empty() {
            out.extend(section(5, &vector(&self.memories)));
        }
        if !self.globals.is_empty() {
            out.extend(section(6, &vector(&self.globals)));
        }
        if !self.exports.is_empty() {
            out.extend(section(7, &vector(&self.exports)));
        }
        if let Some(start) = self.start {
            out.extend(section(8, &uleb(start as u64)));
        }
        if !self.elements.is_empty() {
            out.extend(section(9, &vector(&self.elements)));
        }
        if self.data_count {
            out.extend(section(12, &uleb(self.data.len() as u64)));
        }
        if !self.funcs.is_empty() {
            let bodies: Vec<Vec<u8>> = self
                .funcs
                .iter()
                .map(|f| {
                    let locals: Vec<Vec<u8>> = f
                        .locals
                        .iter()
                        .map(|(n, t)| {
                            let mut l = uleb(*n as u64);
                            l.push(*t);
                            l
                        })
                        .collect();
                    let mut body = vector(&locals);
                    body.extend_from_slice(&f.body);
                    let mut sized = uleb(body.len() as u64);
                    sized.extend(body);
                    sized
                })
                .collect();
            out.extend(section(10, &vector(&bodies)));
        }
        if !self.data.is_empty() {
            out.extend(section(11, &vector(&self.data)));
        }
        for custom in &self.customs {
            out.extend(section(0, custom));
        }
        out
    }
}

fn limits(min: u32, max: Option<u32>) -> Vec<u8> {
    match max {
        None => {
            let mut l = vec![0x00];
            l.extend(uleb(min as u64));
            l
        }
        Some(max) => {
            let mut l = vec![0x01];
            l.extend(uleb(min as u64));
            l.extend(uleb(max as u64));
            l
        }
    }
}

/// `(func (export "add") (param i32 i32) (result i32) local.get 0 local.get 1 i32.add)`
pub fn add_module() -> Vec<u8> {
    ModuleBuilder::new()
        .func(&[I32, I32], &[I32], &[], &[0x20, 0x00, 0x20, 0x01, 0x6a])
        .export("add", KIND_FUNC, 0)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leb() {
        assert_eq!(uleb(0), vec![0x00]);
        assert_eq!(uleb(624485), vec![0xe5, 0x8e, 0x26]);
        assert_eq!(sleb(-1), vec![0x7f]);
        assert_eq!(sleb(64), vec![0xc0, 0x00]);
        assert_eq!(sleb(-123456), vec![0xc0, 0xbb, 0x78]);
    }

    #[test]
    fn test_add_module_bytes() {
        assert_eq!(
            hex::encode(add_module()),
            "0061736d0100000001070160027f7f017f030201000707010361646400000a\
             09010700200020016a0b"
        );
    }
}
