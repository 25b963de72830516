//! Call frames
//!
//! A frame only records where its function's locals start on the shared
//! value stack and where to resume; operands live above the locals.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Function index in the module
    pub func_index: u32,
    /// Resume offset in the function's linear code
    pub ip: usize,
    /// Stack index of local 0 (the first parameter)
    pub locals_offset: usize,
}

impl Frame {
    pub fn new(func_index: u32, locals_offset: usize) -> Self {
        Frame {
            func_index,
            ip: 0,
            locals_offset,
        }
    }
}
