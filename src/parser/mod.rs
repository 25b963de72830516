//! Binary module parsing.
//!
//! `parse` runs the whole front end in one pass over the input: sections are
//! decoded in order, and every function body is validated and linearized as
//! soon as the code section reaches it.

pub mod instruction;
pub mod limits;
pub mod linear;
pub mod module;
pub mod opcode;
pub mod reader;
pub mod sections;
pub mod validate;

use log::{debug, warn};
use thiserror::Error;

use module::Module;
use reader::Reader;
use sections::SectionId;
use validate::ValidationError;

const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];
const VERSION: u32 = 1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("magic header not detected")]
    InvalidMagic,

    #[error("unknown binary version")]
    InvalidVersion,

    #[error("unexpected end")]
    UnexpectedEof,

    #[error("malformed section id {0}")]
    UnknownSection(u8),

    #[error("integer too large")]
    TooLarge,

    #[error("out of memory")]
    OutOfMemory,

    #[error("{0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("disassembly output failed")]
    Format(#[from] std::fmt::Error),
}

/// Parse, validate and linearize a binary module.
pub fn parse(bytes: &[u8]) -> Result<Module, ParseError> {
    let result = parse_module(bytes);
    if let Err(e) = &result {
        warn!("module rejected: {}", e);
    }
    result
}

fn parse_module(bytes: &[u8]) -> Result<Module, ParseError> {
    let mut reader = Reader::new(bytes);
    read_header(&mut reader)?;

    let mut module = Module::default();
    let mut last_rank = 0;

    while !reader.is_empty() {
        let id = reader.read_byte()?;
        let size = reader.read_vu32()?;
        let section_id = SectionId::from_byte(id).ok_or(ParseError::UnknownSection(id))?;
        let mut section = reader.sub_reader(size as usize)?;

        if section_id != SectionId::Custom {
            let rank = section_id.rank();
            if rank <= last_rank {
                return Err(ValidationError::SectionOutOfOrder(id).into());
            }
            last_rank = rank;
        }

        debug!("section {:?} ({} bytes)", section_id, size);

        match sections::read_section(section_id, &mut section, &mut module) {
            // the section ended before its contents did
            Err(ParseError::UnexpectedEof) if !reader.is_empty() => {
                return Err(ValidationError::SectionSizeMismatch(id).into());
            }
            result => result?,
        }
        if !section.is_empty() {
            return Err(ValidationError::SectionSizeMismatch(id).into());
        }
    }

    sections::finish(&module)?;
    Ok(module)
}

fn read_header(reader: &mut Reader) -> Result<(), ParseError> {
    let magic = reader.read_bytes(4).map_err(|_| ParseError::InvalidMagic)?;
    if magic != MAGIC {
        return Err(ParseError::InvalidMagic);
    }
    let version = reader.read_u32().map_err(|_| ParseError::InvalidVersion)?;
    if version != VERSION {
        return Err(ParseError::InvalidVersion);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header() {
        assert!(parse(&[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]).is_ok());
        assert_eq!(
            parse(&[0x00, 0x61, 0x73, 0x6e, 0x01, 0x00, 0x00, 0x00]),
            Err(ParseError::InvalidMagic)
        );
        assert_eq!(parse(&[0x00, 0x61]), Err(ParseError::InvalidMagic));
        assert_eq!(
            parse(&[0x00, 0x61, 0x73, 0x6d, 0x02, 0x00, 0x00, 0x00]),
            Err(ParseError::InvalidVersion)
        );
        assert_eq!(
            parse(&[0x00, 0x61, 0x73, 0x6d, 0x01]),
            Err(ParseError::InvalidVersion)
        );
    }

    #[test]
    fn test_unknown_section() {
        let bytes = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, 0x0d, 0x00];
        assert_eq!(parse(&bytes), Err(ParseError::UnknownSection(13)));
    }

    #[test]
    fn test_section_runs_past_input() {
        // type section claims 5 bytes, only 1 present
        let bytes = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, 0x01, 0x05, 0x00];
        assert_eq!(parse(&bytes), Err(ParseError::UnexpectedEof));
    }
}
