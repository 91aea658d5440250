//! Decompressor for DOS executables packed with Microsoft EXEPACK.
//!
//! A packed executable keeps a compressed copy of the original program
//! between the EXE header and the code segment, where a small
//! "decompression stub" expands it at load time. This library undoes the
//! transformation statically. It decompresses the program body and patches
//! the EXE header with the original register values and relocation table,
//! both recovered from the stub's own data structures.
//!
//! The format is documented at
//! <http://www.shikadi.net/moddingwiki/Microsoft_EXEPACK#File_Format>.
//!
//! The `unpack` function takes the raw bytes of a packed executable and
//! returns the raw bytes of the unpacked equivalent.

use std::fmt;

#[macro_use]
mod debug;

pub mod exe;
pub mod exepack;

pub use debug::DEBUG;

/// Top-level error type, wrapping the errors of the container and
/// compression layers.
#[derive(Debug)]
pub enum Error {
    Exe(exe::FormatError),
    Exepack(exepack::FormatError),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Exe(err) => err.fmt(f),
            Error::Exepack(err) => err.fmt(f),
        }
    }
}

impl From<exe::FormatError> for Error {
    fn from(err: exe::FormatError) -> Self {
        Error::Exe(err)
    }
}

impl From<exepack::FormatError> for Error {
    fn from(err: exepack::FormatError) -> Self {
        Error::Exepack(err)
    }
}

/// Unpacks a whole EXEPACK-compressed executable image and returns the
/// unpacked image.
///
/// The output consists of the input's EXE header with the entry point, stack
/// pointer, and relocation fields patched, followed by the decompressed
/// program body. The decompression stub is not retained.
pub fn unpack(image: &[u8]) -> Result<Vec<u8>, Error> {
    let layout = exe::locate(image)?;
    debug!("{:?}", layout);

    // The EXEPACK block runs from cs:0000 to the end of the file: a 16-byte
    // header, then the stub code, then the packed relocation table.
    let stub = &image[layout.stub_offset..];
    if stub.len() < exepack::RELOCS_OFFSET {
        return Err(Error::Exepack(exepack::FormatError::ExepackTooShort { len: stub.len() }));
    }
    let header = exepack::Header::parse(&stub[..exepack::HEADER_LEN])?;
    debug!("{:?}", header);

    let body = exepack::decompress(&image[layout.header_len..layout.stub_offset])?;

    // Copy the original header and restore the registers that EXEPACK
    // repointed at its own stub.
    let mut output = image[..layout.header_len].to_vec();
    exe::store_u16le(&mut output, exe::E_SS, header.real_ss);
    exe::store_u16le(&mut output, exe::E_SP, header.real_sp);
    exe::store_u16le(&mut output, exe::E_IP, header.real_ip);
    exe::store_u16le(&mut output, exe::E_CS, header.real_cs);
    exepack::rebuild_relocs(&stub[exepack::RELOCS_OFFSET..], &mut output)?;

    output.extend_from_slice(&body);
    Ok(output)
}
