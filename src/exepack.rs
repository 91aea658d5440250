//! The EXEPACK compression layer of a packed executable.
//!
//! A packed executable puts its EXEPACK block at cs:0000, directly after the
//! compressed data. The block starts with a 16-byte EXEPACK header, followed
//! by the decompression stub (machine code that this crate never executes),
//! followed by a packed relocation table. The compressed data sit between the
//! end of the EXE header and cs:0000, padded at the end with 0xff up to a
//! paragraph boundary.
//!
//! # References
//!
//! * <http://www.shikadi.net/moddingwiki/Microsoft_EXEPACK#File_Format>

use std::convert::TryInto;
use std::fmt;
use std::iter;

use exe;
use exe::Pointer;

/// The signature of an EXEPACK header, interpreted as a little-endian integer.
pub const SIGNATURE: u16 = 0x4252; // "RB"

/// The length of the EXEPACK header variant this crate understands.
pub const HEADER_LEN: usize = 16;

/// The offset of the packed relocation table, relative to the start of the
/// EXEPACK header. The decompression stub occupies the space in between.
pub const RELOCS_OFFSET: usize = 0x132;

// Byte offsets of fields within the EXEPACK header.
const REAL_IP: usize = 0x00;
const REAL_CS: usize = 0x02;
const REAL_SP: usize = 0x08;
const REAL_SS: usize = 0x0a;
const SIGNATURE_OFFSET: usize = 0x0e;

/// An EXEPACK format error.
#[derive(Debug, PartialEq)]
pub enum FormatError {
    /// The EXEPACK block is too short to contain header, stub, and
    /// relocations.
    ExepackTooShort { len: usize },
    /// The signature in the EXEPACK header did not have the expected value of
    /// `b"RB"`.
    Signature { signature: u16 },
    /// A command would read past the beginning of the compressed data.
    SrcOverflow,
    /// The command byte was not any recognized command (Copy or Fill).
    UnknownCommand { src: usize, command: u8 },
    /// The packed relocation table ended before all of its declared entries.
    TruncatedRelocations { segment: u16 },
    /// The packed relocation table declares more entries than fit in 16 bits.
    TooManyRelocations { num: usize },
    /// An expanded relocation entry would land outside the EXE header.
    RelocationsOutsideHeader { offset: usize },
}

impl std::error::Error for FormatError {}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FormatError::ExepackTooShort { len } =>
                write!(f, "EXEPACK block of {} bytes is too short for header and stub", len),
            FormatError::Signature { signature } =>
                write!(f, "Bad EXEPACK header signature {:#04x}", signature),
            FormatError::SrcOverflow =>
                write!(f, "read overflow: a command extends past the beginning of compressed data"),
            FormatError::UnknownCommand { src, command } =>
                write!(f, "unknown command {:#02x} at index {}", command, src),
            FormatError::TruncatedRelocations { segment } =>
                write!(f, "EXEPACK relocation table is truncated in segment {}", segment),
            FormatError::TooManyRelocations { num } =>
                write!(f, "{} relocations are too many to fit in 16 bits", num),
            FormatError::RelocationsOutsideHeader { offset } =>
                write!(f, "relocation entry at 0x{:04x} lies outside the EXE header", offset),
        }
    }
}

/// An EXEPACK header.
///
/// # References
///
/// * <http://www.shikadi.net/moddingwiki/Microsoft_EXEPACK#EXEPACK_variables>
#[derive(Debug)]
pub struct Header {
    pub real_ip: u16,
    pub real_cs: u16,
    pub real_sp: u16,
    pub real_ss: u16,
}

impl Header {
    /// Parses an EXEPACK header into a `Header` structure.
    pub fn parse(buf: &[u8]) -> Result<Self, FormatError> {
        if buf.len() < HEADER_LEN {
            return Err(FormatError::ExepackTooShort { len: buf.len() });
        }
        let signature = exe::fetch_u16le(buf, SIGNATURE_OFFSET);
        if signature != SIGNATURE {
            return Err(FormatError::Signature { signature });
        }
        Ok(Self {
            real_ip: exe::fetch_u16le(buf, REAL_IP),
            real_cs: exe::fetch_u16le(buf, REAL_CS),
            real_sp: exe::fetch_u16le(buf, REAL_SP),
            real_ss: exe::fetch_u16le(buf, REAL_SS),
        })
    }
}

/// Returns a new index after skipping 0xff padding from the end of `buf[..i]`.
fn unpad(buf: &[u8], i: usize) -> usize {
    i - buf[..i].iter().rev().take_while(|&&x| x == 0xff).count()
}

/// The basic decompression loop. The compressed data are read going backwards
/// from the end of `packed`. Decoded chunks accumulate in reverse in a fresh
/// buffer, which one final reversal puts into program order.
///
/// The commands are: 0xb0 (Fill), followed backwards by a 16-bit length and a
/// fill byte; and 0xb2 (Copy), followed backwards by a 16-bit length and that
/// many literal bytes. A command with the low bit set is the last one; the
/// bytes that precede it are the verbatim leading part of the program. Running
/// out of data without seeing the low bit means the whole buffer was commands,
/// with no leading part.
///
/// # References
///
/// * <http://www.shikadi.net/moddingwiki/Microsoft_EXEPACK#Decompression_algorithm>
pub fn decompress(packed: &[u8]) -> Result<Vec<u8>, FormatError> {
    // Skip over 0xff padding.
    let mut src = unpad(packed, packed.len());

    let mut output = Vec::new();
    while src > 0 {
        // Read the command byte.
        src -= 1;
        let command = packed[src];

        match command & 0xfe {
            0xb0 => {
                src = src.checked_sub(2).ok_or(FormatError::SrcOverflow)?;
                let length = usize::from(exe::fetch_u16le(packed, src));
                src = src.checked_sub(1).ok_or(FormatError::SrcOverflow)?;
                let fill = packed[src];
                output.extend(iter::repeat(fill).take(length));
            }
            0xb2 => {
                src = src.checked_sub(2).ok_or(FormatError::SrcOverflow)?;
                let length = usize::from(exe::fetch_u16le(packed, src));
                src = src.checked_sub(length).ok_or(FormatError::SrcOverflow)?;
                output.extend(packed[src..src + length].iter().rev());
            }
            _ => {
                return Err(FormatError::UnknownCommand { src, command });
            }
        }

        if command & 0x01 != 0 {
            break;
        }
    }

    // What precedes the final command is the leading part of the program,
    // stored verbatim.
    output.extend(packed[..src].iter().rev());
    output.reverse();

    Ok(output)
}

/// Parses a packed EXEPACK relocation table: for each of 16 segments, a 16-bit
/// entry count followed by that many 16-bit offsets.
///
/// # References
///
/// * <http://www.shikadi.net/moddingwiki/Microsoft_EXEPACK#Relocation_Table>
fn parse_relocs(buf: &[u8]) -> Result<Vec<Pointer>, FormatError> {
    let mut relocs = Vec::new();
    let mut i = 0;
    for segment in 0..16 {
        if i + 2 > buf.len() {
            return Err(FormatError::TruncatedRelocations { segment });
        }
        let num_relocs = usize::from(exe::fetch_u16le(buf, i));
        i += 2;
        for _ in 0..num_relocs {
            if i + 2 > buf.len() {
                return Err(FormatError::TruncatedRelocations { segment });
            }
            let offset = exe::fetch_u16le(buf, i);
            i += 2;
            relocs.push(Pointer {
                segment: segment * 0x1000,
                offset,
            });
        }
    }
    Ok(relocs)
}

/// Expands the packed relocation table in `buf` into the EXE relocation table
/// inside `header`, starting at the offset named by the `e_lfarlc` field, and
/// stores the total entry count in `e_crlc`. `header` must hold at least the
/// fixed header fields.
pub fn rebuild_relocs(buf: &[u8], header: &mut [u8]) -> Result<(), FormatError> {
    let relocs = parse_relocs(buf)?;
    debug!("{:?}", relocs);

    let e_crlc: u16 = relocs.len().try_into()
        .or(Err(FormatError::TooManyRelocations { num: relocs.len() }))?;

    // The expanded table must fit in the space the packer reserved inside the
    // header.
    let mut i = usize::from(exe::fetch_u16le(header, exe::E_LFARLC));
    for pointer in relocs.iter() {
        if i + 4 > header.len() {
            return Err(FormatError::RelocationsOutsideHeader { offset: i });
        }
        exe::store_u16le(header, i, pointer.offset);
        exe::store_u16le(header, i + 2, pointer.segment);
        i += 4;
    }

    exe::store_u16le(header, exe::E_CRLC, e_crlc);
    Ok(())
}
