use std::iter;

use unexepack::exe;
use unexepack::exepack;

// Offsets within the image built by `packed_sample`.
pub const BODY_OFFSET: usize = 0x20;
pub const STUB_OFFSET: usize = 0x30;

/// The program body that `packed_sample` compresses.
pub fn sample_body() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"Hello");
    body.extend(iter::repeat(0xcc).take(16));
    body.extend_from_slice(b"XYZ");
    body
}

/// Builds a small EXEPACK-compressed executable in memory. The packed body
/// encodes `sample_body`; the EXEPACK header carries cs:ip = 0034:0012 and
/// ss:sp = 0056:0080; the packed relocation table holds the single entry
/// 0000:0010.
pub fn packed_sample() -> Vec<u8> {
    let mut image = Vec::new();

    // EXE header of 2 paragraphs, with the compressed data starting right
    // after it and the stub one paragraph further.
    let mut header = vec![0; BODY_OFFSET];
    exe::store_u16le(&mut header, exe::E_MAGIC, exe::MAGIC);
    exe::store_u16le(&mut header, exe::E_CPARHDR, 2);
    exe::store_u16le(&mut header, exe::E_SP, 0x0100);
    exe::store_u16le(&mut header, exe::E_IP, 0x0010);
    exe::store_u16le(&mut header, exe::E_CS, 1);
    exe::store_u16le(&mut header, exe::E_LFARLC, 0x001c);
    image.extend_from_slice(&header);

    // Packed body: "Hello" kept verbatim below the commands, a fill of 16
    // 0xcc bytes carrying the final bit, a copy of "XYZ", and one byte of
    // 0xff padding up to the paragraph boundary.
    image.extend_from_slice(b"Hello");
    image.extend_from_slice(&[0xcc, 0x10, 0x00, 0xb1]);
    image.extend_from_slice(&[0x58, 0x59, 0x5a, 0x03, 0x00, 0xb2]);
    image.push(0xff);
    assert_eq!(image.len(), STUB_OFFSET);

    // EXEPACK header.
    let mut stub = vec![0; exepack::HEADER_LEN];
    exe::store_u16le(&mut stub, 0x00, 0x0012); // real_ip
    exe::store_u16le(&mut stub, 0x02, 0x0034); // real_cs
    exe::store_u16le(&mut stub, 0x08, 0x0080); // real_sp
    exe::store_u16le(&mut stub, 0x0a, 0x0056); // real_ss
    exe::store_u16le(&mut stub, 0x0e, exepack::SIGNATURE);
    image.extend_from_slice(&stub);

    // Stub code filler up to the packed relocation table.
    image.resize(STUB_OFFSET + exepack::RELOCS_OFFSET, 0x90);

    // Packed relocation table: one entry in segment 0000, nothing in the
    // other 15 segments.
    image.extend_from_slice(&[0x01, 0x00, 0x10, 0x00]);
    for _ in 1..16 {
        image.extend_from_slice(&[0x00, 0x00]);
    }

    image
}
