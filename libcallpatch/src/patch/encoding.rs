//! `call rel32` encoding
//!
//! A near relative call is `E8` followed by a little-endian `i32`
//! displacement, measured from the address of the *next* instruction.

use iced_x86::{Code, Decoder, DecoderOptions};

use super::{PatchError, PatchResult};
use crate::ffi::BITNESS;

pub const CALL_REL32_OPCODE: u8 = 0xE8;
pub const CALL_REL32_LEN: usize = 5;

/// Displacement that makes a call at `source` land on `destination`.
fn displacement(source: usize, destination: usize) -> PatchResult<i32> {
    let next = source.wrapping_add(CALL_REL32_LEN);

    // 32-bit address space wraps, every target is reachable
    #[cfg(target_pointer_width = "32")]
    {
        Ok(destination.wrapping_sub(next) as i32)
    }

    #[cfg(target_pointer_width = "64")]
    {
        let distance = (destination as i128) - (next as i128);
        i32::try_from(distance).map_err(|_| PatchError::CallOutOfRange {
            call_site: source,
            destination,
        })
    }
}

/// Encodes `call destination` as it would be placed at `source`.
pub fn encode_call_rel32(source: usize, destination: usize) -> PatchResult<[u8; CALL_REL32_LEN]> {
    let displacement = displacement(source, destination)?;

    let mut bytes = [0u8; CALL_REL32_LEN];
    bytes[0] = CALL_REL32_OPCODE;
    bytes[1..].copy_from_slice(&displacement.to_le_bytes());
    Ok(bytes)
}

/// Returns the absolute target of the call instruction located at `source`.
pub fn decode_call_rel32(source: usize, bytes: &[u8; CALL_REL32_LEN]) -> PatchResult<usize> {
    if bytes[0] != CALL_REL32_OPCODE {
        return Err(PatchError::NotANearCall {
            address: source,
            found: bytes[0],
        });
    }

    let displacement = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);

    Ok(source
        .wrapping_add(CALL_REL32_LEN)
        .wrapping_add_signed(displacement as isize))
}

/// Decodes `bytes` with iced-x86 and checks they form exactly one
/// `call rel32` landing on `expected`.
pub fn verify_call_rel32(bytes: &[u8], source: usize, expected: usize) -> PatchResult<()> {
    let mut decoder = Decoder::with_ip(BITNESS, bytes, source as u64, DecoderOptions::NONE);
    let instruction = decoder.decode();

    let is_call = matches!(instruction.code(), Code::Call_rel32_32 | Code::Call_rel32_64);

    if instruction.is_invalid() || !is_call || instruction.len() != CALL_REL32_LEN {
        log::error!(
            "Bytes at 0x{:X} do not decode as call rel32: {:02X?} ({:?})",
            source,
            bytes,
            instruction.code()
        );
        return Err(PatchError::NotANearCall {
            address: source,
            found: bytes.first().copied().unwrap_or_default(),
        });
    }

    let actual = instruction.near_branch_target() as usize;
    if actual != expected {
        return Err(PatchError::CallVerificationFailed { expected, actual });
    }

    Ok(())
}
