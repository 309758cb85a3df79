use std::ffi::c_void;

use super::encoding::{
    CALL_REL32_LEN, CALL_REL32_OPCODE, decode_call_rel32, encode_call_rel32, verify_call_rel32,
};
use super::{PatchError, PatchResult};
use crate::memory::{CodeMemory, CodeRegion};

/// Location of a `call rel32` instruction: function start plus the byte
/// offset of the `E8` opcode inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    function_base: usize,
    offset: usize,
}

impl CallSite {
    pub fn new(function_base: *const c_void, offset: usize) -> PatchResult<Self> {
        Self::from_address(function_base as usize, offset)
    }

    pub fn from_address(function_base: usize, offset: usize) -> PatchResult<Self> {
        if function_base == 0 {
            return Err(PatchError::NullFunctionBase);
        }

        // The whole instruction must fit in the address space
        function_base
            .checked_add(offset)
            .and_then(|address| address.checked_add(CALL_REL32_LEN))
            .ok_or(PatchError::OffsetOverflow {
                base: function_base,
                offset,
            })?;

        Ok(Self {
            function_base,
            offset,
        })
    }

    pub fn function_base(&self) -> usize {
        self.function_base
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Address of the call opcode
    pub fn address(&self) -> usize {
        self.function_base + self.offset
    }

    pub fn region(&self) -> PatchResult<CodeRegion> {
        Ok(CodeRegion::new(self.address(), CALL_REL32_LEN)?)
    }
}

/// Undo information for one patched call site.
///
/// Holds the bytes that were at `address` right before the patch went in.
/// Deliberately not `Clone`: [`restore`] takes it by value so it can only
/// be written back once.
#[derive(Debug, PartialEq, Eq)]
pub struct PatchRecord {
    address: usize,
    original_bytes: [u8; CALL_REL32_LEN],
}

impl PatchRecord {
    pub fn address(&self) -> usize {
        self.address
    }

    pub fn original_bytes(&self) -> &[u8; CALL_REL32_LEN] {
        &self.original_bytes
    }

    pub fn len(&self) -> usize {
        CALL_REL32_LEN
    }

    pub fn region(&self) -> PatchResult<CodeRegion> {
        Ok(CodeRegion::new(self.address, CALL_REL32_LEN)?)
    }
}

/// Target of the call currently at `site`, without touching the bytes.
pub fn read_target<M: CodeMemory>(memory: &M, site: &CallSite) -> PatchResult<usize> {
    let region = site.region()?;
    memory.validate(region)?;

    let mut bytes = [0u8; CALL_REL32_LEN];
    memory.read(region.address(), &mut bytes)?;

    decode_call_rel32(region.address(), &bytes)
}

/// Redirects the call at `site` to `interceptor`.
///
/// Returns the undo record and the address the call used to reach. Nothing
/// is written unless every check passes, so on error the site is untouched.
pub fn install<M: CodeMemory>(
    memory: &M,
    site: &CallSite,
    interceptor: usize,
) -> PatchResult<(PatchRecord, usize)> {
    let region = site.region()?;
    let address = region.address();

    log::debug!(
        "Patching call site 0x{:X} (function 0x{:X} + 0x{:X})",
        address,
        site.function_base(),
        site.offset()
    );

    memory.validate(region)?;

    // Snapshot before any write
    let mut original_bytes = [0u8; CALL_REL32_LEN];
    memory.read(address, &mut original_bytes)?;

    let original_target = decode_call_rel32(address, &original_bytes)?;

    if original_target == interceptor {
        log::error!("Call site 0x{:X} already calls 0x{:X}", address, interceptor);
        return Err(PatchError::AlreadyInstalled(address));
    }

    let patched_bytes = encode_call_rel32(address, interceptor)?;
    verify_call_rel32(&patched_bytes, address, interceptor)?;

    memory.make_writable(region)?;
    memory.write(address, &patched_bytes)?;

    let mut written = [0u8; CALL_REL32_LEN];
    memory.read(address, &mut written)?;

    if written != patched_bytes {
        log::error!(
            "Call site 0x{:X} reads back {:02X?} after patch, putting original bytes back",
            address,
            written
        );

        if let Err(err) = memory.write(address, &original_bytes) {
            log::error!("Failed to put original bytes back at 0x{:X}: {}", address, err);
        }

        return Err(PatchError::CallVerificationFailed {
            expected: interceptor,
            actual: decode_call_rel32(address, &written).unwrap_or_default(),
        });
    }

    log::debug!(
        "Patched call site 0x{:X}: 0x{:X} -> 0x{:X}",
        address,
        original_target,
        interceptor
    );

    Ok((
        PatchRecord {
            address,
            original_bytes,
        },
        original_target,
    ))
}

/// Writes the saved bytes back over the call site, consuming the record.
pub fn restore<M: CodeMemory>(memory: &M, record: PatchRecord) -> PatchResult<()> {
    write_back(memory, &record)
}

pub(super) fn write_back<M: CodeMemory>(memory: &M, record: &PatchRecord) -> PatchResult<()> {
    let region = record.region()?;
    memory.validate(region)?;

    let mut current = [0u8; CALL_REL32_LEN];
    memory.read(record.address, &mut current)?;

    if current == record.original_bytes {
        log::debug!("Call site 0x{:X} already holds its original bytes", record.address);
    } else if current[0] != CALL_REL32_OPCODE {
        log::warn!(
            "Call site 0x{:X} holds {:02X?}, not our call; restoring original bytes anyway",
            record.address,
            current
        );
    }

    memory.make_writable(region)?;
    memory.write(record.address, &record.original_bytes)?;

    log::debug!("Restored call site 0x{:X}", record.address);

    Ok(())
}
