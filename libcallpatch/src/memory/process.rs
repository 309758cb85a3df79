use std::sync::atomic::{Ordering, fence};

use libc::c_void;

use super::{CodeMemory, CodeRegion, MemoryError, MemoryResult};

/// Code memory of the current process.
///
/// This is the only type in the crate that dereferences caller supplied
/// addresses. Every access is preceded by [`CodeMemory::validate`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemory;

impl ProcessMemory {
    pub fn new() -> Self {
        Self
    }
}

impl CodeMemory for ProcessMemory {
    fn validate(&self, region: CodeRegion) -> MemoryResult<()> {
        os::validate(region)
    }

    fn read(&self, address: usize, buffer: &mut [u8]) -> MemoryResult<()> {
        let region = CodeRegion::new(address, buffer.len())?;
        os::validate(region)?;

        unsafe {
            std::ptr::copy_nonoverlapping(address as *const u8, buffer.as_mut_ptr(), buffer.len());
        }

        Ok(())
    }

    fn make_writable(&self, region: CodeRegion) -> MemoryResult<()> {
        os::validate(region)?;
        os::protect_read_write_execute(region)
    }

    fn write(&self, address: usize, bytes: &[u8]) -> MemoryResult<()> {
        let region = CodeRegion::new(address, bytes.len())?;
        os::validate(region)?;

        unsafe {
            // Opcode byte first, so a torn read never sees a new
            // displacement behind an old opcode
            std::ptr::write_volatile(address as *mut u8, bytes[0]);

            if bytes.len() > 1 {
                std::ptr::copy_nonoverlapping(
                    bytes[1..].as_ptr(),
                    (address as *mut u8).add(1),
                    bytes.len() - 1,
                );
            }
        }

        fence(Ordering::Release);

        os::flush_instruction_cache(region)?;

        fence(Ordering::SeqCst);

        Ok(())
    }
}

#[cfg(unix)]
mod os {
    use super::*;

    fn last_os_error() -> i32 {
        std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
    }

    fn page_size() -> MemoryResult<usize> {
        let value = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if value <= 0 {
            return Err(MemoryError::PageSizeUnavailable);
        }
        Ok(value as usize)
    }

    /// `mincore` fails with ENOMEM when any page in the span is unmapped
    pub(super) fn validate(region: CodeRegion) -> MemoryResult<()> {
        let page_size = page_size()?;
        let (start, len) = region.page_span(page_size);

        let mut residency = vec![0u8; len / page_size];
        let result = unsafe { libc::mincore(start as *mut c_void as _, len, residency.as_mut_ptr() as _) };

        if result != 0 {
            let code = last_os_error();
            if code == libc::ENOMEM {
                return Err(MemoryError::NotMapped(region.address()));
            }

            return Err(MemoryError::QueryFailed {
                address: region.address(),
                code,
            });
        }

        Ok(())
    }

    pub(super) fn protect_read_write_execute(region: CodeRegion) -> MemoryResult<()> {
        let page_size = page_size()?;
        let (start, len) = region.page_span(page_size);

        let result = unsafe {
            libc::mprotect(
                start as *mut c_void,
                len,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            )
        };

        if result != 0 {
            return Err(MemoryError::ProtectionChangeFailed {
                address: region.address(),
                code: last_os_error(),
            });
        }

        log::trace!(
            "mprotect rwx 0x{:X}+{} (page span 0x{:X}+{})",
            region.address(),
            region.len(),
            start,
            len
        );

        Ok(())
    }

    /// x86 keeps instruction and data caches coherent
    pub(super) fn flush_instruction_cache(_region: CodeRegion) -> MemoryResult<()> {
        Ok(())
    }
}

#[cfg(target_os = "windows")]
mod os {
    use super::*;

    use windows::Win32::System::{
        Diagnostics::Debug::FlushInstructionCache,
        Memory::{
            MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS,
            VirtualProtect, VirtualQuery,
        },
        Threading::GetCurrentProcess,
    };

    /// Walks every allocation region overlapping the range and requires
    /// all of them to be committed
    pub(super) fn validate(region: CodeRegion) -> MemoryResult<()> {
        let mut cursor = region.address();

        while cursor < region.end() {
            let mut info = MEMORY_BASIC_INFORMATION::default();
            let written = unsafe {
                VirtualQuery(
                    Some(cursor as *const c_void),
                    &mut info,
                    std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };

            if written == 0 {
                return Err(MemoryError::QueryFailed {
                    address: cursor,
                    code: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
                });
            }

            if info.State != MEM_COMMIT {
                return Err(MemoryError::NotMapped(cursor));
            }

            let region_end = (info.BaseAddress as usize)
                .checked_add(info.RegionSize)
                .ok_or(MemoryError::InvalidMemoryRange(
                    info.BaseAddress as usize,
                    info.RegionSize,
                ))?;

            if region_end <= cursor {
                return Err(MemoryError::InvalidMemoryRange(cursor, region.len()));
            }

            cursor = region_end;
        }

        Ok(())
    }

    pub(super) fn protect_read_write_execute(region: CodeRegion) -> MemoryResult<()> {
        let mut old_protect = PAGE_PROTECTION_FLAGS(0);

        unsafe {
            VirtualProtect(
                region.address() as *const c_void,
                region.len(),
                PAGE_EXECUTE_READWRITE,
                &mut old_protect,
            )
        }
        .map_err(|err| MemoryError::ProtectionChangeFailed {
            address: region.address(),
            code: err.code().0,
        })?;

        log::trace!(
            "VirtualProtect rwx 0x{:X}+{} (was 0x{:X})",
            region.address(),
            region.len(),
            old_protect.0
        );

        Ok(())
    }

    pub(super) fn flush_instruction_cache(region: CodeRegion) -> MemoryResult<()> {
        unsafe {
            FlushInstructionCache(
                GetCurrentProcess(),
                Some(region.address() as *const c_void),
                region.len(),
            )
        }
        .map_err(|err| MemoryError::FlushFailed {
            address: region.address(),
            code: err.code().0,
        })
    }
}
