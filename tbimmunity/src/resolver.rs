//! Address resolution from gamedata
//!
//! Signatures are matched against the bytes of a registered module image;
//! `@name` signatures are exported symbols and go through the dynamic
//! linker instead.

use std::{ffi::c_void, ptr::NonNull};

use libcallpatch::{CodeMemory, CodeRegion, MemoryError, ProcessMemory};

use crate::{
    errors::{LookupError, ResolveError},
    gamedata::GameEntries,
};

/// Turns gamedata names into addresses and offsets.
pub trait AddressResolver {
    fn resolve_symbol(&self, name: &str) -> Result<usize, ResolveError>;
    fn resolve_offset(&self, name: &str) -> Result<usize, ResolveError>;
}

/// A loaded library the resolver may scan.
#[derive(Debug, Clone)]
pub struct ModuleImage {
    name: String,
    base: usize,
    size: usize,
    handle: Option<NonNull<c_void>>,
}

impl ModuleImage {
    pub fn new(name: impl Into<String>, base: usize, size: usize) -> Self {
        Self {
            name: name.into(),
            base,
            size,
            handle: None,
        }
    }

    /// Attaches the `dlopen` handle used for `@symbol` lookups.
    pub fn with_handle(mut self, handle: *mut c_void) -> Self {
        self.handle = NonNull::new(handle);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn region(&self) -> Result<CodeRegion, MemoryError> {
        CodeRegion::new(self.base, self.size)
    }
}

pub struct GameDataResolver<M: CodeMemory = ProcessMemory> {
    entries: GameEntries,
    memory: M,
    modules: Vec<ModuleImage>,
}

impl<M: CodeMemory> GameDataResolver<M> {
    pub fn new(entries: GameEntries, memory: M) -> Self {
        Self {
            entries,
            memory,
            modules: Vec::new(),
        }
    }

    pub fn register_module(&mut self, module: ModuleImage) {
        log::debug!(
            "Module \"{}\" registered at 0x{:X} (+0x{:X})",
            module.name,
            module.base,
            module.size
        );
        self.modules.push(module);
    }

    pub fn entries(&self) -> &GameEntries {
        &self.entries
    }

    fn module(&self, library: &str) -> Option<&ModuleImage> {
        self.modules.iter().find(|module| module.name == library)
    }

    fn lookup_signature(&self, name: &str) -> Result<usize, LookupError> {
        let entry = self.entries.signature_entry(name)?;
        let signature = self.entries.signature(name)?;

        if let Some(symbol) = signature.strip_prefix('@') {
            let handle = self.module(&entry.library).and_then(|module| module.handle);
            return lookup_symbol(handle, symbol);
        }

        let pattern = self.entries.pattern(name)?;
        let module = self
            .module(&entry.library)
            .ok_or_else(|| LookupError::LibraryNotLoaded(entry.library.clone()))?;

        let region = module.region()?;
        let mut image = vec![0u8; region.len()];
        self.memory.read(region.address(), &mut image)?;

        pattern
            .find(&image)
            .map(|offset| region.address() + offset)
            .ok_or_else(|| LookupError::NoMatch(entry.library.clone()))
    }
}

impl<M: CodeMemory> AddressResolver for GameDataResolver<M> {
    fn resolve_symbol(&self, name: &str) -> Result<usize, ResolveError> {
        match self.lookup_signature(name) {
            Ok(address) => {
                log::debug!("\"{}\" resolved to 0x{:X}", name, address);
                Ok(address)
            }
            Err(cause) => {
                log::debug!("\"{}\" lookup failed: {}", name, cause);
                Err(ResolveError::FunctionNotFound {
                    name: name.to_string(),
                    cause,
                })
            }
        }
    }

    fn resolve_offset(&self, name: &str) -> Result<usize, ResolveError> {
        self.entries
            .offset(name)
            .map_err(|cause| ResolveError::OffsetNotFound {
                name: name.to_string(),
                cause: cause.into(),
            })
    }
}

#[cfg(unix)]
fn lookup_symbol(handle: Option<NonNull<c_void>>, symbol: &str) -> Result<usize, LookupError> {
    let c_symbol = std::ffi::CString::new(symbol)
        .map_err(|_| LookupError::SymbolNotFound(symbol.to_string()))?;
    let handle = handle.map_or(libc::RTLD_DEFAULT, NonNull::as_ptr);

    let address = unsafe { libc::dlsym(handle, c_symbol.as_ptr()) };
    if address.is_null() {
        return Err(LookupError::SymbolNotFound(symbol.to_string()));
    }

    Ok(address as usize)
}

#[cfg(not(unix))]
fn lookup_symbol(_handle: Option<NonNull<c_void>>, symbol: &str) -> Result<usize, LookupError> {
    Err(LookupError::SymbolsUnsupported(symbol.to_string()))
}
