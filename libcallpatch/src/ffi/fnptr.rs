use std::{ffi::c_void, marker::PhantomData, ptr::NonNull};

use log::{error, trace};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FnPtrError {
    #[error("Function pointer is NULL")]
    FunctionPtrIsNull,

    #[error("Function pointer has wrong size (does not match *mut c_void)")]
    FunctionPtrSize,
}

type FnPtrResult<T> = std::result::Result<T, FnPtrError>;

/// Typed function pointer recovered from a raw address.
///
/// `T` must be a function pointer type such as
/// `unsafe extern "C" fn(i32) -> *mut c_void`. Only the size of `T` can be
/// checked; matching the real signature and calling convention is on the
/// caller.
pub struct FnPtr<T: Copy + 'static> {
    raw_ptr: NonNull<c_void>,
    _phantom: PhantomData<T>,
}

// Safety: a code address carries no thread affinity
unsafe impl<T: Copy + 'static> Send for FnPtr<T> {}
unsafe impl<T: Copy + 'static> Sync for FnPtr<T> {}

impl<T: Copy + 'static> Clone for FnPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Copy + 'static> Copy for FnPtr<T> {}

impl<T: Copy + 'static> std::fmt::Debug for FnPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FnPtr").field(&self.raw_ptr).finish()
    }
}

impl<T: Copy + 'static> PartialEq for FnPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw_ptr == other.raw_ptr
    }
}

impl<T: Copy + 'static> Eq for FnPtr<T> {}

impl<T: Copy + 'static> FnPtr<T> {
    fn validate_size() -> FnPtrResult<()> {
        if std::mem::size_of::<T>() != std::mem::size_of::<*mut c_void>() {
            error!(
                "FnPtr type is {} bytes, pointers are {}",
                std::mem::size_of::<T>(),
                std::mem::size_of::<*mut c_void>()
            );
            return Err(FnPtrError::FunctionPtrSize);
        }

        Ok(())
    }

    /// Wraps a code address.
    pub fn from_raw(raw_ptr: *mut c_void) -> FnPtrResult<Self> {
        Self::validate_size()?;

        let raw_ptr = NonNull::new(raw_ptr).ok_or(FnPtrError::FunctionPtrIsNull)?;
        trace!("FnPtr created from raw pointer {:p}", raw_ptr);

        Ok(Self {
            raw_ptr,
            _phantom: PhantomData,
        })
    }

    /// Wraps a code address given as an integer.
    pub fn from_address(address: usize) -> FnPtrResult<Self> {
        Self::from_raw(address as *mut c_void)
    }

    /// Wraps a Rust function pointer value.
    pub fn from_fn(function: T) -> FnPtrResult<Self> {
        Self::validate_size()?;

        // Safety: validate_size ensures T is pointer sized
        let addr = unsafe { std::mem::transmute_copy::<T, usize>(&function) };

        Self::from_address(addr)
    }

    /// Converts the stored address back into `T`.
    ///
    /// # Safety
    /// The address must point to a function whose signature and calling
    /// convention match `T`.
    pub unsafe fn as_fn(&self) -> T {
        let addr = self.raw_ptr.as_ptr() as usize;

        // Safety: size was validated on construction
        unsafe { std::mem::transmute_copy::<usize, T>(&addr) }
    }

    pub fn as_raw_ptr(&self) -> *mut c_void {
        self.raw_ptr.as_ptr()
    }

    pub fn address(&self) -> usize {
        self.raw_ptr.as_ptr() as usize
    }
}
