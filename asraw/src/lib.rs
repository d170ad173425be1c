//! Byte views of fixed-layout records.
//!
//! The bootloader deals in records whose exact byte layout matters twice
//! over: protocol messages are received and sent as raw frames, and the
//! persisted configuration is CRC-checked over its serialized form.  Both
//! are declared as `repr(C, packed)` structs and moved in and out of byte
//! buffers through the traits here, rather than through a serializer that
//! could change the layout underneath us.
//!
//! `as_raw` is safe for any `Sized` type, since viewing initialized memory
//! as bytes is always defined.  `as_mut_raw` lets arbitrary bytes be
//! written into the record, so the trait is unsafe to implement: it is only
//! correct for types where every bit pattern of every field is a valid
//! value (integers and byte arrays, in practice).  Packed structs satisfy
//! the additional requirement that there are no padding bytes to leak.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

use core::{mem, slice};

pub trait AsRaw: Sized {
    /// Size of the raw view, in bytes.
    const RAW_SIZE: usize = mem::size_of::<Self>();

    fn as_raw(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self as *const _ as *const u8, mem::size_of::<Self>()) }
    }
}

/// Mutable byte view of a record, for filling it from a wire frame or a
/// flash read.
///
/// # Safety
///
/// Implement only for types where all bit patterns are valid for all
/// fields, and which contain no pointers or padding.  `repr(C, packed)`
/// structs of integers and byte arrays qualify.
pub unsafe trait AsMutRaw: Sized {
    fn as_mut_raw(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self as *mut _ as *mut u8, mem::size_of::<Self>()) }
    }
}
