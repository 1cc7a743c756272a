use std::ptr::NonNull;

use serde::{Deserialize, Serialize};

use super::key::{Selector, SelectorKey};

/// Emits the machine code of one routine family.
///
/// A generator is constructed straight into the code region handed out by the
/// code buffer and dropped once the routine has been committed, which releases
/// any scratch state it kept.
pub trait RoutineGenerator: Sized {
    /// Shared parameters forwarded unchanged to every generation.
    type Context;
    type Key;

    /// Write the routine for `key` into `code`.
    ///
    /// Must not write past `code.len()`.
    fn generate(context: &Self::Context, key: &Self::Key, code: &mut [u8]) -> Self;

    /// Bytes of machine code written.
    fn size(&self) -> usize;

    /// Offset of the callable entry point from the start of the region.
    fn entry_offset(&self) -> usize {
        0
    }
}

/// Callable entry point of a generated routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryPoint(NonNull<u8>);

impl EntryPoint {
    pub fn new(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    pub fn as_ptr(self) -> *const u8 {
        self.0.as_ptr()
    }

    /// Reinterpret the entry point as a function pointer.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type matching the ABI and signature of
    /// the generated code, and the code must still be mapped executable.
    pub unsafe fn cast<F: Copy>(self) -> F {
        assert_eq!(
            size_of::<F>(),
            size_of::<*const u8>(),
            "entry points can only be cast to function pointers"
        );
        let ptr = self.0.as_ptr().cast_const();
        // SAFETY: sizes match, and the caller vouches for the signature.
        unsafe { std::mem::transmute_copy::<*const u8, F>(&ptr) }
    }
}

/// Context of [`ConstantRoutine`]: the routine returns `key ^ seed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineContext {
    pub seed: u64,
}

/// Signature of the code emitted by [`ConstantRoutine`].
pub type ConstantFn = unsafe extern "C" fn() -> u64;

/// x86-64 routine returning a constant derived from its selector
#[derive(Debug)]
pub struct ConstantRoutine {
    size: usize,
    value: u64,
}

impl ConstantRoutine {
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Value the routine for `key` returns under `context`.
    pub fn expected(context: &RoutineContext, key: &Selector) -> u64 {
        key.bits() ^ context.seed
    }
}

impl RoutineGenerator for ConstantRoutine {
    type Context = RoutineContext;
    type Key = Selector;

    fn generate(context: &RoutineContext, key: &Selector, code: &mut [u8]) -> Self {
        let value = Self::expected(context, key);
        let mut asm = Emitter::new(code);

        // mov rax, imm64
        asm.bytes(&[0x48, 0xb8]);
        asm.bytes(&value.to_le_bytes());
        // ret
        asm.bytes(&[0xc3]);

        Self {
            size: asm.len(),
            value,
        }
    }

    fn size(&self) -> usize {
        self.size
    }
}

/// Run a [`ConstantRoutine`] when the host can execute x86-64 code.
///
/// Returns `None` on other architectures.
///
/// # Safety
///
/// `entry` must come from a map generating [`ConstantRoutine`]s into
/// executable memory that is still alive.
pub unsafe fn call_constant(entry: EntryPoint) -> Option<u64> {
    #[cfg(all(unix, target_arch = "x86_64"))]
    {
        // SAFETY: forwarded from the caller.
        let routine = unsafe { entry.cast::<ConstantFn>() };
        // SAFETY: the routine only loads an immediate and returns.
        Some(unsafe { routine() })
    }

    #[cfg(not(all(unix, target_arch = "x86_64")))]
    {
        let _ = entry;
        None
    }
}

/// Sequential writer over a code region.
struct Emitter<'a> {
    code: &'a mut [u8],
    len: usize,
}

impl<'a> Emitter<'a> {
    fn new(code: &'a mut [u8]) -> Self {
        Self { code, len: 0 }
    }

    fn bytes(&mut self, bytes: &[u8]) {
        let end = self.len + bytes.len();
        assert!(
            end <= self.code.len(),
            "code region of {} bytes overflowed",
            self.code.len()
        );
        self.code[self.len..end].copy_from_slice(bytes);
        self.len = end;
    }

    fn len(&self) -> usize {
        self.len
    }
}
