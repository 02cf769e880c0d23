//! Enumerates every ELF object currently mapped into the process.
//!
//! Grounded on the `dl_iterate_phdr` wrapper in the `phdrs` crate
//! (`examples/other_examples/1af9e843_softdevteam-phdrs__src-lib.rs.rs`),
//! adapted from "collect every object into a `Vec`" to "invoke a caller
//! callback and stop on first match", per spec.md §4.1.
use std::ffi::{c_void, CStr};
use std::marker::PhantomData;
use std::os::raw::c_int;

/// Linux auxiliary-vector key for the VDSO's ELF header address.
/// Not (yet) exported by every `libc` target triple, so it is kept local
/// rather than depended on as `libc::AT_SYSINFO_EHDR`.
const AT_SYSINFO_EHDR: libc::c_ulong = 33;

/// Borrowed, non-owning view of one loaded object, valid only for the
/// duration of a single `for_each_object` callback invocation (spec.md §3).
pub struct LoadedObject<'a> {
    load_bias: usize,
    phdr_count: u16,
    phdrs: *const libc::Elf64_Phdr,
    name_ptr: *const libc::c_char,
    _marker: PhantomData<&'a ()>,
}

impl<'a> LoadedObject<'a> {
    /// Offset added to every virtual address in this object's program headers.
    pub fn load_bias(&self) -> usize {
        self.load_bias
    }

    /// The object's program header table.
    pub fn phdrs(&self) -> &'a [libc::Elf64_Phdr] {
        // SAFETY: `dl_iterate_phdr` guarantees `phdrs` points at `phdr_count`
        // contiguous, live `Elf64_Phdr` entries for the duration of the
        // callback that produced this `LoadedObject`.
        unsafe { std::slice::from_raw_parts(self.phdrs, self.phdr_count as usize) }
    }

    /// The object's path as reported by the dynamic linker (empty for the
    /// main executable). Diagnostic only; not part of the spec's data model.
    pub fn name(&self) -> &'a CStr {
        // SAFETY: `dlpi_name` is always a valid, NUL-terminated C string for
        // the duration of the callback.
        unsafe { CStr::from_ptr(self.name_ptr) }
    }
}

/// Invokes `f` for every currently loaded ELF object, in loader-determined
/// order, skipping the VDSO, until `f` returns `true` or objects are
/// exhausted. Best-effort: `dl_iterate_phdr` has no failure mode to surface.
pub(crate) fn for_each_object(mut f: impl FnMut(&LoadedObject) -> bool) {
    struct Ctx<'a> {
        f: &'a mut dyn FnMut(&LoadedObject) -> bool,
    }

    unsafe extern "C" fn trampoline(
        info: *mut libc::dl_phdr_info,
        _size: usize,
        data: *mut c_void,
    ) -> c_int {
        // SAFETY: `data` was set up by `for_each_object` below to point at a
        // live `Ctx` for the duration of this `dl_iterate_phdr` call.
        let ctx = unsafe { &mut *(data as *mut Ctx) };
        // SAFETY: `dl_iterate_phdr` passes a valid `dl_phdr_info` per entry.
        let info = unsafe { &*info };

        if is_vdso(info) {
            return 0;
        }

        let object = LoadedObject {
            load_bias: info.dlpi_addr as usize,
            phdr_count: info.dlpi_phnum,
            phdrs: info.dlpi_phdr,
            name_ptr: info.dlpi_name,
            _marker: PhantomData,
        };

        log::trace!(
            "object: {:?} bias={:#x} phnum={}",
            object.name(),
            object.load_bias,
            object.phdr_count
        );

        (ctx.f)(&object) as c_int
    }

    let mut ctx = Ctx { f: &mut f };
    let ctx_ptr = &mut ctx as *mut Ctx as *mut c_void;
    // SAFETY: `trampoline` matches the callback ABI `dl_iterate_phdr`
    // expects, and `ctx_ptr` outlives the call.
    unsafe {
        libc::dl_iterate_phdr(Some(trampoline), ctx_ptr);
    }
}

/// Invariant (ii): the VDSO is identified by comparing its program-header
/// array, obtained from `AT_SYSINFO_EHDR`, by pointer identity with the
/// iterated object's own `dlpi_phdr`, exactly what
/// `examples/original_source/program_headers.c`'s `is_vdso` does.
fn is_vdso(info: &libc::dl_phdr_info) -> bool {
    // SAFETY: `getauxval` is a pure read of the process's auxiliary vector.
    let ehdr_vdso = unsafe { libc::getauxval(AT_SYSINFO_EHDR) } as *const libc::Elf64_Ehdr;
    if ehdr_vdso.is_null() {
        return false;
    }

    // SAFETY: the kernel maps a valid VDSO ELF header at this address when
    // `AT_SYSINFO_EHDR` is non-null; `e_phoff` is readable from it.
    let phdr_vdso = unsafe {
        (ehdr_vdso as *const u8).add((*ehdr_vdso).e_phoff as usize) as *const libc::Elf64_Phdr
    };

    std::ptr::eq(info.dlpi_phdr, phdr_vdso)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_at_least_one_object() {
        let mut count = 0;
        for_each_object(|object| {
            count += 1;
            assert!(!object.phdrs().is_empty());
            false
        });
        assert!(count >= 1);
    }

    #[test]
    fn never_yields_the_vdso() {
        for_each_object(|object| {
            assert_ne!(object.name().to_string_lossy(), "linux-vdso.so.1");
            false
        });
    }

    #[test]
    fn stops_iteration_when_callback_returns_true() {
        let mut visited = 0;
        for_each_object(|_object| {
            visited += 1;
            true
        });
        assert_eq!(visited, 1);
    }
}
