//! The symbol table and the resolver (spec.md §4.3).
//!
//! `SymbolType`'s nibble split of `st_info` is grounded on the teacher's
//! `sym::SymbolInfo`/`SymbolType` (`mihaimaganu17-parse-elf/src/sym.rs`),
//! with `STT_GNU_IFUNC` promoted from the teacher's unfinished
//! `OsSpecific(u8)` catch-all to its own variant, since ifunc dispatch is
//! load-bearing for this crate (spec.md §4.3, scenario 5).
use std::ffi::{c_void, CStr};
use std::os::raw::c_char;

use crate::{dynamic, object};

const SHN_UNDEF: u16 = 0;
const STT_GNU_IFUNC: u8 = 10;

/// Low nibble of `st_info`, mirroring the teacher's `SymbolType` but
/// collapsed to the one distinction this crate acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolType {
    GnuIfunc,
    Other,
}

impl From<u8> for SymbolType {
    fn from(st_info: u8) -> Self {
        match st_info & 0xf {
            STT_GNU_IFUNC => Self::GnuIfunc,
            _ => Self::Other,
        }
    }
}

/// Reads the NUL-terminated name at `strtab + st_name`.
///
/// SAFETY: `strtab` must point at a valid string table and `st_name` must be
/// a valid offset into it, both guaranteed by `ParsedDynamic` having come
/// from a real `DT_STRTAB` entry for the object `sym` was read out of.
pub(crate) unsafe fn symbol_name<'a>(strtab: *const u8, st_name: u32) -> &'a CStr {
    unsafe { CStr::from_ptr(strtab.add(st_name as usize) as *const c_char) }
}

/// Invokes an indirect-function resolver and returns the address it
/// produces (spec.md §4.3: "call that address as a zero-argument function
/// pointer and use the returned pointer as the final address").
///
/// SAFETY: `resolver_addr` must be the entry point of a symbol whose type is
/// `STT_GNU_IFUNC` (i.e. a valid, ABI-conforming `extern "C" fn() -> *mut
/// c_void` per the platform's ifunc convention).
unsafe fn call_ifunc_resolver(resolver_addr: *mut c_void) -> *mut c_void {
    type Resolver = unsafe extern "C" fn() -> *mut c_void;
    let resolver: Resolver = unsafe { std::mem::transmute(resolver_addr) };
    unsafe { resolver() }
}

/// Returns the runtime address of the first *defined* symbol named `name`
/// across every loaded object (VDSO excluded), honoring indirect-function
/// resolvers. First-definition-wins (invariant iv): the object iterator's
/// own traversal order decides ties.
pub(crate) fn resolve(name: &str) -> Option<*mut c_void> {
    let mut found = None;

    object::for_each_object(|obj| {
        let parsed = dynamic::parse_dynamic_segment(obj);
        let (Some(symtab), Some(strtab)) = (parsed.symtab, parsed.strtab) else {
            return false;
        };

        let mut sym_ptr = symtab as *const libc::Elf64_Sym;
        let strtab_ptr = strtab as *const u8;

        // Scan terminates when the advancing symbol pointer reaches the
        // string table (spec.md §9, "Symbol-table termination heuristic").
        // This is a strict `<`, matching
        // `examples/original_source/program_headers.c`'s
        // `(void*)sym < (void*)strtab`, so the table's all-zero terminator
        // entry is visited (and rejected as `SHN_UNDEF`) rather than skipped.
        // Not guaranteed by the ELF spec in general, but true of every
        // glibc-linked object, which is this crate's reference target.
        while (sym_ptr as *const u8) < strtab_ptr {
            // SAFETY: `sym_ptr` is within the bounds established above for
            // as long as the loop condition holds.
            let sym = unsafe { sym_ptr.read() };

            if sym.st_shndx != SHN_UNDEF {
                // SAFETY: `strtab_ptr`/`sym.st_name` come from this same
                // object's own dynamic segment.
                let sym_name = unsafe { symbol_name(strtab_ptr, sym.st_name) };
                if sym_name.to_bytes() == name.as_bytes() {
                    let addr = (obj.load_bias() + sym.st_value as usize) as *mut c_void;
                    let addr = if SymbolType::from(sym.st_info) == SymbolType::GnuIfunc {
                        // SAFETY: `st_info`'s type nibble is STT_GNU_IFUNC.
                        unsafe { call_ifunc_resolver(addr) }
                    } else {
                        addr
                    };

                    log::debug!("resolved {name:?} -> {addr:?} in {:?}", obj.name());
                    found = Some(addr);
                    return true;
                }
            }

            // SAFETY: still within the symbol table; the loop condition is
            // re-checked before the next dereference.
            sym_ptr = unsafe { sym_ptr.add(1) };
        }

        false
    });

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_known_libc_symbol() {
        let addr = resolve("abort").expect("abort should be defined in every linked process");
        assert!(!addr.is_null());
    }

    #[test]
    fn resolution_is_idempotent() {
        let first = resolve("abort");
        let second = resolve("abort");
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_symbol_resolves_to_none() {
        assert!(resolve("definitely_not_a_symbol_xyz").is_none());
    }

    #[test]
    fn ifunc_type_is_recognized_from_the_low_nibble() {
        assert_eq!(SymbolType::from(STT_GNU_IFUNC), SymbolType::GnuIfunc);
        assert_eq!(SymbolType::from(STT_GNU_IFUNC | 0x10), SymbolType::GnuIfunc);
        assert_eq!(SymbolType::from(2 /* STT_FUNC */), SymbolType::Other);
    }
}
