//! Jump-slot relocations and the GOT patcher (spec.md §4.4).
//!
//! `RelType`'s variant set is grounded on the teacher's `reloc::RelType`
//! (`mihaimaganu17-parse-elf/src/reloc.rs`, which already names
//! `JumpSlot`); `SegmentFlags` is grounded on the teacher's
//! `segment::SegmentFlags` bitflags, repurposed here from file-parsing
//! into a RELRO-writability diagnostic (spec.md §5).
use std::ffi::c_void;
use std::mem::size_of;

use bitflags::bitflags;

use crate::arch;
use crate::dynamic::{self, RelocKind};
use crate::error::DecodeError;
use crate::object;
use crate::symbol::symbol_name;

bitflags! {
    /// Mirrors the teacher's `segment::SegmentFlags` (`p_flags` bitmask).
    pub(crate) struct SegmentFlags: u32 {
        const READ = 0x4;
        const WRITE = 0x2;
        const EXEC = 0x1;
    }
}

/// Named relocation types, used only for `log::trace!` diagnostics. The
/// patch loop itself only ever compares the raw type against
/// `arch::JUMP_SLOT` (spec.md §4.4); it never needs this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
enum RelType {
    None,
    W64,
    Pc32,
    Got32,
    Plt32,
    Copy,
    GlobDat,
    JumpSlot,
    Relative,
}

impl TryFrom<u32> for RelType {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        let rel_type = match value {
            0 => Self::None,
            1 => Self::W64,
            2 => Self::Pc32,
            3 => Self::Got32,
            4 => Self::Plt32,
            5 => Self::Copy,
            6 => Self::GlobDat,
            7 => Self::JumpSlot,
            8 => Self::Relative,
            _ => return Err(DecodeError::UnknownRelocType(value)),
        };
        Ok(rel_type)
    }
}

fn describe_reloc_type(value: u32) -> String {
    match RelType::try_from(value) {
        Ok(ty) => format!("{ty:?}"),
        Err(err) => err.to_string(),
    }
}

/// `ELF64_R_SYM`/`ELF64_R_TYPE`: a 64-bit `r_info` packs the symbol table
/// index in the high 32 bits and the relocation type in the low 32 bits.
fn unpack_info(r_info: u64) -> (u32, u32) {
    ((r_info >> 32) as u32, (r_info & 0xffff_ffff) as u32)
}

/// True if the `PT_LOAD` segment covering `vaddr` (object-relative, not yet
/// biased) is writable. Used only to warn before a write that is likely to
/// fault on a RELRO-hardened GOT (spec.md §5); the write is attempted
/// regardless, this never blocks it.
fn covering_segment_is_writable(object: &object::LoadedObject, vaddr: usize) -> bool {
    object.phdrs().iter().any(|phdr| {
        phdr.p_type == libc::PT_LOAD
            && vaddr >= phdr.p_vaddr as usize
            && vaddr < phdr.p_vaddr as usize + phdr.p_memsz as usize
            && SegmentFlags::from_bits_truncate(phdr.p_flags).contains(SegmentFlags::WRITE)
    })
}

/// Reads the `index`-th jump-slot relocation record, returning
/// `(r_offset, r_info)` regardless of whether the table holds `Elf64_Rel`
/// or `Elf64_Rela` entries (the addend is irrelevant for jump slots,
/// spec.md §3).
///
/// SAFETY: `jmprel` must point at a live table of at least `index + 1`
/// entries of the given `kind`.
unsafe fn read_record(jmprel: usize, kind: RelocKind, index: usize) -> (u64, u64) {
    match kind {
        RelocKind::Rel => {
            let rec = unsafe { (jmprel as *const libc::Elf64_Rel).add(index).read() };
            (rec.r_offset, rec.r_info)
        }
        RelocKind::Rela => {
            let rec = unsafe { (jmprel as *const libc::Elf64_Rela).add(index).read() };
            (rec.r_offset, rec.r_info)
        }
    }
}

fn record_stride(kind: RelocKind) -> usize {
    match kind {
        RelocKind::Rel => size_of::<libc::Elf64_Rel>(),
        RelocKind::Rela => size_of::<libc::Elf64_Rela>(),
    }
}

/// Rewrites every jump-slot GOT cell, across every loaded object, whose
/// relocation names `name`, to `addr`. Returns the number of cells
/// rewritten (an ambient addition beyond the public façade's contract:
/// `intercept`/`unintercept` don't surface it, but it drives their
/// diagnostics and is asserted on directly in tests).
///
/// Objects with no `JMPREL` (no lazily-bound imports) or no recognized
/// `PLTREL` discriminant are skipped (spec.md §4.4). All matching cells
/// across all objects are rewritten in a single pass; no prior contents are
/// recorded anywhere (spec.md §4.4, "Tie-break and ordering").
pub(crate) fn patch(name: &str, addr: *mut c_void) -> usize {
    let mut patched = 0usize;

    object::for_each_object(|obj| {
        let parsed = dynamic::parse_dynamic_segment(obj);
        let (Some(jmprel), Some(symtab), Some(strtab), Some(kind)) =
            (parsed.jmprel, parsed.symtab, parsed.strtab, parsed.pltrel)
        else {
            return false;
        };

        let stride = record_stride(kind);
        let count = parsed.pltrelsz / stride;

        for index in 0..count {
            // SAFETY: `jmprel`/`kind`/`count` were derived together from
            // this object's own `DT_JMPREL`/`DT_PLTREL`/`DT_PLTRELSZ`.
            let (r_offset, r_info) = unsafe { read_record(jmprel, kind, index) };
            let (sym_index, r_type) = unpack_info(r_info);

            if r_type != arch::JUMP_SLOT {
                log::trace!(
                    "skipping non-jump-slot relocation ({})",
                    describe_reloc_type(r_type)
                );
                continue;
            }

            // SAFETY: `sym_index` indexes this object's own `DT_SYMTAB`,
            // which every well-formed jump-slot relocation does.
            let sym = unsafe { (symtab as *const libc::Elf64_Sym).add(sym_index as usize).read() };
            // SAFETY: `strtab` is this object's own `DT_STRTAB`.
            let sym_name = unsafe { symbol_name(strtab as *const u8, sym.st_name) };

            if sym_name.to_bytes() != name.as_bytes() {
                continue;
            }

            if !covering_segment_is_writable(obj, r_offset as usize) {
                log::warn!(
                    "GOT cell for {name:?} in {:?} is not in a writable segment (RELRO?); \
                     the write below may fault",
                    obj.name()
                );
            }

            let got_cell = (obj.load_bias() + r_offset as usize) as *mut *mut c_void;
            // SAFETY: `got_cell` is the address a jump-slot relocation in
            // this object names as a GOT slot; on x86-64 an aligned
            // pointer-sized store is atomic, so concurrent readers observe
            // either the old or the new value, never a torn one (spec.md §5).
            unsafe { got_cell.write_volatile(addr) };
            patched += 1;
            log::debug!(
                "patched GOT cell {got_cell:?} for {name:?} in {:?}",
                obj.name()
            );
        }

        false
    });

    patched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jump_slot_type_is_seven() {
        assert_eq!(RelType::try_from(7).unwrap(), RelType::JumpSlot);
        assert_eq!(arch::JUMP_SLOT, 7);
    }

    #[test]
    fn unknown_reloc_type_is_reported_not_panicked() {
        assert!(RelType::try_from(999).is_err());
        assert_eq!(describe_reloc_type(999), "unknown relocation type 0x3e7");
    }

    #[test]
    fn unpack_info_splits_symbol_index_and_type() {
        let r_info: u64 = (42u64 << 32) | 7u64;
        assert_eq!(unpack_info(r_info), (42, 7));
    }

    #[test]
    fn patching_an_unused_symbol_name_touches_nothing() {
        assert_eq!(
            patch("definitely_not_a_symbol_xyz", std::ptr::null_mut()),
            0
        );
    }
}
