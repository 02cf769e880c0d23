//! The dynamic segment: tag-value table parsed out of a `PT_DYNAMIC`
//! program header (spec.md §4.2).
//!
//! `DynamicTag`'s variant set and `From` shape are grounded on the
//! teacher's `segment::DynamicTag` (`mihaimaganu17-parse-elf/src/segment.rs`),
//! carried over unchanged in spirit; the parsing itself is rewritten from a
//! `Reader`-over-a-byte-slice walk to a raw-pointer walk over live process
//! memory, since the dynamic segment here was never a file.
/// Reserved inclusive range, environment-specific.
const DT_LOOS: i64 = 0x6000_0000;
const DT_HIOS: i64 = 0x6fff_ffff;
/// Reserved inclusive range, processor-specific.
const DT_LOPROC: i64 = 0x70000000;
const DT_HIPROC: i64 = 0x7fffffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DynamicTag {
    Null,
    Needed,
    PltRelSz,
    PltGot,
    Hash,
    StrTab,
    SymTab,
    Rela,
    RelaSz,
    RelaEnt,
    StrSz,
    SymEnt,
    Init,
    Fini,
    SoName,
    RPath,
    Symbolic,
    Rel,
    RelSz,
    RelEnt,
    PltRel,
    Debug,
    TextRel,
    JmpRel,
    BindNow,
    InitArray,
    FiniArray,
    InitArraySz,
    FiniArraySz,
    OsSpecific(i64),
    ProcSpecific(i64),
    Other(i64),
}

impl From<i64> for DynamicTag {
    /// Infallible: any tag this crate does not act on (the long tail of GNU
    /// extensions such as `DT_GNU_HASH`, `DT_VERSYM`, `DT_FLAGS_1`, ...) is
    /// not an error, just not one of the five tags spec.md §3 cares about.
    fn from(value: i64) -> Self {
        match value {
            0 => Self::Null,
            1 => Self::Needed,
            2 => Self::PltRelSz,
            3 => Self::PltGot,
            4 => Self::Hash,
            5 => Self::StrTab,
            6 => Self::SymTab,
            7 => Self::Rela,
            8 => Self::RelaSz,
            9 => Self::RelaEnt,
            10 => Self::StrSz,
            11 => Self::SymEnt,
            12 => Self::Init,
            13 => Self::Fini,
            14 => Self::SoName,
            15 => Self::RPath,
            16 => Self::Symbolic,
            17 => Self::Rel,
            18 => Self::RelSz,
            19 => Self::RelEnt,
            20 => Self::PltRel,
            21 => Self::Debug,
            22 => Self::TextRel,
            23 => Self::JmpRel,
            24 => Self::BindNow,
            25 => Self::InitArray,
            26 => Self::FiniArray,
            27 => Self::InitArraySz,
            28 => Self::FiniArraySz,
            DT_LOOS..=DT_HIOS => Self::OsSpecific(value),
            DT_LOPROC..=DT_HIPROC => Self::ProcSpecific(value),
            _ => Self::Other(value),
        }
    }
}

/// Raw on-disk/in-memory layout of one dynamic entry. `d_un` is a union of
/// `d_val`/`d_ptr` in the ELF spec; both are a single 8-byte word, so a
/// plain `u64` field is bit-for-bit equivalent (the same model
/// `examples/other_examples/3d3350fb_weizhiao-rust-dlopen__src-core_impl-init.rs.rs`'s
/// `ElfDyn` uses, rather than depending on how a given `libc` version
/// exposes the union).
#[repr(C)]
#[derive(Clone, Copy)]
struct RawDynEntry {
    d_tag: i64,
    d_un: u64,
}

/// The subset of the dynamic segment this crate needs (spec.md §3), with
/// every field defaulting to null/zero and independently optional.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ParsedDynamic {
    pub strtab: Option<usize>,
    pub symtab: Option<usize>,
    pub jmprel: Option<usize>,
    pub pltrelsz: usize,
    pub pltrel: Option<RelocKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelocKind {
    Rel,
    Rela,
}

/// Finds the first `PT_DYNAMIC` header in `object` and walks its
/// tag-value table (spec.md §4.2 algorithm). Returns a default/empty
/// `ParsedDynamic` if the object has no dynamic segment.
///
/// `STRTAB`/`SYMTAB` are *not* re-biased by `load_bias`: on glibc they are
/// already relocated runtime pointers (spec.md §4.2 edge case, confirmed by
/// `examples/original_source/program_headers.c`, which stores
/// `dyn->d_un.d_ptr` for both verbatim).
pub(crate) fn parse_dynamic_segment(object: &crate::object::LoadedObject) -> ParsedDynamic {
    let Some(phdr) = object
        .phdrs()
        .iter()
        .find(|phdr| phdr.p_type == libc::PT_DYNAMIC)
    else {
        return ParsedDynamic::default();
    };

    let mut cursor = (object.load_bias() + phdr.p_vaddr as usize) as *const RawDynEntry;
    let mut parsed = ParsedDynamic::default();

    loop {
        // SAFETY: the dynamic segment is a NUL(-tag)-terminated array of
        // `RawDynEntry` at this address, per the ELF spec and the PT_DYNAMIC
        // header's own `p_vaddr`.
        let entry = unsafe { cursor.read() };
        let tag = DynamicTag::from(entry.d_tag);

        match tag {
            DynamicTag::Null => break,
            DynamicTag::StrTab => parsed.strtab = Some(entry.d_un as usize),
            DynamicTag::SymTab => parsed.symtab = Some(entry.d_un as usize),
            DynamicTag::JmpRel => parsed.jmprel = Some(entry.d_un as usize),
            DynamicTag::PltRelSz => parsed.pltrelsz = entry.d_un as usize,
            DynamicTag::PltRel => {
                parsed.pltrel = match entry.d_un as i64 {
                    17 => Some(RelocKind::Rel),  // DT_REL
                    7 => Some(RelocKind::Rela),  // DT_RELA
                    _ => None,
                };
            }
            _ => {}
        }

        // SAFETY: still within the dynamic segment; `Null` breaks before the
        // cursor can run past the table's terminator.
        cursor = unsafe { cursor.add(1) };
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_tags() {
        assert_eq!(DynamicTag::from(0), DynamicTag::Null);
        assert_eq!(DynamicTag::from(5), DynamicTag::StrTab);
        assert_eq!(DynamicTag::from(6), DynamicTag::SymTab);
        assert_eq!(DynamicTag::from(23), DynamicTag::JmpRel);
        assert_eq!(DynamicTag::from(20), DynamicTag::PltRel);
        assert_eq!(DynamicTag::from(2), DynamicTag::PltRelSz);
    }

    #[test]
    fn os_and_proc_specific_ranges_are_carved_out() {
        assert_eq!(
            DynamicTag::from(0x6ffffef5), // DT_GNU_HASH
            DynamicTag::OsSpecific(0x6ffffef5)
        );
        assert_eq!(
            DynamicTag::from(0x70000000),
            DynamicTag::ProcSpecific(0x70000000)
        );
    }

    #[test]
    fn parses_this_process_own_dynamic_segment() {
        let mut found_any = false;
        crate::object::for_each_object(|object| {
            let parsed = parse_dynamic_segment(object);
            if parsed.symtab.is_some() && parsed.strtab.is_some() {
                found_any = true;
                return true;
            }
            false
        });
        assert!(found_any, "expected at least one object with a dynamic segment");
    }
}
