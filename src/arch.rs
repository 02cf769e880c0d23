//! Architecture-specific constants, isolated behind one module.
//!
//! Only x86-64 is implemented (the spec's reference target). A second
//! architecture (aarch64's `R_AARCH64_JUMP_SLOT`, say) is meant to be a
//! second `cfg`-gated block here, not a rewrite of `reloc.rs` or
//! `symbol.rs` (see spec.md §9, "Architecture generality").

/// Relocation type carried by a PLT/GOT jump-slot entry on this architecture.
#[cfg(target_arch = "x86_64")]
pub(crate) const JUMP_SLOT: u32 = 7; // R_X86_64_JUMP_SLOT

#[cfg(not(target_arch = "x86_64"))]
compile_error!("interceptor currently only supports x86-64 (R_X86_64_JUMP_SLOT)");
