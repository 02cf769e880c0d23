//! Internal error taxonomy.
//!
//! Nothing here crosses the public façade (`intercept_function`,
//! `unintercept_function`): both are infallible at the API level per the
//! crate's documented propagation policy. Unrecognized dynamic tags and
//! unrecognized relocation types are not treated as errors at all, they
//! are simply not one of the handful of tags/types this crate acts on, and
//! are skipped. `DecodeError` exists only for the one place a raw byte out
//! of process memory is decoded into a named enum purely for diagnostics
//! (`reloc::describe_reloc_type`, used in `log::trace!` lines).
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum DecodeError {
    #[error("unknown relocation type {0:#x}")]
    UnknownRelocType(u32),
}
