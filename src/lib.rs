//! Runtime PLT/GOT function interception for dynamically linked, x86-64
//! Linux processes.
//!
//! Given the name of a symbol resolved through the procedure linkage table,
//! [`intercept_function`] rewrites every GOT jump-slot cell naming that
//! symbol, across every object currently loaded into the process, to point
//! at a caller-supplied replacement, and returns the address the symbol
//! originally resolved to. [`unintercept_function`] reverses this by
//! resolving the symbol fresh and patching the jump slots back to it.
//!
//! ```no_run
//! use std::ffi::c_void;
//!
//! extern "C" fn my_puts(_s: *const i8) -> i32 {
//!     0
//! }
//!
//! let original = interceptor::intercept_function("puts", my_puts as *mut c_void);
//! assert!(original.is_some());
//! # let _ = original;
//! ```
mod arch;
mod dynamic;
mod error;
mod object;
mod reloc;
mod symbol;

use std::ffi::c_void;

/// Redirects every GOT jump-slot cell naming `name` to `replacement`,
/// across every object currently loaded into the process (VDSO excluded).
///
/// Returns the address `name` resolved to just before patching (the value
/// a caller typically stashes to call through to the original
/// implementation), or `None` if no loaded object defines `name`. If
/// `name` resolves but no jump-slot relocation references it (e.g. it was
/// never called through the PLT, or binding already happened eagerly and
/// was since overwritten), this still returns the resolved address, though
/// no GOT cell is rewritten.
pub fn intercept_function(name: &str, replacement: *mut c_void) -> Option<*mut c_void> {
    let original = symbol::resolve(name)?;
    let patched = reloc::patch(name, replacement);

    log::info!("intercepted {name:?}: {original:?} -> {replacement:?} ({patched} cell(s))");

    Some(original)
}

/// Reverses a previous [`intercept_function`] call by resolving `name`'s
/// current definition and patching every matching GOT jump-slot cell back
/// to it. A no-op if `name` does not currently resolve to any loaded
/// object's definition.
///
/// This does not remember what `intercept_function` last installed; it
/// simply re-resolves `name` the same way `intercept_function` did and
/// patches to that address. If the replacement function itself defines a
/// symbol named `name` (it ordinarily does not), this restores to that
/// instead of the pre-interception original.
pub fn unintercept_function(name: &str) {
    let Some(original) = symbol::resolve(name) else {
        log::warn!("unintercept_function({name:?}): symbol does not resolve, nothing to do");
        return;
    };

    let patched = reloc::patch(name, original);
    log::info!("restored {name:?} -> {original:?} ({patched} cell(s))");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intercepting_an_unknown_symbol_returns_none() {
        assert!(intercept_function("definitely_not_a_symbol_xyz", std::ptr::null_mut()).is_none());
    }

    #[test]
    fn uninterecpting_an_unknown_symbol_is_a_quiet_no_op() {
        unintercept_function("definitely_not_a_symbol_xyz");
    }

    #[test]
    fn intercept_then_unintercept_round_trips_through_resolve() {
        let _ = env_logger::try_init();

        let original = symbol::resolve("abort").expect("abort is always defined");

        let replacement = original; // no real replacement available in-process; exercise the path
        let returned = intercept_function("abort", replacement);
        assert_eq!(returned, Some(original));

        unintercept_function("abort");
        assert_eq!(symbol::resolve("abort"), Some(original));
    }
}
