// =============================================================================
// heapcraft — Diagnostics
// =============================================================================
//
// Centralizes the three error tiers the allocator can hit:
//
//   fatal            — unrecoverable corruption or resource exhaustion.
//                       Logs at `error` level, then aborts the process.
//   warn_double_free — recoverable; logs at `warn` level, no state change.
//   debug/trace       — expected, non-erroneous outcomes (overflow in
//                       allocate_zeroed, heap growth) worth a record for
//                       anyone debugging allocator behavior, but not
//                       warnings.
//
// WHY ONE MODULE FOR THIS?
//   Without it, `process::abort()` calls and their preceding log lines
//   would be scattered across every validation site in `engine.rs`. One
//   vocabulary here ("this is fatal" vs "this is advisory") keeps that
//   translation in a single place to read and test.
//
// WHY THE `log` CRATE AND NOT `println!`/`eprintln!` DIRECTLY?
//   `log` defers the choice of sink to whatever the embedding binary
//   installs (or does not install) as its logger — exactly the role the
//   spec assigns to "the byte sink for diagnostics": an external
//   collaborator this crate talks to but never owns. The crate emits
//   records; it does not decide where they end up.
// =============================================================================

/// Logs `message` at `error` level, then aborts the process.
///
/// Used for the fatal tier only: OS mapping failure, an unaligned pointer
/// passed to `release`, or a header whose magic does not match. All three
/// indicate either resource exhaustion or memory corruption — there is no
/// safe way to keep running.
pub fn fatal(message: &str) -> ! {
    log::error!("heapcraft: {message}");
    std::process::abort();
}

/// Logs the double-free warning. The caller is expected to return
/// immediately afterward without touching allocator state.
pub fn warn_double_free(ptr: *mut u8) {
    log::warn!("heapcraft: double free detected for {ptr:p}");
}

/// Logs an expected, recoverable failure (overflow, allocation failure)
/// that a caller will see reflected in a null/None return value.
pub fn debug_recoverable(message: &str) {
    log::debug!("heapcraft: {message}");
}

/// Logs a routine lifecycle event (heap initialization, growth) at trace
/// level — useful when diagnosing fragmentation or growth behavior, noisy
/// otherwise.
pub fn trace_lifecycle(message: &str) {
    log::trace!("heapcraft: {message}");
}
