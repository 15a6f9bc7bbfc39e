// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SIGSEGV` handling (§6 "CLI flags": "Signal `SIGSEGV` logs a backtrace
//! to stderr and re-raises"). `libc::backtrace`/`backtrace_symbols_fd` are
//! used instead of `std::backtrace::Backtrace` because the latter
//! allocates through Rust's global allocator, which is not safe to call
//! from inside a signal handler; the two libc calls are the documented
//! async-signal-safe way to dump a trace from one.

use nix::libc;
use nix::sys::signal::{self, SigHandler, Signal};

const MAX_FRAMES: usize = 128;

extern "C" fn handle_sigsegv(_signum: libc::c_int) {
    let mut frames: [*mut libc::c_void; MAX_FRAMES] = [std::ptr::null_mut(); MAX_FRAMES];
    let count = unsafe { libc::backtrace(frames.as_mut_ptr(), MAX_FRAMES as libc::c_int) };
    unsafe { libc::backtrace_symbols_fd(frames.as_ptr(), count, libc::STDERR_FILENO) };

    // Restore the default disposition and re-raise so the process still
    // terminates (and dumps core, if enabled) the way an unhandled SIGSEGV
    // normally would.
    unsafe {
        let _ = signal::signal(Signal::SIGSEGV, SigHandler::SigDfl);
    }
    let _ = signal::raise(Signal::SIGSEGV);
}

/// Installs the handler once at startup. Safe to call multiple times;
/// each call just replaces the disposition with the same handler.
pub fn install() {
    unsafe {
        if let Err(e) = signal::signal(Signal::SIGSEGV, SigHandler::Handler(handle_sigsegv)) {
            tracing::warn!(error = %e, "failed to install SIGSEGV handler");
        }
    }
}
