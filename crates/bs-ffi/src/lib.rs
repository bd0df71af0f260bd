mod error;
mod session;
mod types;

pub use error::*;
pub use session::*;
pub use types::*;

use std::ffi::CString;
use std::os::raw::c_char;

use bs_hyps::unpack;
use bs_search::{StepInput, StepOptions, TopKTerminated};
use bs_tensor::{Shape, Tensor};

/// Execute a closure that returns a `BSStatus`, catching any panics
/// and converting them into `BSStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> BSStatus + std::panic::UnwindSafe>(f: F) -> BSStatus {
    match std::panic::catch_unwind(f) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic".to_string());
            BSStatus::ErrorInternal
        }
    }
}

/// View `len` elements at `ptr`. A null pointer is only accepted for `len == 0`.
unsafe fn input_slice<'a, T>(ptr: *const T, len: usize) -> Option<&'a [T]> {
    if len == 0 {
        Some(Default::default())
    } else if ptr.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts(ptr, len))
    }
}

/// Mutable counterpart of `input_slice`.
unsafe fn output_slice<'a, T>(ptr: *mut T, len: usize) -> Option<&'a mut [T]> {
    if len == 0 {
        Some(Default::default())
    } else if ptr.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts_mut(ptr, len))
    }
}

/// Create a decode session.
///
/// On success, writes a heap-allocated `BSSession` pointer into
/// `*session_out` and returns `BSStatus::Ok`. The caller must later call
/// `bs_session_destroy` to free the session.
#[no_mangle]
pub unsafe extern "C" fn bs_session_create(
    dims: BSDims,
    params: BSStepParams,
    session_out: *mut *mut BSSession,
) -> BSStatus {
    catch_panic(|| {
        if session_out.is_null() {
            set_last_error("session_out is null".to_string());
            return BSStatus::ErrorInvalidArgument;
        }
        let session = match BSSession::new(dims.into(), StepOptions::from(&params)) {
            Ok(s) => s,
            Err(e) => return fail(BSStatus::ErrorInvalidArgument, e),
        };
        unsafe {
            *session_out = Box::into_raw(Box::new(session));
        }
        BSStatus::Ok
    })
}

/// Destroy a session previously created by `bs_session_create`.
///
/// Passing a null pointer is a no-op and returns `BSStatus::Ok`.
#[no_mangle]
pub unsafe extern "C" fn bs_session_destroy(session: *mut BSSession) -> BSStatus {
    if session.is_null() {
        return BSStatus::Ok;
    }
    drop(Box::from_raw(session));
    BSStatus::Ok
}

/// Run decode step `t`.
///
/// `probs` holds `hyp_size * vocab_size` log-probabilities and `attn` holds
/// `hyp_size * attn_dim` attention weights, both row-major. When `done_out`
/// is non-null it receives the global done flag.
#[no_mangle]
pub unsafe extern "C" fn bs_session_step(
    session: *mut BSSession,
    t: u32,
    probs: *const f32,
    probs_len: usize,
    attn: *const f32,
    attn_len: usize,
    done_out: *mut bool,
) -> BSStatus {
    catch_panic(|| {
        if session.is_null() {
            set_last_error("null session".to_string());
            return BSStatus::ErrorInvalidArgument;
        }
        let session = unsafe { &mut *session };
        let (probs, attn) = match unsafe { (input_slice(probs, probs_len), input_slice(attn, attn_len)) } {
            (Some(p), Some(a)) => (p, a),
            _ => {
                set_last_error("null probs or attn with non-zero length".to_string());
                return BSStatus::ErrorInvalidArgument;
            }
        };

        let dims = *session.state.dims();
        let probs = match Tensor::from_vec(
            probs.to_vec(),
            Shape::new(vec![dims.hyp_size(), dims.vocab_size]),
        ) {
            Ok(p) => p,
            Err(e) => return fail(BSStatus::ErrorInvalidArgument, format!("probs: {}", e)),
        };
        let attn = match Tensor::from_vec(attn.to_vec(), Shape::new(vec![dims.hyp_size(), dims.attn_dim])) {
            Ok(a) => a,
            Err(e) => return fail(BSStatus::ErrorInvalidArgument, format!("attn: {}", e)),
        };

        let outcome = match session
            .kernel
            .step(&mut session.state, &StepInput::new(&probs, &attn), t as usize)
        {
            Ok(o) => o,
            Err(e) => return fail(BSStatus::ErrorStep, e),
        };
        if !done_out.is_null() {
            unsafe { *done_out = outcome.done };
        }
        session.last_outcome = Some(outcome);
        BSStatus::Ok
    })
}

/// Copy the per-beam done flags of the last step into `out` (`num_beams`).
#[no_mangle]
pub unsafe extern "C" fn bs_session_beam_done(
    session: *const BSSession,
    out: *mut bool,
    len: usize,
) -> BSStatus {
    catch_panic(|| {
        if session.is_null() {
            set_last_error("null session".to_string());
            return BSStatus::ErrorInvalidArgument;
        }
        let session = unsafe { &*session };
        let flags = session.beam_done();
        match unsafe { output_slice(out, len) } {
            Some(out) if out.len() == flags.len() => {
                out.copy_from_slice(&flags);
                BSStatus::Ok
            }
            _ => fail(
                BSStatus::ErrorInvalidArgument,
                format!("beam_done output needs {} entries", flags.len()),
            ),
        }
    })
}

/// Copy the best terminated score of each beam into `out` (`num_beams`).
#[no_mangle]
pub unsafe extern "C" fn bs_session_best_scores(
    session: *const BSSession,
    out: *mut f32,
    len: usize,
) -> BSStatus {
    catch_panic(|| {
        if session.is_null() {
            set_last_error("null session".to_string());
            return BSStatus::ErrorInvalidArgument;
        }
        let session = unsafe { &*session };
        let best = session.state.best_scores();
        match unsafe { output_slice(out, len) } {
            Some(out) if out.len() == best.len() => {
                out.copy_from_slice(best);
                BSStatus::Ok
            }
            _ => fail(
                BSStatus::ErrorInvalidArgument,
                format!("best_scores output needs {} entries", best.len()),
            ),
        }
    })
}

/// Rank the session's terminated hypotheses and unpack the best `k` per beam.
///
/// Outputs are laid out beam-major, `num_beams * k` entries: `ids_out` holds
/// `max_seq_length` zero-padded ids per entry, `lengths_out` the unpadded
/// lengths and `scores_out` the normalized scores. Missing entries are zero.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn bs_session_top_k_unpack(
    session: *const BSSession,
    params: BSTopKParams,
    src_seq_lengths: *const u32,
    num_src: usize,
    ids_out: *mut u32,
    ids_len: usize,
    lengths_out: *mut u32,
    scores_out: *mut f32,
    out_len: usize,
) -> BSStatus {
    catch_panic(|| {
        if session.is_null() {
            set_last_error("null session".to_string());
            return BSStatus::ErrorInvalidArgument;
        }
        let session = unsafe { &*session };
        let dims = *session.state.dims();
        let k = params.k as usize;
        let max_len = params.max_seq_length as usize;
        let entries = dims.num_beams * k;
        if out_len != entries || ids_len != entries * max_len {
            return fail(
                BSStatus::ErrorInvalidArgument,
                format!(
                    "outputs need {} entries and {} ids, got {} and {}",
                    entries,
                    entries * max_len,
                    out_len,
                    ids_len
                ),
            );
        }
        let (src_lengths, ids_out, lengths_out, scores_out) = match unsafe {
            (
                input_slice(src_seq_lengths, num_src),
                output_slice(ids_out, ids_len),
                output_slice(lengths_out, out_len),
                output_slice(scores_out, out_len),
            )
        } {
            (Some(s), Some(i), Some(l), Some(sc)) => (s, i, l, sc),
            _ => {
                set_last_error("null buffer with non-zero length".to_string());
                return BSStatus::ErrorInvalidArgument;
            }
        };
        let src_lengths: Vec<usize> = src_lengths.iter().map(|&l| l as usize).collect();

        let selector = match TopKTerminated::new(params.to_options(dims.hyps_per_beam)) {
            Ok(s) => s,
            Err(e) => return fail(BSStatus::ErrorInvalidArgument, e),
        };
        let top = match selector.select(session.state.done_hyps(), &src_lengths) {
            Ok(t) => t,
            Err(e) => return fail(BSStatus::ErrorTopK, e),
        };
        let records: Vec<Vec<u8>> = top.into_iter().flatten().collect();
        let batch = unpack(&records, max_len);
        if let Some(failure) = batch.failures.first() {
            return fail(
                BSStatus::ErrorInternal,
                format!("record {}: {}", failure.index, failure.error),
            );
        }

        ids_out.copy_from_slice(batch.ids.data());
        for (dst, &len) in lengths_out.iter_mut().zip(&batch.lengths) {
            *dst = len as u32;
        }
        scores_out.copy_from_slice(&batch.scores);
        BSStatus::Ok
    })
}

/// Retrieve the last error message.
///
/// Returns a pointer to a C string describing the most recent error, or
/// null if no error has occurred. The caller must free the returned string
/// with `bs_free_string`.
#[no_mangle]
pub extern "C" fn bs_last_error() -> *mut c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null_mut(),
    }
}

/// Free a string previously returned by `bs_last_error`.
#[no_mangle]
pub unsafe extern "C" fn bs_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
