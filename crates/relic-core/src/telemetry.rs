// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

// Commit-protocol telemetry, compiled in only with the `telemetry` feature.
// Events are one hand-formatted JSON object per line on stdout; the payload
// is a couple of integers, not worth a serialization dependency.

#[cfg(feature = "telemetry")]
fn ts_micros() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_micros())
}

#[cfg(feature = "telemetry")]
fn emit(kind: &str, attempt: u64) {
    use std::io::Write as _;
    let mut out = std::io::stdout().lock();
    let _ = writeln!(
        out,
        r#"{{"timestamp_micros":{},"event":"{}","attempt":{}}}"#,
        ts_micros(),
        kind,
        attempt
    );
}

/// Emits a conflict telemetry event when optimistic validation fails and the
/// transaction function is about to rerun.
///
/// Best-effort: I/O errors are ignored and timestamps fall back to 0 on
/// clock errors.
#[cfg(feature = "telemetry")]
pub(crate) fn conflict(attempt: u64) {
    emit("conflict", attempt);
}

/// Emits a commit telemetry event with the number of attempts the
/// transaction needed.
///
/// Best-effort: I/O errors are ignored and timestamps fall back to 0 on
/// clock errors.
#[cfg(feature = "telemetry")]
pub(crate) fn commit(attempts: u64) {
    emit("commit", attempts);
}
