//! Channel availability probe

use crate::channel::Channel;

/// Check whether `channel` currently accepts writes
///
/// Writes `test_key` with itself as the value and removes it again. Returns
/// `true` only if both steps succeed. Failures are logged and swallowed, so
/// the probe can be repeated freely.
pub fn probe<C: Channel + ?Sized>(channel: &C, test_key: &str) -> bool {
    let result = channel
        .write(test_key, test_key)
        .and_then(|()| channel.remove(test_key));

    match result {
        Ok(()) => true,
        Err(error) => {
            tracing::debug!(key = %test_key, %error, "Storage channel unavailable");
            false
        }
    }
}
