//! Trigger scanning (context pre-classification).
//!
//! Before any regex runs, the matcher scans the context once for a few cheap
//! signals. Rules that declare a bucket (for example "needs digits") are
//! skipped when the context lacks it.
//!
//! ## Design notes
//!
//! - Buckets are necessary conditions only. A rule whose bucket is missing
//!   could not have matched anyway, so gating never changes results.
//! - The scan is a single pass over bytes; every signal is ASCII.

use super::compiled_rules::BucketMask;

/// Coarse characteristics of a context string.
#[derive(Debug, Clone, Copy)]
pub struct TriggerInfo {
    pub buckets: BucketMask,
}

impl TriggerInfo {
    pub fn scan(context: &str) -> Self {
        let mut buckets = BucketMask::empty();

        for b in context.bytes() {
            match b {
                b'0'..=b'9' => buckets |= BucketMask::HAS_DIGITS,
                b'@' => buckets |= BucketMask::HAS_AT,
                b':' => buckets |= BucketMask::HAS_COLON,
                b'/' => buckets |= BucketMask::HAS_SLASH,
                _ => {}
            }
            if buckets.is_all() {
                break;
            }
        }

        // Non-ASCII decimal digits still satisfy `\d`.
        if !buckets.contains(BucketMask::HAS_DIGITS) && context.chars().any(|c| !c.is_ascii() && c.is_numeric()) {
            buckets |= BucketMask::HAS_DIGITS;
        }

        TriggerInfo { buckets }
    }

    /// Whether a rule requiring `required` may run.
    pub fn allows(&self, required: BucketMask) -> bool {
        self.buckets.contains(required)
    }
}
