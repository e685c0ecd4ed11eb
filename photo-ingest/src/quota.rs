use crate::models::StorageStats;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Storage ceiling was reached or the upload would push usage past it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaExceeded {
    pub used_bytes: i64,
    pub candidate_bytes: i64,
    pub limit_bytes: i64,
}

impl std::fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Storage limit reached: {} of {} bytes used, upload of {} bytes rejected",
            self.used_bytes, self.limit_bytes, self.candidate_bytes
        )
    }
}

impl std::error::Error for QuotaExceeded {}

/// Admission check comparing prospective usage against a configured ceiling
///
/// This is a pre-check against a stats snapshot, not a reservation:
/// concurrent in-flight uploads can transiently push usage past the
/// ceiling. The aggregate itself stays transactionally consistent.
#[derive(Debug, Clone, Copy)]
pub struct QuotaGuard {
    limit_bytes: i64,
}

impl QuotaGuard {
    pub fn new(max_storage_gb: f64) -> Self {
        Self {
            limit_bytes: (max_storage_gb * BYTES_PER_GB) as i64,
        }
    }

    pub fn limit_bytes(&self) -> i64 {
        self.limit_bytes
    }

    /// Allow the upload, or reject it before any processing happens
    pub fn admit(&self, stats: &StorageStats, candidate_bytes: i64) -> Result<(), QuotaExceeded> {
        let used = stats.total_size_bytes;
        if used >= self.limit_bytes || used + candidate_bytes > self.limit_bytes {
            return Err(QuotaExceeded {
                used_bytes: used,
                candidate_bytes,
                limit_bytes: self.limit_bytes,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(used: i64) -> StorageStats {
        StorageStats {
            total_files: 1,
            total_size_bytes: used,
        }
    }

    #[test]
    fn test_admit_under_limit() {
        let guard = QuotaGuard::new(1.0);
        assert!(guard.admit(&stats(1000), 1000).is_ok());
    }

    #[test]
    fn test_admit_exactly_filling_the_limit() {
        let guard = QuotaGuard::new(1.0);
        let limit = guard.limit_bytes();
        assert!(guard.admit(&stats(limit - 100), 100).is_ok());
    }

    #[test]
    fn test_reject_when_usage_already_at_limit() {
        let guard = QuotaGuard::new(1.0);
        let limit = guard.limit_bytes();

        let err = guard.admit(&stats(limit), 1).unwrap_err();
        assert_eq!(err.used_bytes, limit);
    }

    #[test]
    fn test_reject_when_candidate_would_exceed() {
        let guard = QuotaGuard::new(1.0);
        let limit = guard.limit_bytes();
        assert!(guard.admit(&stats(limit - 100), 101).is_err());
    }
}
