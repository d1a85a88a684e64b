use serde::{Deserialize, Serialize};

/// Aggregate outcome of writing one chunk (or one run, after merging).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WriteStats {
    pub total_records: u64,
    pub inserted_records: u64,
    pub skipped_records: u64,
    pub error_records: u64,
    pub duration_ms: u64,
}

impl WriteStats {
    pub fn merge(&mut self, other: &WriteStats) {
        self.total_records += other.total_records;
        self.inserted_records += other.inserted_records;
        self.skipped_records += other.skipped_records;
        self.error_records += other.error_records;
        self.duration_ms += other.duration_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_all_counters() {
        let mut a = WriteStats {
            total_records: 10,
            inserted_records: 8,
            skipped_records: 1,
            error_records: 1,
            duration_ms: 40,
        };
        let b = WriteStats {
            total_records: 5,
            inserted_records: 5,
            skipped_records: 0,
            error_records: 0,
            duration_ms: 12,
        };
        a.merge(&b);
        assert_eq!(a.total_records, 15);
        assert_eq!(a.inserted_records, 13);
        assert_eq!(a.skipped_records, 1);
        assert_eq!(a.error_records, 1);
        assert_eq!(a.duration_ms, 52);
    }
}
