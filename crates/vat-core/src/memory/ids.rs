//! Point identifiers. Random 63-bit integers, independent of wall time, so
//! concurrent records and clock jumps cannot collide.

use rand::Rng;

#[derive(Debug, Default, Clone, Copy)]
pub struct IdGenerator;

impl IdGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Fresh identifier in `1..=i64::MAX`, valid for both store engines
    pub fn next_id(&self) -> u64 {
        rand::thread_rng().gen_range(1..=i64::MAX as u64)
    }

    /// `count` identifiers, pairwise distinct
    pub fn batch(&self, count: usize) -> Vec<u64> {
        let mut ids: Vec<u64> = Vec::with_capacity(count);
        while ids.len() < count {
            let id = self.next_id();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_batch_is_distinct_and_in_range() {
        let ids = IdGenerator::new().batch(2_000);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 2_000);
        assert!(ids.iter().all(|&id| id >= 1 && id <= i64::MAX as u64));
    }
}
