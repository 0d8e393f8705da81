use nrsched_core::{HARQ_TIMEOUT_RING_SIZE, SlotPoint};

use crate::index_list::{IndexList, ListLinks, ListTag};

/// Ring of index lists, one bucket per slot modulo the ring size.
/// A record sits in the bucket of its HARQ-ACK deadline.
pub struct TimeoutWheel {
    buckets: Vec<IndexList>,
}

impl TimeoutWheel {
    pub fn new() -> Self {
        let buckets = (0..HARQ_TIMEOUT_RING_SIZE)
            .map(|i| IndexList::new(ListTag::TimeoutBucket(i as u16)))
            .collect();
        Self { buckets }
    }

    #[inline]
    pub fn bucket_index(slot: SlotPoint) -> usize {
        slot.to_uint() as usize % HARQ_TIMEOUT_RING_SIZE
    }

    pub fn insert(&mut self, links: &mut [ListLinks], idx: u32, deadline: SlotPoint) {
        self.buckets[Self::bucket_index(deadline)].push_back(links, idx);
    }

    pub fn remove(&mut self, links: &mut [ListLinks], idx: u32) {
        match links[idx as usize].member() {
            ListTag::TimeoutBucket(b) => self.buckets[b as usize].unlink(links, idx),
            other => panic!("slot {} is not in the timeout wheel ({:?})", idx, other),
        }
    }

    #[inline]
    pub fn front(&self, bucket: usize) -> Option<u32> {
        self.buckets[bucket].front()
    }

    pub fn bucket_len(&self, bucket: usize) -> usize {
        self.buckets[bucket].len()
    }

    /// Records waiting for a deadline, across all buckets
    pub fn len(&self) -> usize {
        self.buckets.iter().map(IndexList::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(IndexList::is_empty)
    }
}

impl Default for TimeoutWheel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut links = vec![ListLinks::detached(); 4];
        let mut wheel = TimeoutWheel::new();
        let sl = SlotPoint::new(0, 0, 2);

        wheel.insert(&mut links, 0, sl);
        wheel.insert(&mut links, 1, sl.add_slots(HARQ_TIMEOUT_RING_SIZE as i32));
        wheel.insert(&mut links, 2, sl.add_slots(1));
        assert_eq!(wheel.len(), 3);
        assert_eq!(wheel.bucket_len(2), 2);
        assert_eq!(wheel.front(2), Some(0));

        wheel.remove(&mut links, 0);
        assert_eq!(wheel.front(2), Some(1));
        assert_eq!(links[0].member(), ListTag::Detached);
        wheel.remove(&mut links, 1);
        wheel.remove(&mut links, 2);
        assert!(wheel.is_empty());
    }

    #[test]
    fn test_bucket_index_wraps_with_slot_counter() {
        let last = SlotPoint::new(1, 1023, 19);
        assert_eq!(TimeoutWheel::bucket_index(last), HARQ_TIMEOUT_RING_SIZE - 1);
        assert_eq!(TimeoutWheel::bucket_index(last.add_slots(1)), 0);
    }

    #[test]
    #[should_panic(expected = "not in the timeout wheel")]
    fn test_remove_detached() {
        let mut links = vec![ListLinks::detached(); 1];
        let mut wheel = TimeoutWheel::new();
        wheel.remove(&mut links, 0);
    }
}
