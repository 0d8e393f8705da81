//! Doubly linked lists threaded through a flat pool by index.
//!
//! Link fields live in a side table (`[ListLinks]`) parallel to the pool, one entry per
//! pool slot. A slot can be a member of at most one list at a time; the `member` tag
//! records which one, so removal can be checked against the list it is removed from.

/// Null link
pub const NIL: u32 = u32::MAX;

/// List a pool slot currently belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListTag {
    Detached,
    /// Bucket of the HARQ-ACK timeout wheel
    TimeoutBucket(u16),
    PendingRetx,
}

#[derive(Debug, Clone, Copy)]
pub struct ListLinks {
    prev: u32,
    next: u32,
    member: ListTag,
}

impl ListLinks {
    pub const fn detached() -> Self {
        Self {
            prev: NIL,
            next: NIL,
            member: ListTag::Detached,
        }
    }

    #[inline]
    pub fn member(&self) -> ListTag {
        self.member
    }
}

impl Default for ListLinks {
    fn default() -> Self {
        Self::detached()
    }
}

#[derive(Debug)]
pub struct IndexList {
    tag: ListTag,
    head: u32,
    tail: u32,
    len: usize,
}

impl IndexList {
    pub fn new(tag: ListTag) -> Self {
        assert!(tag != ListTag::Detached, "a list cannot carry the detached tag");
        Self {
            tag,
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    #[inline]
    pub fn tag(&self) -> ListTag {
        self.tag
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn front(&self) -> Option<u32> {
        if self.head == NIL { None } else { Some(self.head) }
    }

    pub fn push_back(&mut self, links: &mut [ListLinks], idx: u32) {
        let i = idx as usize;
        assert_eq!(links[i].member, ListTag::Detached, "slot {} already linked into {:?}", idx, links[i].member);

        links[i] = ListLinks {
            prev: self.tail,
            next: NIL,
            member: self.tag,
        };
        if self.tail == NIL {
            self.head = idx;
        } else {
            links[self.tail as usize].next = idx;
        }
        self.tail = idx;
        self.len += 1;
    }

    pub fn unlink(&mut self, links: &mut [ListLinks], idx: u32) {
        let i = idx as usize;
        assert_eq!(links[i].member, self.tag, "slot {} is not a member of {:?}", idx, self.tag);

        let ListLinks { prev, next, .. } = links[i];
        if prev == NIL {
            self.head = next;
        } else {
            links[prev as usize].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            links[next as usize].prev = prev;
        }
        links[i] = ListLinks::detached();
        self.len -= 1;
    }

    pub fn pop_front(&mut self, links: &mut [ListLinks]) -> Option<u32> {
        let idx = self.front()?;
        self.unlink(links, idx);
        Some(idx)
    }

    /// Iterates front to back. The list must not be modified while iterating.
    pub fn iter<'a>(&self, links: &'a [ListLinks]) -> IndexListIter<'a> {
        IndexListIter { links, cur: self.head }
    }
}

pub struct IndexListIter<'a> {
    links: &'a [ListLinks],
    cur: u32,
}

impl Iterator for IndexListIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.cur == NIL {
            return None;
        }
        let idx = self.cur;
        self.cur = self.links[idx as usize].next;
        Some(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(list: &IndexList, links: &[ListLinks]) -> Vec<u32> {
        list.iter(links).collect()
    }

    #[test]
    fn test_push_and_unlink_middle() {
        let mut links = vec![ListLinks::detached(); 8];
        let mut list = IndexList::new(ListTag::PendingRetx);
        for idx in [3, 1, 6] {
            list.push_back(&mut links, idx);
        }
        assert_eq!(collect(&list, &links), vec![3, 1, 6]);
        assert_eq!(links[1].member(), ListTag::PendingRetx);

        list.unlink(&mut links, 1);
        assert_eq!(collect(&list, &links), vec![3, 6]);
        assert_eq!(links[1].member(), ListTag::Detached);

        list.unlink(&mut links, 6);
        list.push_back(&mut links, 1);
        assert_eq!(collect(&list, &links), vec![3, 1]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_pop_front_drains_in_order() {
        let mut links = vec![ListLinks::detached(); 4];
        let mut list = IndexList::new(ListTag::TimeoutBucket(0));
        for idx in 0..4 {
            list.push_back(&mut links, idx);
        }
        let mut drained = vec![];
        while let Some(idx) = list.pop_front(&mut links) {
            drained.push(idx);
        }
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(list.is_empty());
        assert!(links.iter().all(|l| l.member() == ListTag::Detached));
    }

    #[test]
    #[should_panic(expected = "is not a member")]
    fn test_unlink_from_wrong_list() {
        let mut links = vec![ListLinks::detached(); 2];
        let mut a = IndexList::new(ListTag::TimeoutBucket(1));
        let mut b = IndexList::new(ListTag::TimeoutBucket(2));
        a.push_back(&mut links, 0);
        b.unlink(&mut links, 0);
    }

    #[test]
    #[should_panic(expected = "already linked")]
    fn test_double_insert() {
        let mut links = vec![ListLinks::detached(); 2];
        let mut a = IndexList::new(ListTag::PendingRetx);
        a.push_back(&mut links, 0);
        a.push_back(&mut links, 0);
    }
}
