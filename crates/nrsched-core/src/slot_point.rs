use core::fmt;

/// Number of System Frame Numbers before the SFN wraps
pub const NOF_SFNS: u32 = 1024;
/// Number of subframes in a 10 ms radio frame
pub const NOF_SUBFRAMES_PER_FRAME: u32 = 10;
/// Highest supported numerology (240 kHz subcarrier spacing)
pub const MAX_NUMEROLOGY: u8 = 4;

/// Point in time on the NR slot grid of a cell.
///
/// The slot counter runs over a full SFN hyper-period (1024 frames) and wraps back to 0.
/// All arithmetic is wrap-aware, so slot points close to the wrap can be compared and
/// subtracted as long as they are less than half a hyper-period apart.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SlotPoint {
    /// Numerology (mu), from 0 to 4
    numerology: u8,
    /// Slot count since SFN 0, slot 0
    count: u32,
}

/// Difference between two slot counts, handling wrap-around of the hyper-period.
pub fn slot_int_diff(a: i32, b: i32, wrap: i32) -> i32 {
    let mut diff = a - b;
    while diff < -wrap / 2 { diff += wrap; }
    while diff >= wrap / 2 { diff -= wrap; }
    diff
}

impl SlotPoint {
    pub fn new(numerology: u8, sfn: u16, slot_index: u16) -> SlotPoint {
        assert!(numerology <= MAX_NUMEROLOGY, "invalid numerology {}", numerology);
        let slots_per_frame = NOF_SUBFRAMES_PER_FRAME << numerology;
        assert!((sfn as u32) < NOF_SFNS, "invalid sfn {}", sfn);
        assert!((slot_index as u32) < slots_per_frame, "invalid slot index {} for numerology {}", slot_index, numerology);
        SlotPoint {
            numerology,
            count: sfn as u32 * slots_per_frame + slot_index as u32,
        }
    }

    /// Builds a slot point from a raw slot count, wrapping it into the hyper-period
    pub fn from_count(numerology: u8, count: u32) -> SlotPoint {
        assert!(numerology <= MAX_NUMEROLOGY, "invalid numerology {}", numerology);
        let wrap = NOF_SFNS * (NOF_SUBFRAMES_PER_FRAME << numerology);
        SlotPoint { numerology, count: count % wrap }
    }

    #[inline]
    pub fn numerology(self) -> u8 {
        self.numerology
    }

    #[inline]
    pub fn nof_slots_per_subframe(self) -> u32 {
        1 << self.numerology
    }

    #[inline]
    pub fn nof_slots_per_frame(self) -> u32 {
        NOF_SUBFRAMES_PER_FRAME * self.nof_slots_per_subframe()
    }

    /// Number of slots after which the slot counter wraps
    #[inline]
    pub fn nof_slots_per_hyper_period(self) -> u32 {
        NOF_SFNS * self.nof_slots_per_frame()
    }

    /// Raw slot count. Used to index slot-periodic structures.
    #[inline(always)]
    pub fn to_uint(self) -> u32 {
        self.count
    }

    pub fn sfn(self) -> u16 {
        (self.count / self.nof_slots_per_frame()) as u16
    }

    /// Slot index within the frame
    pub fn slot_index(self) -> u16 {
        (self.count % self.nof_slots_per_frame()) as u16
    }

    pub fn subframe_index(self) -> u8 {
        (self.slot_index() as u32 / self.nof_slots_per_subframe()) as u8
    }

    /// Add a (possibly negative) number of slots
    pub fn add_slots(self, num_slots: i32) -> SlotPoint {
        let wrap = self.nof_slots_per_hyper_period() as i64;
        let count = (self.count as i64 + num_slots as i64).rem_euclid(wrap);
        SlotPoint { numerology: self.numerology, count: count as u32 }
    }

    /// Difference between two slot points in slots
    pub fn diff(self, b: Self) -> i32 {
        assert_eq!(self.numerology, b.numerology, "comparing slot points of different numerologies");
        slot_int_diff(self.count as i32, b.count as i32, self.nof_slots_per_hyper_period() as i32)
    }

    /// Age of this slot point compared to now
    #[inline(always)]
    pub fn age(self, now: SlotPoint) -> i32 {
        now.diff(self)
    }
}

impl fmt::Display for SlotPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.sfn(), self.slot_index())
    }
}

impl fmt::Debug for SlotPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:4}.{:02} (mu={})", self.sfn(), self.slot_index(), self.numerology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HARQ_TIMEOUT_RING_SIZE;

    #[test]
    fn test_add_slots_and_diff() {
        let initial = SlotPoint::new(1, 0, 0);

        let mut sl = initial;
        // Repeat add_slots enough times that the hyper-period wraps several times
        let iterations = 10000;
        let increment = 1234;
        for _ in 0..iterations {
            let sl2 = sl.add_slots(increment);
            assert_eq!(sl2.diff(sl), increment);
            assert_eq!(sl.diff(sl2), -increment);
            sl = sl2;
        }

        // Walk back to the start
        for _ in 0..iterations {
            let sl2 = sl.add_slots(-increment);
            assert_eq!(sl2.diff(sl), -increment);
            sl = sl2;
        }
        assert_eq!(sl, initial);
    }

    #[test]
    fn test_sfn_and_slot_index() {
        let sl = SlotPoint::new(1, 1023, 19);
        assert_eq!(sl.sfn(), 1023);
        assert_eq!(sl.slot_index(), 19);
        assert_eq!(sl.subframe_index(), 9);
        assert_eq!(sl.to_uint(), 1023 * 20 + 19);

        let wrapped = sl.add_slots(1);
        assert_eq!(wrapped.sfn(), 0);
        assert_eq!(wrapped.slot_index(), 0);
        assert_eq!(wrapped.diff(sl), 1);
        assert_eq!(format!("{}", wrapped), "0.0");
    }

    #[test]
    fn test_from_count() {
        assert_eq!(SlotPoint::from_count(0, 10240), SlotPoint::new(0, 0, 0));
        assert_eq!(SlotPoint::from_count(0, 10241), SlotPoint::new(0, 0, 1));
        assert_eq!(SlotPoint::new(0, 0, 0).add_slots(-1), SlotPoint::new(0, 1023, 9));
        for c in 0..2000 {
            assert_eq!(SlotPoint::from_count(2, c).diff(SlotPoint::from_count(2, 0)), c as i32);
        }
    }

    #[test]
    fn test_timeout_ring_continuous_across_wrap() {
        for mu in 0..=MAX_NUMEROLOGY {
            let last = SlotPoint::new(mu, 1023, (NOF_SUBFRAMES_PER_FRAME as u16) * (1 << mu) - 1);
            let first = last.add_slots(1);
            assert_eq!(
                (last.to_uint() as usize + 1) % HARQ_TIMEOUT_RING_SIZE,
                first.to_uint() as usize % HARQ_TIMEOUT_RING_SIZE
            );
        }
    }

    #[test]
    #[should_panic(expected = "invalid slot index")]
    fn test_invalid_slot_index() {
        SlotPoint::new(0, 0, 10);
    }
}
