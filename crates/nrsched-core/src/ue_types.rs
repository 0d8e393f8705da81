use core::fmt;

/// Index of a UE within the DU. Stable for as long as the UE is attached to the cell.
pub type DuUeIndex = u16;

/// HARQ process identifier. Only meaningful per UE and direction.
pub type HarqId = u8;

/// Index of a cell within the DU
pub type DuCellIndex = u16;

/// Radio Network Temporary Identifier
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Rnti(pub u16);

impl Rnti {
    /// Lowest value usable as C-RNTI, see TS 38.321 Table 7.1-1
    pub const MIN_CRNTI: Rnti = Rnti(0x0001);
    /// Highest value usable as C-RNTI
    pub const MAX_CRNTI: Rnti = Rnti(0xFFEF);

    pub fn is_crnti(&self) -> bool {
        self.0 >= Self::MIN_CRNTI.0 && self.0 <= Self::MAX_CRNTI.0
    }
}

impl fmt::Display for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl fmt::Debug for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rnti({:#06x})", self.0)
    }
}
