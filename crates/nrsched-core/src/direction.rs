use core::fmt;

/// Link direction of a HARQ entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub enum Direction {
    /// Downlink, acknowledged through PUCCH/PUSCH HARQ-ACK bits
    Dl,
    /// Uplink, acknowledged through the PUSCH CRC
    Ul,
}

impl Direction {
    #[inline]
    pub fn is_dl(&self) -> bool {
        matches!(self, Direction::Dl)
    }

    #[inline]
    pub fn is_ul(&self) -> bool {
        matches!(self, Direction::Ul)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Dl => "DL",
            Direction::Ul => "UL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
