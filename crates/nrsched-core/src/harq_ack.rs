use core::fmt;

/// Outcome of decoding one HARQ-ACK bit on PUCCH or PUSCH
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HarqAckStatus {
    Ack,
    Nack,
    /// Discontinuous transmission: nothing was detected on the occasion
    #[default]
    Dtx,
}

impl HarqAckStatus {
    pub fn from_bool(ack: bool) -> Self {
        if ack { HarqAckStatus::Ack } else { HarqAckStatus::Nack }
    }

    #[inline]
    pub fn is_ack(&self) -> bool {
        *self == HarqAckStatus::Ack
    }

    #[inline]
    pub fn is_dtx(&self) -> bool {
        *self == HarqAckStatus::Dtx
    }
}

impl fmt::Display for HarqAckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarqAckStatus::Ack => write!(f, "ACK"),
            HarqAckStatus::Nack => write!(f, "NACK"),
            HarqAckStatus::Dtx => write!(f, "DTX"),
        }
    }
}
