//! Job part priority and the scheduling channel it selects
//!
//! Priority is coarse and fixed at submission, so dispatch uses exactly three
//! queues instead of a numeric range. The mapping is a total function over the
//! three stored values; anything else in the file is corruption.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority of a job part as stored in the plan header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Priority {
    #[default]
    High = 0,
    Medium = 1,
    Low = 2,
}

impl Priority {
    /// Stored byte value
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Scheduling channel this priority drains from
    pub const fn channel(self) -> ChannelId {
        match self {
            Priority::High => ChannelId::High,
            Priority::Medium => ChannelId::Medium,
            Priority::Low => ChannelId::Low,
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Priority::High),
            1 => Ok(Priority::Medium),
            2 => Ok(Priority::Low),
            other => Err(Error::corrupt(format!("unknown priority {}", other))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Identifier of one of the three scheduling queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    High,
    Medium,
    Low,
}

impl ChannelId {
    /// All channels in drain order
    pub const ALL: [ChannelId; 3] = [ChannelId::High, ChannelId::Medium, ChannelId::Low];

    /// Stable queue index
    pub const fn index(self) -> usize {
        match self {
            ChannelId::High => 0,
            ChannelId::Medium => 1,
            ChannelId::Low => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ChannelId::High => "high",
            ChannelId::Medium => "medium",
            ChannelId::Low => "low",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_high() {
        assert_eq!(Priority::default(), Priority::High);
        assert_eq!(Priority::default().as_u8(), 0);
    }

    #[test]
    fn test_mapping_is_total_and_distinct() {
        let channels: Vec<ChannelId> = (0u8..3)
            .map(|v| Priority::try_from(v).unwrap().channel())
            .collect();
        assert_eq!(channels, ChannelId::ALL.to_vec());
        assert_eq!(channels[0].index(), 0);
        assert_eq!(channels[1].index(), 1);
        assert_eq!(channels[2].index(), 2);
    }

    #[test]
    fn test_low_maps_to_low_only() {
        let channel = Priority::try_from(2).unwrap().channel();
        assert_eq!(channel, ChannelId::Low);
        assert_ne!(channel, ChannelId::High);
        assert_ne!(channel, ChannelId::Medium);
    }

    #[test]
    fn test_unknown_priority_rejected() {
        for v in [3u8, 7, 255] {
            assert!(matches!(Priority::try_from(v), Err(Error::CorruptPlan { .. })));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Priority::Low.to_string(), "low");
        assert_eq!(ChannelId::Medium.to_string(), "medium");
    }
}
