//! Identity types for the pipeline system.
//!
//! All IDs are newtypes over `u32` that serve as direct array indices
//! into their respective storage vectors, providing O(1) lookup.

use std::fmt;

/// Index into `Pipeline::slots`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ComponentId(pub u32);

impl ComponentId {
    pub const INVALID: ComponentId = ComponentId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ComponentId(INVALID)")
        } else {
            write!(f, "ComponentId({})", self.0)
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index into `Pipeline::channels`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u32);

impl ChannelId {
    pub const INVALID: ChannelId = ChannelId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ChannelId(INVALID)")
        } else {
            write!(f, "ChannelId({})", self.0)
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Reader slot inside one `TimeBuffer`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ReaderId(pub u32);

impl ReaderId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle returned by `Pipeline::add_sensor`, naming the sensor and the
/// providers attached to it in the order they were given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensorHandle {
    pub sensor: ComponentId,
    pub providers: Vec<ComponentId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id() {
        let id = ComponentId(42);
        assert!(id.is_valid());
        assert_eq!(id.index(), 42);
        assert!(!ComponentId::INVALID.is_valid());
        assert_eq!(format!("{}", ComponentId::INVALID), "ComponentId(INVALID)");
    }

    #[test]
    fn test_channel_id() {
        let id = ChannelId(5);
        assert!(id.is_valid());
        assert_eq!(id.index(), 5);
        assert!(!ChannelId::INVALID.is_valid());
    }
}
