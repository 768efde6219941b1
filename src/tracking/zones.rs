//! Anchor-zone plan
//!
//! The bay is longer than one six-anchor constellation can cover well, so
//! the roster is split at a fixed y coordinate into two overlapping sets.
//! Which set is live on the tag follows the side of the split the tag last
//! occupied; the control loop swaps them on crossings.

use crate::core::Device;
use crate::error::{Error, Result};

/// Number of anchors pushed to the tag per zone
pub const ZONE_ANCHOR_COUNT: usize = 6;

/// Side of the split the tag occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Lower,
    Upper,
}

/// The two overlapping anchor sets and the boundary between them.
#[derive(Debug, Clone)]
pub struct ZonePlan {
    split_y: i32,
    lower: [Device; ZONE_ANCHOR_COUNT],
    upper: [Device; ZONE_ANCHOR_COUNT],
}

impl ZonePlan {
    pub fn new(
        split_y: i32,
        lower: [Device; ZONE_ANCHOR_COUNT],
        upper: [Device; ZONE_ANCHOR_COUNT],
    ) -> Self {
        Self {
            split_y,
            lower,
            upper,
        }
    }

    /// Build the plan from the full anchor roster, in roster order: the
    /// lower zone takes the first six anchors, the upper zone the last six.
    pub fn from_anchor_roster(split_y: i32, anchors: &[Device]) -> Result<Self> {
        if anchors.len() < ZONE_ANCHOR_COUNT {
            return Err(Error::ConfigInvalid(format!(
                "zone plan needs at least {} anchors, roster has {}",
                ZONE_ANCHOR_COUNT,
                anchors.len()
            )));
        }

        let lower: [Device; ZONE_ANCHOR_COUNT] =
            anchors[..ZONE_ANCHOR_COUNT].try_into().expect("length checked");
        let upper: [Device; ZONE_ANCHOR_COUNT] = anchors[anchors.len() - ZONE_ANCHOR_COUNT..]
            .try_into()
            .expect("length checked");

        Ok(Self::new(split_y, lower, upper))
    }

    pub fn split_y(&self) -> i32 {
        self.split_y
    }

    /// Zone containing the given y coordinate. The split itself belongs to
    /// the upper zone.
    pub fn zone_for(&self, y: i32) -> Zone {
        if y >= self.split_y {
            Zone::Upper
        } else {
            Zone::Lower
        }
    }

    pub fn anchors(&self, zone: Zone) -> &[Device; ZONE_ANCHOR_COUNT] {
        match zone {
            Zone::Lower => &self.lower,
            Zone::Upper => &self.upper,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<Device> {
        vec![
            Device::anchor(0x1172, 100, 100, 5000),
            Device::anchor(0x1114, 21860, 0, 5000),
            Device::anchor(0x1103, 0, 15200, 5000),
            Device::anchor(0x1131, 21860, 15200, 5000),
            Device::anchor(0x6830, 0, 30400, 5000),
            Device::anchor(0x1152, 21860, 30400, 5000),
            Device::anchor(0x6846, 0, 45600, 5000),
            Device::anchor(0x6842, 21860, 45600, 5000),
        ]
    }

    #[test]
    fn test_roster_split_overlaps() {
        let plan = ZonePlan::from_anchor_roster(30400, &roster()).unwrap();

        assert_eq!(plan.anchors(Zone::Lower)[0].address, 0x1172);
        assert_eq!(plan.anchors(Zone::Lower)[5].address, 0x1152);
        assert_eq!(plan.anchors(Zone::Upper)[0].address, 0x1103);
        assert_eq!(plan.anchors(Zone::Upper)[5].address, 0x6842);
    }

    #[test]
    fn test_split_belongs_to_upper_zone() {
        let plan = ZonePlan::from_anchor_roster(30400, &roster()).unwrap();
        assert_eq!(plan.zone_for(30399), Zone::Lower);
        assert_eq!(plan.zone_for(30400), Zone::Upper);
        assert_eq!(plan.zone_for(30401), Zone::Upper);
    }

    #[test]
    fn test_short_roster_is_rejected() {
        let short = &roster()[..5];
        assert!(ZonePlan::from_anchor_roster(30400, short).is_err());
    }
}
