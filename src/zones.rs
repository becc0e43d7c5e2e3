// Zones Module - Zone selection and its wire encoding
use anyhow::{anyhow, bail, Result};
use std::fmt;
use std::str::FromStr;

pub const ZONE_COUNT: usize = 4;

// Single zone form (earliest protocol revision): 0 = all, 1..4 = one zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    All,
    First,
    Second,
    Third,
    Fourth,
}

impl Zone {
    pub fn index(&self) -> u8 {
        match self {
            Zone::All => 0,
            Zone::First => 1,
            Zone::Second => 2,
            Zone::Third => 3,
            Zone::Fourth => 4,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Zone::All),
            1 => Some(Zone::First),
            2 => Some(Zone::Second),
            3 => Some(Zone::Third),
            4 => Some(Zone::Fourth),
            _ => None,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

impl FromStr for Zone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let index: u8 = s.trim().parse().map_err(|_| anyhow!("Invalid zone: {}", s))?;
        Zone::from_index(index).ok_or_else(|| anyhow!("Zone out of range: {}", index))
    }
}

// One flag per zone, wire form "1,0,1,0"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneMask(pub [bool; ZONE_COUNT]);

impl ZoneMask {
    pub fn all() -> Self {
        ZoneMask([true; ZONE_COUNT])
    }

    pub fn none() -> Self {
        ZoneMask([false; ZONE_COUNT])
    }

    pub fn is_selected(&self, zone: usize) -> bool {
        self.0.get(zone).copied().unwrap_or(false)
    }
}

impl fmt::Display for ZoneMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self.0.iter().map(|z| if *z { "1" } else { "0" }).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for ZoneMask {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(|p| p.trim()).collect();
        if parts.len() != ZONE_COUNT {
            bail!("Expected {} zone flags, got {}: {}", ZONE_COUNT, parts.len(), s);
        }

        let mut mask = [false; ZONE_COUNT];
        for (slot, part) in mask.iter_mut().zip(parts) {
            *slot = match part {
                "1" => true,
                "0" => false,
                other => bail!("Invalid zone flag: {}", other),
            };
        }
        Ok(ZoneMask(mask))
    }
}

// Zone descriptor as sent next to a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneSelector {
    Single(Zone),
    Mask(ZoneMask),
}

impl ZoneSelector {
    // Query key the selector is bound to
    pub fn key(&self) -> &'static str {
        match self {
            ZoneSelector::Single(_) => "zone",
            ZoneSelector::Mask(_) => "zones",
        }
    }

    pub fn to_wire(&self) -> String {
        match self {
            ZoneSelector::Single(zone) => zone.to_string(),
            ZoneSelector::Mask(mask) => mask.to_string(),
        }
    }

    pub fn parse(key: &str, value: &str) -> Result<Self> {
        match key {
            "zone" => Ok(ZoneSelector::Single(value.parse()?)),
            "zones" => Ok(ZoneSelector::Mask(value.parse()?)),
            other => bail!("Unknown zone key: {}", other),
        }
    }

    // Normalized to the mask form (single zone 0 means every zone)
    pub fn to_mask(&self) -> ZoneMask {
        match self {
            ZoneSelector::Mask(mask) => *mask,
            ZoneSelector::Single(Zone::All) => ZoneMask::all(),
            ZoneSelector::Single(zone) => {
                let mut mask = ZoneMask::none();
                mask.0[(zone.index() - 1) as usize] = true;
                mask
            }
        }
    }
}

/// Zone toggles held by the panel.
///
/// Individual zones toggle independently. The "all" toggle forces every zone
/// to its new value and is cleared as soon as any single zone is toggled.
#[derive(Debug, Clone)]
pub struct ZoneSelection {
    mask: ZoneMask,
    all_active: bool,
}

impl Default for ZoneSelection {
    fn default() -> Self {
        ZoneSelection { mask: ZoneMask::all(), all_active: true }
    }
}

impl ZoneSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mask(&self) -> ZoneMask {
        self.mask
    }

    pub fn all_active(&self) -> bool {
        self.all_active
    }

    /// Toggles zone `zone` (0-based) and returns its new state
    pub fn toggle(&mut self, zone: usize) -> bool {
        self.all_active = false;
        match self.mask.0.get_mut(zone) {
            Some(slot) => {
                *slot = !*slot;
                *slot
            }
            None => false,
        }
    }

    /// Toggles the "all" switch and forces every zone to match it
    pub fn toggle_all(&mut self) -> bool {
        self.all_active = !self.all_active;
        self.mask = if self.all_active { ZoneMask::all() } else { ZoneMask::none() };
        self.all_active
    }

    pub fn selector(&self) -> ZoneSelector {
        ZoneSelector::Mask(self.mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_round_trip() {
        let mask = ZoneMask([true, false, true, false]);
        assert_eq!(mask.to_string(), "1,0,1,0");
        assert_eq!("1,0,1,0".parse::<ZoneMask>().unwrap(), mask);
        assert_eq!(" 1, 1 ,0,1".parse::<ZoneMask>().unwrap(), ZoneMask([true, true, false, true]));
    }

    #[test]
    fn test_mask_rejects_malformed() {
        assert!("1,0,1".parse::<ZoneMask>().is_err());
        assert!("1,0,2,0".parse::<ZoneMask>().is_err());
        assert!("".parse::<ZoneMask>().is_err());
    }

    #[test]
    fn test_single_zone_round_trip() {
        for index in 0..=4u8 {
            let zone = Zone::from_index(index).unwrap();
            let selector = ZoneSelector::Single(zone);
            let parsed = ZoneSelector::parse(selector.key(), &selector.to_wire()).unwrap();
            assert_eq!(parsed, selector);
        }
        assert!("5".parse::<Zone>().is_err());
    }

    #[test]
    fn test_selector_to_mask() {
        assert_eq!(ZoneSelector::Single(Zone::All).to_mask(), ZoneMask::all());
        assert_eq!(
            ZoneSelector::Single(Zone::Third).to_mask(),
            ZoneMask([false, false, true, false])
        );
    }

    #[test]
    fn test_single_toggle_clears_all() {
        let mut selection = ZoneSelection::new();
        assert!(selection.all_active());

        assert!(!selection.toggle(1));
        assert!(!selection.all_active());
        assert_eq!(selection.mask().to_string(), "1,0,1,1");

        assert!(selection.toggle(1));
        assert!(!selection.all_active());
        assert_eq!(selection.mask(), ZoneMask::all());
    }

    #[test]
    fn test_toggle_all_forces_every_zone() {
        let mut selection = ZoneSelection::new();
        selection.toggle(0);
        // "all" was cleared by the single toggle, so this turns it back on
        assert!(selection.toggle_all());
        assert_eq!(selection.mask(), ZoneMask::all());

        assert!(!selection.toggle_all());
        assert_eq!(selection.mask(), ZoneMask::none());
        assert_eq!(selection.selector().to_wire(), "0,0,0,0");
    }
}
