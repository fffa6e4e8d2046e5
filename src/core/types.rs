//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Low 64 bits of the id, used to derive deterministic RNG seeds
            pub fn seed_bits(&self) -> u64 {
                self.0.as_u64_pair().1
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for armies
    ArmyId
);
uuid_id!(
    /// Unique identifier for wars
    WarId
);
uuid_id!(
    /// Unique identifier for battles
    BattleId
);
uuid_id!(
    /// Unique identifier for sieges
    SiegeId
);
uuid_id!(
    /// Unique identifier for peace treaties
    TreatyId
);
uuid_id!(
    /// Unique identifier for mercenary companies
    CompanyId
);

/// Unique identifier for rulers (players and AI lords who command armies and lead realms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RulerId(pub u32);

impl RulerId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for RulerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ruler#{}", self.0)
    }
}

/// Treasury account key. Every ruler owns exactly one account.
pub type Account = RulerId;

/// Amount of gold
pub type Gold = u64;

/// In-game day counter. Passed explicitly into every tick.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Day(pub u32);

impl Day {
    pub fn plus(self, days: u32) -> Self {
        Self(self.0.saturating_add(days))
    }

    /// Days from `self` until `later` (zero if `later` is not after `self`)
    pub fn until(self, later: Day) -> u32 {
        later.0.saturating_sub(self.0)
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {}", self.0)
    }
}

/// Axial hex coordinate (q, r system)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HexCoord {
    pub q: i32,
    pub r: i32,
}

impl HexCoord {
    pub fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Distance in hex steps using axial coordinate formula
    pub fn distance(&self, other: &HexCoord) -> u32 {
        let dq = (self.q - other.q).abs();
        let dr = (self.r - other.r).abs();
        let ds = ((self.q + self.r) - (other.q + other.r)).abs();
        ((dq + dr + ds) / 2) as u32
    }
}

/// Location identifier for the realm map
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId(pub u32);

/// What kind of settlement a location is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationKind {
    Castle,
    Town,
    Village,
}

/// A place armies can stand at, besiege or fight over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub kind: LocationKind,
    pub name: String,
    pub coord: HexCoord,
}

impl Location {
    pub fn new(id: u32, kind: LocationKind, name: impl Into<String>, coord: HexCoord) -> Self {
        Self {
            id: LocationId(id),
            kind,
            name: name.into(),
            coord,
        }
    }

    pub fn castle(id: u32, name: impl Into<String>, coord: HexCoord) -> Self {
        Self::new(id, LocationKind::Castle, name, coord)
    }

    pub fn town(id: u32, name: impl Into<String>, coord: HexCoord) -> Self {
        Self::new(id, LocationKind::Town, name, coord)
    }

    pub fn village(id: u32, name: impl Into<String>, coord: HexCoord) -> Self {
        Self::new(id, LocationKind::Village, name, coord)
    }
}

/// Which side of a war or battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Attacker,
    Defender,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Attacker => Self::Defender,
            Self::Defender => Self::Attacker,
        }
    }
}

/// Territory handed over by treaty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerritoryRef(pub LocationId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_distance() {
        let a = HexCoord::new(0, 0);
        assert_eq!(a.distance(&HexCoord::new(3, 0)), 3);
        assert_eq!(a.distance(&HexCoord::new(2, -1)), 2);
        assert_eq!(a.distance(&a), 0);
    }

    #[test]
    fn test_day_arithmetic() {
        let d = Day(10);
        assert_eq!(d.plus(5), Day(15));
        assert_eq!(d.until(Day(14)), 4);
        assert_eq!(d.until(Day(3)), 0);
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Attacker.opposite(), Side::Defender);
        assert_eq!(Side::Defender.opposite().opposite(), Side::Defender);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(ArmyId::new(), ArmyId::new());
        assert_ne!(WarId::new(), WarId::new());
    }
}
