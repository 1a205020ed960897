//! Shared value types used by events, actions and results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of events the host can deliver to a plugin.
///
/// The discriminants are the host's numeric identifiers. On the wire the
/// variants travel by name (`"PLAYER_JOIN"`, `"CHAT"`, ...). Names this build
/// does not know decode as [`EventType::Unrecognized`] so a newer host never
/// breaks an older plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    #[serde(rename = "EVENT_TYPE_ALL")]
    All = 1,
    PlayerJoin = 10,
    PlayerQuit = 11,
    PlayerMove = 12,
    PlayerJump = 13,
    PlayerTeleport = 14,
    PlayerChangeWorld = 15,
    PlayerToggleSprint = 16,
    PlayerToggleSneak = 17,
    Chat = 18,
    PlayerFoodLoss = 19,
    PlayerHeal = 20,
    PlayerHurt = 21,
    PlayerDeath = 22,
    PlayerRespawn = 23,
    PlayerSkinChange = 24,
    PlayerFireExtinguish = 25,
    PlayerStartBreak = 26,
    PlayerBlockBreak = 27,
    PlayerBlockPlace = 28,
    PlayerBlockPick = 29,
    PlayerItemUse = 30,
    PlayerItemUseOnBlock = 31,
    PlayerItemUseOnEntity = 32,
    PlayerItemRelease = 33,
    PlayerItemConsume = 34,
    PlayerAttackEntity = 35,
    PlayerExperienceGain = 36,
    PlayerPunchAir = 37,
    PlayerSignEdit = 38,
    PlayerLecternPageTurn = 39,
    PlayerItemDamage = 40,
    PlayerItemPickup = 41,
    PlayerHeldSlotChange = 42,
    PlayerItemDrop = 43,
    PlayerTransfer = 44,
    Command = 45,
    PlayerDiagnostics = 46,
    WorldLiquidFlow = 70,
    WorldLiquidDecay = 71,
    WorldLiquidHarden = 72,
    WorldSound = 73,
    WorldFireSpread = 74,
    WorldBlockBurn = 75,
    WorldCropTrample = 76,
    WorldLeavesDecay = 77,
    WorldEntitySpawn = 78,
    WorldEntityDespawn = 79,
    WorldExplosion = 80,
    WorldClose = 81,
    #[serde(other)]
    Unrecognized = -1,
}

impl EventType {
    /// The host's numeric identifier for this event type.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Looks up an event type by the host's numeric identifier.
    pub fn from_i32(value: i32) -> Option<Self> {
        ALL_EVENT_TYPES.iter().copied().find(|t| t.as_i32() == value)
    }

    /// Whether the host may ask for a response (cancel or mutation) for this type.
    ///
    /// Informational only: the `expects_response` flag on each envelope is authoritative.
    pub fn is_cancellable(self) -> bool {
        !matches!(
            self,
            EventType::PlayerJoin
                | EventType::PlayerQuit
                | EventType::PlayerDiagnostics
                | EventType::WorldClose
                | EventType::WorldEntityDespawn
                | EventType::All
                | EventType::Unrecognized
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Every concrete event type, in numeric order.
pub const ALL_EVENT_TYPES: &[EventType] = &[
    EventType::All,
    EventType::PlayerJoin,
    EventType::PlayerQuit,
    EventType::PlayerMove,
    EventType::PlayerJump,
    EventType::PlayerTeleport,
    EventType::PlayerChangeWorld,
    EventType::PlayerToggleSprint,
    EventType::PlayerToggleSneak,
    EventType::Chat,
    EventType::PlayerFoodLoss,
    EventType::PlayerHeal,
    EventType::PlayerHurt,
    EventType::PlayerDeath,
    EventType::PlayerRespawn,
    EventType::PlayerSkinChange,
    EventType::PlayerFireExtinguish,
    EventType::PlayerStartBreak,
    EventType::PlayerBlockBreak,
    EventType::PlayerBlockPlace,
    EventType::PlayerBlockPick,
    EventType::PlayerItemUse,
    EventType::PlayerItemUseOnBlock,
    EventType::PlayerItemUseOnEntity,
    EventType::PlayerItemRelease,
    EventType::PlayerItemConsume,
    EventType::PlayerAttackEntity,
    EventType::PlayerExperienceGain,
    EventType::PlayerPunchAir,
    EventType::PlayerSignEdit,
    EventType::PlayerLecternPageTurn,
    EventType::PlayerItemDamage,
    EventType::PlayerItemPickup,
    EventType::PlayerHeldSlotChange,
    EventType::PlayerItemDrop,
    EventType::PlayerTransfer,
    EventType::Command,
    EventType::PlayerDiagnostics,
    EventType::WorldLiquidFlow,
    EventType::WorldLiquidDecay,
    EventType::WorldLiquidHarden,
    EventType::WorldSound,
    EventType::WorldFireSpread,
    EventType::WorldBlockBurn,
    EventType::WorldCropTrample,
    EventType::WorldLeavesDecay,
    EventType::WorldEntitySpawn,
    EventType::WorldEntityDespawn,
    EventType::WorldExplosion,
    EventType::WorldClose,
];

/// Player game modes understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

/// A position or direction in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Integer block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// A stack of items, identified by name and metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemStack {
    pub name: String,
    #[serde(default)]
    pub meta: i32,
    pub count: i32,
}

impl ItemStack {
    pub fn new(name: impl Into<String>, count: i32) -> Self {
        Self {
            name: name.into(),
            meta: 0,
            count,
        }
    }
}

/// Reference to a world on the host, by name and dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WorldRef {
    pub name: String,
    #[serde(default)]
    pub dimension: String,
}

/// Reference to an entity returned by world queries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityRef {
    pub uuid: String,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Option<Vec3>,
}

/// A block state, identified by name plus string properties.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockState {
    pub name: String,
    #[serde(default)]
    pub properties: std::collections::BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_numeric_ids() {
        assert_eq!(EventType::from_i32(18), Some(EventType::Chat));
        assert_eq!(EventType::from_i32(45), Some(EventType::Command));
        assert_eq!(EventType::from_i32(999), None);
        assert_eq!(EventType::WorldClose.as_i32(), 81);
    }

    #[test]
    fn event_type_uses_host_names_on_the_wire() {
        let json = serde_json::to_string(&EventType::PlayerBlockBreak).unwrap();
        assert_eq!(json, "\"PLAYER_BLOCK_BREAK\"");
        let all = serde_json::to_string(&EventType::All).unwrap();
        assert_eq!(all, "\"EVENT_TYPE_ALL\"");
    }

    #[test]
    fn unknown_event_type_names_decode_as_unrecognized() {
        let ty: EventType = serde_json::from_str("\"PLAYER_DANCE\"").unwrap();
        assert_eq!(ty, EventType::Unrecognized);
    }
}
