//! Event envelopes delivered by the host and the results plugins send back.

use crate::types::{BlockPos, EventType, ItemStack, Vec3, WorldRef};
use serde::{Deserialize, Serialize};

/// A single event delivered by the host.
///
/// `event_id` is opaque and unique among in-flight events. When
/// `expects_response` is set the host waits for exactly one [`EventResult`]
/// carrying the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub expects_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
}

impl EventEnvelope {
    /// Builds an envelope whose type is taken from the payload.
    pub fn new(event_id: impl Into<String>, expects_response: bool, payload: EventPayload) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: payload.event_type(),
            expects_response,
            payload: Some(payload),
        }
    }

    /// True when the payload (if any) is the one `event_type` calls for.
    pub fn payload_matches_type(&self) -> bool {
        match &self.payload {
            Some(payload) => payload.event_type() == self.event_type,
            None => true,
        }
    }

    pub fn chat(&self) -> Option<&ChatEvent> {
        match &self.payload {
            Some(EventPayload::Chat(event)) => Some(event),
            _ => None,
        }
    }

    pub fn command(&self) -> Option<&CommandEvent> {
        match &self.payload {
            Some(EventPayload::Command(event)) => Some(event),
            _ => None,
        }
    }

    pub fn player_join(&self) -> Option<&PlayerJoinEvent> {
        match &self.payload {
            Some(EventPayload::PlayerJoin(event)) => Some(event),
            _ => None,
        }
    }

    /// The UUID of the player this event concerns, if it concerns one.
    pub fn player_uuid(&self) -> Option<&str> {
        let uuid = match self.payload.as_ref()? {
            EventPayload::PlayerJoin(e) => &e.player_uuid,
            EventPayload::PlayerQuit(e) => &e.player_uuid,
            EventPayload::PlayerMove(e) => &e.player_uuid,
            EventPayload::Chat(e) => &e.player_uuid,
            EventPayload::Command(e) => &e.player_uuid,
            EventPayload::BlockBreak(e) => &e.player_uuid,
            EventPayload::BlockPlace(e) => &e.player_uuid,
            EventPayload::PlayerHurt(e) => &e.player_uuid,
            EventPayload::PlayerHeal(e) => &e.player_uuid,
            EventPayload::PlayerFoodLoss(e) => &e.player_uuid,
            EventPayload::PlayerDeath(e) => &e.player_uuid,
            EventPayload::WorldExplosion(_) | EventPayload::WorldClose(_) => return None,
        };
        Some(uuid.as_str())
    }
}

/// Typed event payloads. Exactly one is present per envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPayload {
    PlayerJoin(PlayerJoinEvent),
    PlayerQuit(PlayerQuitEvent),
    PlayerMove(PlayerMoveEvent),
    Chat(ChatEvent),
    Command(CommandEvent),
    BlockBreak(BlockBreakEvent),
    BlockPlace(BlockPlaceEvent),
    PlayerHurt(PlayerHurtEvent),
    PlayerHeal(PlayerHealEvent),
    PlayerFoodLoss(PlayerFoodLossEvent),
    PlayerDeath(PlayerDeathEvent),
    WorldExplosion(WorldExplosionEvent),
    WorldClose(WorldCloseEvent),
}

impl EventPayload {
    /// The event type this payload belongs to.
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::PlayerJoin(_) => EventType::PlayerJoin,
            EventPayload::PlayerQuit(_) => EventType::PlayerQuit,
            EventPayload::PlayerMove(_) => EventType::PlayerMove,
            EventPayload::Chat(_) => EventType::Chat,
            EventPayload::Command(_) => EventType::Command,
            EventPayload::BlockBreak(_) => EventType::PlayerBlockBreak,
            EventPayload::BlockPlace(_) => EventType::PlayerBlockPlace,
            EventPayload::PlayerHurt(_) => EventType::PlayerHurt,
            EventPayload::PlayerHeal(_) => EventType::PlayerHeal,
            EventPayload::PlayerFoodLoss(_) => EventType::PlayerFoodLoss,
            EventPayload::PlayerDeath(_) => EventType::PlayerDeath,
            EventPayload::WorldExplosion(_) => EventType::WorldExplosion,
            EventPayload::WorldClose(_) => EventType::WorldClose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerJoinEvent {
    pub player_uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerQuitEvent {
    pub player_uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerMoveEvent {
    pub player_uuid: String,
    pub name: String,
    #[serde(default)]
    pub world: WorldRef,
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatEvent {
    pub player_uuid: String,
    pub name: String,
    pub message: String,
}

/// A command typed by a player, already split by the host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandEvent {
    pub player_uuid: String,
    pub name: String,
    /// Full command line, e.g. `/tp 100 64 200`.
    #[serde(default)]
    pub raw: String,
    /// Command name without the slash, e.g. `tp`.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockBreakEvent {
    pub player_uuid: String,
    pub name: String,
    #[serde(default)]
    pub world: WorldRef,
    pub position: BlockPos,
    #[serde(default)]
    pub drops: Vec<ItemStack>,
    #[serde(default)]
    pub xp: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockPlaceEvent {
    pub player_uuid: String,
    pub name: String,
    #[serde(default)]
    pub world: WorldRef,
    pub position: BlockPos,
    pub block: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerHurtEvent {
    pub player_uuid: String,
    pub name: String,
    pub damage: f64,
    #[serde(default)]
    pub attack_immunity_ms: i64,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerHealEvent {
    pub player_uuid: String,
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerFoodLossEvent {
    pub player_uuid: String,
    pub name: String,
    pub from: i32,
    pub to: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerDeathEvent {
    pub player_uuid: String,
    pub name: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub keep_inventory: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldExplosionEvent {
    #[serde(default)]
    pub world: WorldRef,
    pub position: Vec3,
    #[serde(default)]
    pub entity_uuids: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<BlockPos>,
    #[serde(default)]
    pub item_drop_chance: f64,
    #[serde(default)]
    pub spawn_fire: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldCloseEvent {
    #[serde(default)]
    pub world: WorldRef,
}

/// The plugin's single reply to an event that expects one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    pub event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<EventMutation>,
}

impl EventResult {
    /// Accept the event as-is.
    pub fn ack(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            cancel: Some(false),
            update: None,
        }
    }

    /// Veto the game action behind the event.
    pub fn cancel(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            cancel: Some(true),
            update: None,
        }
    }

    /// Accept the event with a modified payload.
    pub fn mutate(event_id: impl Into<String>, mutation: EventMutation) -> Self {
        Self {
            event_id: event_id.into(),
            cancel: None,
            update: Some(mutation),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel == Some(true)
    }
}

/// Payload rewrites a plugin may send back for specific event types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventMutation {
    Chat(ChatMutation),
    BlockBreak(BlockBreakMutation),
    PlayerHurt(PlayerHurtMutation),
    PlayerHeal(PlayerHealMutation),
    PlayerFoodLoss(PlayerFoodLossMutation),
    PlayerDeath(PlayerDeathMutation),
    WorldExplosion(WorldExplosionMutation),
}

impl EventMutation {
    /// The only event type this mutation may answer.
    pub fn event_type(&self) -> EventType {
        match self {
            EventMutation::Chat(_) => EventType::Chat,
            EventMutation::BlockBreak(_) => EventType::PlayerBlockBreak,
            EventMutation::PlayerHurt(_) => EventType::PlayerHurt,
            EventMutation::PlayerHeal(_) => EventType::PlayerHeal,
            EventMutation::PlayerFoodLoss(_) => EventType::PlayerFoodLoss,
            EventMutation::PlayerDeath(_) => EventType::PlayerDeath,
            EventMutation::WorldExplosion(_) => EventType::WorldExplosion,
        }
    }

    /// Replace a chat message's text.
    pub fn chat_message(message: impl Into<String>) -> Self {
        EventMutation::Chat(ChatMutation {
            message: Some(message.into()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatMutation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockBreakMutation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drops: Option<Vec<ItemStack>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerHurtMutation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_immunity_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerHealMutation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerFoodLossMutation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerDeathMutation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_inventory: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldExplosionMutation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_uuids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<BlockPos>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_drop_chance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_fire: Option<bool>,
}
