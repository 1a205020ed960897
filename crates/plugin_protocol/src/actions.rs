//! Actions sent by plugins and the asynchronous results the host returns.

use crate::types::{BlockPos, BlockState, EntityRef, GameMode, ItemStack, Vec3, WorldRef};
use serde::{Deserialize, Serialize};

/// An outbound command for the host.
///
/// Without a `correlation_id` the action is fire-and-forget. With one, the
/// host answers with an [`ActionResult`] carrying the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            correlation_id: None,
            kind,
        }
    }

    pub fn correlated(correlation_id: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            kind,
        }
    }
}

impl From<ActionKind> for Action {
    fn from(kind: ActionKind) -> Self {
        Action::new(kind)
    }
}

/// Ordered actions written together in one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionBatch {
    pub actions: Vec<Action>,
}

/// The closed set of action kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendChat(SendChatAction),
    Teleport(TeleportAction),
    Kick(KickAction),
    SetGameMode(SetGameModeAction),
    GiveItem(GiveItemAction),
    ClearInventory(ClearInventoryAction),
    SetHealth(SetHealthAction),
    SetFood(SetFoodAction),
    SendTitle(SendTitleAction),
    PlaySound(PlaySoundAction),
    ExecuteCommand(ExecuteCommandAction),
    WorldSetBlock(WorldSetBlockAction),
    WorldAddParticle(WorldAddParticleAction),
    WorldQueryPlayers(WorldQueryPlayersAction),
    WorldQueryEntities(WorldQueryEntitiesAction),
    WorldQueryBlock(WorldQueryBlockAction),
}

impl ActionKind {
    /// Query kinds only make sense with a correlation id.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            ActionKind::WorldQueryPlayers(_)
                | ActionKind::WorldQueryEntities(_)
                | ActionKind::WorldQueryBlock(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SendChatAction {
    pub target_uuid: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TeleportAction {
    pub player_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec3>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KickAction {
    pub player_uuid: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetGameModeAction {
    pub player_uuid: String,
    pub game_mode: GameMode,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GiveItemAction {
    pub player_uuid: String,
    pub item: ItemStack,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClearInventoryAction {
    pub player_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SetHealthAction {
    pub player_uuid: String,
    pub health: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_health: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SetFoodAction {
    pub player_uuid: String,
    pub food: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SendTitleAction {
    pub player_uuid: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub fade_in_ms: i64,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub fade_out_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaySoundAction {
    pub player_uuid: String,
    pub sound: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_volume")]
    pub pitch: f32,
}

fn default_volume() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecuteCommandAction {
    pub player_uuid: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldSetBlockAction {
    pub world: WorldRef,
    pub position: BlockPos,
    /// `None` clears the block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockState>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldAddParticleAction {
    pub world: WorldRef,
    pub position: Vec3,
    pub particle: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldQueryPlayersAction {
    pub world: WorldRef,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldQueryEntitiesAction {
    pub world: WorldRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldQueryBlockAction {
    pub world: WorldRef,
    pub position: BlockPos,
}

/// Outcome of a correlated action, sent asynchronously by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub correlation_id: String,
    #[serde(default)]
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResultPayload>,
}

impl ActionResult {
    pub fn ok(correlation_id: impl Into<String>, result: Option<ActionResultPayload>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: ActionStatus::ok(),
            result,
        }
    }

    pub fn error(correlation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: ActionStatus {
                ok: false,
                error: Some(message.into()),
            },
            result: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.ok
    }

    pub fn players(&self) -> Option<&[EntityRef]> {
        match &self.result {
            Some(ActionResultPayload::WorldPlayers(r)) => Some(&r.players),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionStatus {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionStatus {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResultPayload {
    WorldPlayers(WorldPlayersResult),
    WorldEntities(WorldEntitiesResult),
    WorldBlock(WorldBlockResult),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldPlayersResult {
    pub world: WorldRef,
    #[serde(default)]
    pub players: Vec<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldEntitiesResult {
    pub world: WorldRef,
    #[serde(default)]
    pub entities: Vec<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldBlockResult {
    pub world: WorldRef,
    pub position: BlockPos,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockState>,
}
