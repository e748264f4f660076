use serde::{Deserialize, Serialize};

/// Which tile grid of a garden a tile index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TileType {
    Dirt,
    Boardwalk,
}

impl TileType {
    pub const ALL: [TileType; 2] = [TileType::Dirt, TileType::Boardwalk];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dirt => "Dirt",
            Self::Boardwalk => "Boardwalk",
        }
    }
}

impl std::fmt::Display for TileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutating commands the layout engine sends to the game. All of them are
/// fire-and-forget; confirmation is observed on the next state read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum GameCommand {
    PotPlant {
        slot: u32,
    },
    PlantGardenPlant {
        slot: u32,
        item_id: String,
    },
    PlaceDecor {
        tile_type: TileType,
        local_tile_index: u32,
        decor_id: String,
        rotation: i32,
    },
    PickupDecor {
        tile_type: TileType,
        local_tile_index: u32,
    },
}

impl GameCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PotPlant { .. } => "PotPlant",
            Self::PlantGardenPlant { .. } => "PlantGardenPlant",
            Self::PlaceDecor { .. } => "PlaceDecor",
            Self::PickupDecor { .. } => "PickupDecor",
        }
    }

    /// Tile the command mutates.
    pub fn target(&self) -> (TileType, u32) {
        match self {
            Self::PotPlant { slot } | Self::PlantGardenPlant { slot, .. } => (TileType::Dirt, *slot),
            Self::PlaceDecor {
                tile_type,
                local_tile_index,
                ..
            }
            | Self::PickupDecor {
                tile_type,
                local_tile_index,
            } => (*tile_type, *local_tile_index),
        }
    }
}

/// Scope every room command is addressed to.
pub const SCOPE_PATH: [&str; 2] = ["Room", "Quinoa"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub scope_path: Vec<String>,
    #[serde(flatten)]
    pub command: GameCommand,
}

impl Envelope {
    pub fn new(command: GameCommand) -> Self {
        Self {
            scope_path: SCOPE_PATH.iter().map(|s| s.to_string()).collect(),
            command,
        }
    }

    /// JSON text as written to the game connection.
    pub fn to_wire(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Short, user-facing message surfaced as a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }
}

/// Remote state slots exposed by the page store bridge.
pub mod labels {
    pub const INVENTORY: &str = "myInventoryAtom";
    pub const STATE: &str = "stateAtom";
    pub const MAP: &str = "mapAtom";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plant_command_wire_shape() {
        let wire = Envelope::new(GameCommand::PlantGardenPlant {
            slot: 3,
            item_id: "x1".to_string(),
        })
        .to_wire()
        .unwrap();
        let v: serde_json::Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "scopePath": ["Room", "Quinoa"],
                "type": "PlantGardenPlant",
                "slot": 3,
                "itemId": "x1",
            })
        );
    }

    #[test]
    fn decor_commands_use_camel_case_fields() {
        let v = serde_json::to_value(GameCommand::PlaceDecor {
            tile_type: TileType::Boardwalk,
            local_tile_index: 7,
            decor_id: "Lantern".to_string(),
            rotation: 90,
        })
        .unwrap();
        assert_eq!(v["type"], "PlaceDecor");
        assert_eq!(v["tileType"], "Boardwalk");
        assert_eq!(v["localTileIndex"], 7);
        assert_eq!(v["decorId"], "Lantern");

        let back: GameCommand = serde_json::from_value(serde_json::json!({
            "type": "PickupDecor",
            "tileType": "Dirt",
            "localTileIndex": 5,
        }))
        .unwrap();
        assert_eq!(back.target(), (TileType::Dirt, 5));
        assert_eq!(back.name(), "PickupDecor");
    }
}
