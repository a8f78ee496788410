use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::OnceLock;

pub type TerritoryId = u32;

/// Body of a `GameFeed` response. Only the fields the duplicator reads are modelled;
/// `map` stays raw so it can be written to disk untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameFeedResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryGameMap {
    pub territories: Vec<Territory>,
    #[serde(default)]
    pub bonuses: Vec<Bonus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Territory {
    #[serde(deserialize_with = "territory_id")]
    pub id: TerritoryId,
    pub name: String,
    #[serde(default, deserialize_with = "territory_ids")]
    pub connected_to: Vec<TerritoryId>,
    pub coords: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bonus {
    /// Assigned by the source map; the target map hands out its own.
    #[serde(deserialize_with = "integer")]
    pub id: i64,
    pub name: String,
    #[serde(deserialize_with = "integer")]
    pub value: i64,
    #[serde(rename = "territoryIDs", default, deserialize_with = "territory_ids")]
    pub territory_ids: Vec<TerritoryId>,
}

// The query-game API is loose about numbers: some payloads quote them.
#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Int(i64),
    Text(String),
}

impl Lenient {
    fn into_i64<E: de::Error>(self) -> Result<i64, E> {
        match self {
            Lenient::Int(v) => Ok(v),
            Lenient::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected an integer, got {s:?}"))),
        }
    }

    fn into_territory_id<E: de::Error>(self) -> Result<TerritoryId, E> {
        let v = self.into_i64::<E>()?;
        TerritoryId::try_from(v).map_err(|_| E::custom(format!("invalid territory id {v}")))
    }
}

fn integer<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Lenient::deserialize(d)?.into_i64()
}

fn territory_id<'de, D: Deserializer<'de>>(d: D) -> Result<TerritoryId, D::Error> {
    Lenient::deserialize(d)?.into_territory_id()
}

fn territory_ids<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<TerritoryId>, D::Error> {
    Vec::<Lenient>::deserialize(d)?
        .into_iter()
        .map(Lenient::into_territory_id)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Wrap {
    Normal,
    WrapHorizontally,
    WrapVertically,
}

impl Default for Wrap {
    fn default() -> Self {
        Self::Normal
    }
}

impl Wrap {
    pub const ALL: [Wrap; 3] = [Wrap::Normal, Wrap::WrapHorizontally, Wrap::WrapVertically];

    pub fn as_str(self) -> &'static str {
        match self {
            Wrap::Normal => "Normal",
            Wrap::WrapHorizontally => "WrapHorizontally",
            Wrap::WrapVertically => "WrapVertically",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.as_str() == s)
    }
}

pub const DEFAULT_BONUS_COLOR: &str = "#000000";

/// One mutation accepted by the set-map-details API.
///
/// Fields stay primitive so a record read back from JSON can be checked with
/// [`Command::validate`] before it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "command",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    AddBonus {
        name: String,
        armies: i64,
        color: String,
    },
    AddTerritoryToBonus {
        id: TerritoryId,
        bonus_name: String,
    },
    AddTerritoryConnection {
        id1: TerritoryId,
        id2: TerritoryId,
        wrap: String,
    },
    SetTerritoryName {
        id: TerritoryId,
        name: String,
    },
    SetTerritoryCenterPoint {
        id: TerritoryId,
        x: String,
        y: String,
    },
}

impl Command {
    pub fn add_bonus(name: impl Into<String>, armies: i64) -> Self {
        Self::AddBonus {
            name: name.into(),
            armies,
            color: DEFAULT_BONUS_COLOR.to_string(),
        }
    }

    pub fn connection(id1: TerritoryId, id2: TerritoryId) -> Self {
        Self::AddTerritoryConnection {
            id1,
            id2,
            wrap: Wrap::default().as_str().to_string(),
        }
    }

    /// Discriminator as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::AddBonus { .. } => "addBonus",
            Command::AddTerritoryToBonus { .. } => "addTerritoryToBonus",
            Command::AddTerritoryConnection { .. } => "addTerritoryConnection",
            Command::SetTerritoryName { .. } => "setTerritoryName",
            Command::SetTerritoryCenterPoint { .. } => "setTerritoryCenterPoint",
        }
    }

    /// Field-level problems with this command. Empty when the command is well formed.
    pub fn validate(&self) -> Vec<String> {
        let mut bad: Vec<&str> = Vec::new();
        match self {
            Command::AddBonus { name, color, .. } => {
                if name.is_empty() {
                    bad.push("name");
                }
                if !is_hex_color(color) {
                    bad.push("color");
                }
            }
            Command::AddTerritoryToBonus { id, bonus_name } => {
                if *id == 0 {
                    bad.push("id");
                }
                if bonus_name.is_empty() {
                    bad.push("bonusName");
                }
            }
            Command::AddTerritoryConnection { id1, id2, .. } => {
                if *id1 == 0 {
                    bad.push("id1");
                }
                if *id2 == 0 {
                    bad.push("id2");
                }
            }
            Command::SetTerritoryName { id, name } => {
                if *id == 0 {
                    bad.push("id");
                }
                if name.is_empty() {
                    bad.push("name");
                }
            }
            Command::SetTerritoryCenterPoint { id, x, y } => {
                if *id == 0 {
                    bad.push("id");
                }
                if x.is_empty() {
                    bad.push("x");
                }
                if y.is_empty() {
                    bad.push("y");
                }
            }
        }

        let mut errors: Vec<String> = bad.into_iter().map(|f| self.field_error(f)).collect();
        if let Command::AddTerritoryConnection { wrap, .. } = self {
            if Wrap::parse(wrap).is_none() {
                let allowed: Vec<&str> = Wrap::ALL.iter().map(|w| w.as_str()).collect();
                errors.push(format!(
                    "Invalid wrap for Command {}. Only {} supported by Warzone: {}",
                    self.kind(),
                    allowed.join(", "),
                    self.to_json()
                ));
            }
        }
        errors
    }

    fn field_error(&self, field: &str) -> String {
        format!(
            "Invalid {field} for Command {}: {}",
            self.kind(),
            self.to_json()
        )
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

fn is_hex_color(s: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("static regex"))
        .is_match(s)
}

/// Body of a `SetMapDetails` request.
#[derive(Clone, Serialize, Deserialize)]
pub struct SetMapDetailsRequest {
    pub email: String,
    #[serde(rename = "APIToken")]
    pub api_token: String,
    #[serde(rename = "mapID")]
    pub map_id: u64,
    pub commands: Vec<Command>,
}

impl fmt::Debug for SetMapDetailsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetMapDetailsRequest")
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .field("map_id", &self.map_id)
            .field("commands", &self.commands.len())
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetMapDetailsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub mod endpoints {
    pub const DEFAULT_BASE_URL: &str = "https://www.warzone.com";
    pub const GAME_FEED: &str = "/API/GameFeed";
    pub const SET_MAP_DETAILS: &str = "/API/SetMapDetails";
    pub const PREVIEW_MAP: &str = "/SinglePlayer";

    pub fn preview_url(base_url: &str, map_id: u64) -> String {
        format!(
            "{}{PREVIEW_MAP}?PreviewMap={map_id}",
            base_url.trim_end_matches('/')
        )
    }
}
