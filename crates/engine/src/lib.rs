use serde::Deserialize;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use wzmap_protocol::{Command, QueryGameMap, Territory, TerritoryId};


/// Every way a duplication can stop. All of them end the run; none are retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{api} API returned an error: {message}")]
    Remote { api: &'static str, message: String },
    #[error("{} validation error(s)", .0.len())]
    Validation(Vec<String>),
    #[error("malformed {what}: {message}")]
    Malformed { what: &'static str, message: String },
    #[error("failed to {action} {path:?}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    /// Short heading for reporting the failure to the operator.
    pub fn title(&self) -> &'static str {
        match self {
            PipelineError::MissingField(_) => "Missing input",
            PipelineError::Transport { .. } => "Network error",
            PipelineError::Remote { .. } => "Error from Warzone API",
            PipelineError::Validation(_) => "Errors detected while validating commands",
            PipelineError::Malformed { .. } => "Unexpected map data",
            PipelineError::Io { .. } => "File error",
        }
    }

    /// Individual lines worth showing below the title.
    pub fn details(&self) -> Vec<String> {
        match self {
            PipelineError::Validation(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }

    fn malformed(what: &'static str, message: impl ToString) -> Self {
        PipelineError::Malformed {
            what,
            message: message.to_string(),
        }
    }
}

/// Reads the raw `map` object of a game feed into territories and bonuses.
pub fn parse_map(map: &serde_json::Value) -> Result<QueryGameMap, PipelineError> {
    let parsed =
        QueryGameMap::deserialize(map).map_err(|e| PipelineError::malformed("map", e))?;

    let mut ids = HashSet::with_capacity(parsed.territories.len());
    for t in &parsed.territories {
        if !ids.insert(t.id) {
            warn!(territory = t.id, "duplicate territory id in source map");
        }
    }

    debug!(
        territories = parsed.territories.len(),
        bonuses = parsed.bonuses.len(),
        "parsed map"
    );
    Ok(parsed)
}

/// Symmetric Cantor pairing of an undirected edge. Operands are ordered first so
/// `(a, b)` and `(b, a)` share a key.
pub fn connection_key(a: TerritoryId, b: TerritoryId) -> u128 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let (lo, hi) = (u128::from(lo), u128::from(hi));
    (lo + hi) * (lo + hi + 1) / 2 + lo
}

/// One `addTerritoryConnection` per undirected edge, in first-seen order.
pub fn connection_commands(territories: &[Territory]) -> Vec<Command> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for t in territories {
        for &other in &t.connected_to {
            if other == t.id {
                continue;
            }
            if seen.insert(connection_key(t.id, other)) {
                out.push(Command::connection(t.id, other));
            }
        }
    }
    out
}

fn split_coords(t: &Territory) -> Result<(String, String), PipelineError> {
    let parts: Vec<&str> = t.coords.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [x, y] if !x.is_empty() && !y.is_empty() => Ok((x.to_string(), y.to_string())),
        _ => Err(PipelineError::malformed(
            "territory coords",
            format!("territory {} has coords {:?}", t.id, t.coords),
        )),
    }
}

/// Expands a parsed map into the ordered command list the set-map-details API needs.
///
/// Bonuses are created before territories are added to them, and connections come
/// before the idempotent name and center point updates.
pub fn build_commands(map: &QueryGameMap) -> Result<Vec<Command>, PipelineError> {
    let mut add_bonus = Vec::with_capacity(map.bonuses.len());
    let mut add_to_bonus = Vec::new();
    for bonus in &map.bonuses {
        add_bonus.push(Command::add_bonus(&bonus.name, bonus.value));
        for &id in &bonus.territory_ids {
            add_to_bonus.push(Command::AddTerritoryToBonus {
                id,
                bonus_name: bonus.name.clone(),
            });
        }
    }

    let connections = connection_commands(&map.territories);

    let mut names = Vec::with_capacity(map.territories.len());
    let mut centers = Vec::with_capacity(map.territories.len());
    for t in &map.territories {
        names.push(Command::SetTerritoryName {
            id: t.id,
            name: t.name.clone(),
        });
        let (x, y) = split_coords(t)?;
        centers.push(Command::SetTerritoryCenterPoint { id: t.id, x, y });
    }

    let mut commands = Vec::with_capacity(
        add_bonus.len() + add_to_bonus.len() + connections.len() + names.len() + centers.len(),
    );
    commands.extend(add_bonus);
    commands.extend(add_to_bonus);
    commands.extend(connections);
    commands.extend(names);
    commands.extend(centers);
    Ok(commands)
}

/// Runs every command's checks and reports all failures together.
pub fn validate_commands(commands: &[Command]) -> Result<(), PipelineError> {
    let errors: Vec<String> = commands.iter().flat_map(Command::validate).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Validation(errors))
    }
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub territories: usize,
    pub bonuses: usize,
    pub commands: Vec<Command>,
}

/// Parse, build and validate: everything short of the network.
pub fn plan(map: &serde_json::Value) -> Result<Plan, PipelineError> {
    let parsed = parse_map(map)?;
    let commands = build_commands(&parsed)?;
    validate_commands(&commands)?;
    debug!(commands = commands.len(), "built command plan");
    Ok(Plan {
        territories: parsed.territories.len(),
        bonuses: parsed.bonuses.len(),
        commands,
    })
}

/// A downloaded `map` object kept on disk between download and upload.
#[derive(Debug, Clone)]
pub struct MapFile {
    path: PathBuf,
}

impl MapFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, map: &serde_json::Value) -> Result<(), PipelineError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| PipelineError::Io {
                action: "create directory",
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(map)
            .map_err(|e| PipelineError::malformed("map", e))?;
        std::fs::write(&self.path, text).map_err(|source| self.io_error("write", source))?;
        debug!(path = %self.path.display(), "saved map");
        Ok(())
    }

    /// Loads the saved map. A whole game-feed response is accepted too; its `map`
    /// member is used.
    pub fn load(&self) -> Result<serde_json::Value, PipelineError> {
        let text =
            std::fs::read_to_string(&self.path).map_err(|source| self.io_error("read", source))?;
        let mut value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| PipelineError::malformed("map file", e))?;

        if value.get("territories").is_none() {
            if let Some(inner) = value.get_mut("map").map(serde_json::Value::take) {
                value = inner;
            }
        }
        Ok(value)
    }

    fn io_error(&self, action: &'static str, source: io::Error) -> PipelineError {
        PipelineError::Io {
            action,
            path: self.path.clone(),
            source,
        }
    }
}
