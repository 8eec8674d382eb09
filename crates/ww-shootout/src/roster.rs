use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ww_types::Combatant;

#[derive(thiserror::Error, Debug)]
pub enum RosterError {
    #[error("must have at least 2 replicas, got {0}")]
    NotEnoughReplicas(usize),
    #[error("read roster file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unmarshal roster JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("cowboy list size {len} is smaller than cowboy replica count {replicas}")]
    TooShort { len: usize, replicas: usize },
    #[error("cowboy names are not unique: {0:?} appears twice")]
    DuplicateName(String),
    #[error("cowboy {0:?} health must be positive")]
    HealthNotPositive(String),
    #[error("cowboy {0:?} damage must be positive")]
    DamageNotPositive(String),
}

/// Raw roster entry; signed so non-positive values are reported by
/// validation rather than as a parse failure.
#[derive(Debug, Clone, serde::Deserialize)]
struct RosterEntry {
    name: String,
    health: i64,
    damage: i64,
}

pub fn validate_replicas(replicas: usize) -> Result<usize, RosterError> {
    if replicas < 2 {
        return Err(RosterError::NotEnoughReplicas(replicas));
    }
    Ok(replicas)
}

/// Load and validate the roster. Combatant `i` belongs to replica id `i`.
pub fn load_roster(path: &Path, replicas: usize) -> Result<Vec<Combatant>, RosterError> {
    let raw = std::fs::read(path)
        .map_err(|source| RosterError::Io { path: path.to_path_buf(), source })?;
    parse_roster(&raw, replicas)
}

pub fn parse_roster(raw: &[u8], replicas: usize) -> Result<Vec<Combatant>, RosterError> {
    let entries: Vec<RosterEntry> = serde_json::from_slice(raw)?;
    validate(&entries, replicas)?;
    Ok(entries
        .into_iter()
        .map(|e| Combatant { name: e.name, health: e.health as u64, damage: e.damage as u64 })
        .collect())
}

fn validate(entries: &[RosterEntry], replicas: usize) -> Result<(), RosterError> {
    if entries.len() < replicas {
        return Err(RosterError::TooShort { len: entries.len(), replicas });
    }
    let mut names = HashSet::with_capacity(entries.len());
    for e in entries {
        if !names.insert(e.name.as_str()) {
            return Err(RosterError::DuplicateName(e.name.clone()));
        }
    }
    if let Some(e) = entries.iter().find(|e| e.health <= 0) {
        return Err(RosterError::HealthNotPositive(e.name.clone()));
    }
    if let Some(e) = entries.iter().find(|e| e.damage <= 0) {
        return Err(RosterError::DamageNotPositive(e.name.clone()));
    }
    Ok(())
}
