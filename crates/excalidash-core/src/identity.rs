//! Pseudonymous per-install identity.
//!
//! Generated once from a fixed pool of names and colors, stored as JSON in the
//! user data directory and reused until cleared.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Storage key (file stem) for the persisted identity.
pub const IDENTITY_KEY: &str = "excalidash-user-id";

/// Display names paired with their fixed initials.
pub const NAME_POOL: &[(&str, &str)] = &[
    ("Optimus Prime", "OP"),
    ("Megatron", "ME"),
    ("Starscream", "ST"),
    ("Bumblebee", "BB"),
    ("Ultra Magnus", "UM"),
    ("Shockwave", "SH"),
    ("Soundwave", "SW"),
    ("Ironhide", "IR"),
    ("Ratchet", "RA"),
    ("Prowl", "PR"),
    ("Jazz", "JA"),
    ("Hot Rod", "HR"),
    ("Alpha Trion", "AT"),
    ("Wheeljack", "WH"),
    ("Sideswipe", "SI"),
    ("Sunstreaker", "SU"),
    ("Inferno", "IN"),
    ("Grapple", "GR"),
    ("Blaster", "BL"),
    ("Perceptor", "PE"),
    ("Trailbreaker", "TR"),
    ("Cosmos", "CO"),
    ("Warpath", "WA"),
    ("Powerglide", "PO"),
    ("Arcee", "AR"),
    ("Springer", "SP"),
    ("Kup", "KU"),
    ("Blurr", "BU"),
    ("Grimlock", "GL"),
    ("Swoop", "WO"),
    ("Skywarp", "SK"),
    ("Thundercracker", "TH"),
    ("Ramjet", "AM"),
    ("Cyclonus", "CY"),
    ("Scourge", "SC"),
    ("Galvatron", "GA"),
    ("Astrotrain", "AS"),
    ("Blitzwing", "BZ"),
    ("Rumble", "RU"),
    ("Frenzy", "FR"),
    ("Laserbeak", "LA"),
    ("Ravage", "RV"),
    ("Unicron", "UN"),
    ("Devastator", "DE"),
    ("Menasor", "MN"),
    ("Bruticus", "BR"),
    ("Motormaster", "MO"),
    ("Scrapper", "CR"),
    ("Mixmaster", "MA"),
    ("Bonecrusher", "BO"),
    ("Hook", "HO"),
    ("Vortex", "VO"),
    ("Swindle", "WI"),
];

/// Cursor/avatar colors (Tailwind 500 shades).
pub const COLOR_POOL: &[&str] = &[
    "#ef4444", "#f97316", "#f59e0b", "#84cc16", "#22c55e", "#10b981", "#14b8a6", "#06b6d4",
    "#0ea5e9", "#3b82f6", "#6366f1", "#8b5cf6", "#a855f7", "#d946ef", "#ec4899", "#f43f5e",
];

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Could not determine data directory")]
    NoDataDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt identity file: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Who this client is to its peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub initials: String,
    pub color: String,
}

impl Identity {
    /// Draw a new random identity from the pools.
    pub fn generate() -> Self {
        let bits = Uuid::new_v4().as_u128();
        let (name, initials) = NAME_POOL[(bits as usize) % NAME_POOL.len()];
        let color = COLOR_POOL[((bits >> 64) as usize) % COLOR_POOL.len()];
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            initials: initials.to_string(),
            color: color.to_string(),
        }
    }
}

/// File-backed identity persistence.
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// Store the identity at an explicit path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<data dir>/excalidash/excalidash-user-id.json`
    pub fn default_location() -> Result<Self, IdentityError> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or(IdentityError::NoDataDir)?;
        Ok(Self::new(
            base.join("excalidash").join(format!("{IDENTITY_KEY}.json")),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the stored identity, generating and persisting one on first use.
    pub fn load_or_create(&self) -> Result<Identity, IdentityError> {
        if self.path.exists() {
            let json = fs::read_to_string(&self.path)?;
            return Ok(serde_json::from_str(&json)?);
        }

        let identity = Identity::generate();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(&identity)?)?;
        log::info!("Generated identity {} ({})", identity.name, identity.id);
        Ok(identity)
    }

    /// Forget the stored identity; the next load generates a new one.
    pub fn clear(&self) -> Result<(), IdentityError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
