//! Rollingstock registry types: models, owners and individual pieces.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{RsId, RsModelId, RsOwnerId};

/// Traction of an engine model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    Electric,
    Diesel,
    Steam,
}

/// What kind of vehicle a model describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RsType {
    Engine(EngineKind),
    Coach,
    FreightWagon,
}

impl RsType {
    pub fn is_engine(self) -> bool {
        matches!(self, RsType::Engine(_))
    }

    /// Engines that can only run under catenary.
    pub fn is_electric_only(self) -> bool {
        matches!(self, RsType::Engine(EngineKind::Electric))
    }
}

/// A rollingstock model, e.g. "E.656".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsModel {
    pub id: RsModelId,
    pub name: String,
    /// Optional suffix distinguishing liveries or variants.
    pub suffix: Option<String>,
    pub kind: RsType,
    /// Maximum speed in km/h.
    pub max_speed_kmh: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsOwner {
    pub id: RsOwnerId,
    pub name: String,
}

/// A single physical vehicle.
///
/// Model and owner are mutable assignments; the piece identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingStockPiece {
    pub id: RsId,
    pub model: RsModelId,
    pub number: u32,
    pub owner: Option<RsOwnerId>,
}

/// Every model, owner and piece known to the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollingStockRegistry {
    models: BTreeMap<RsModelId, RsModel>,
    owners: BTreeMap<RsOwnerId, RsOwner>,
    pieces: BTreeMap<RsId, RollingStockPiece>,
}

/// Error when registering a piece against unknown model or owner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown rollingstock model {0}")]
    UnknownModel(RsModelId),
    #[error("unknown rollingstock owner {0}")]
    UnknownOwner(RsOwnerId),
    #[error("rollingstock {model} number {number} already exists")]
    Duplicate { model: RsModelId, number: u32 },
}

impl RollingStockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_model(&mut self, model: RsModel) {
        self.models.insert(model.id, model);
    }

    pub fn add_owner(&mut self, owner: RsOwner) {
        self.owners.insert(owner.id, owner);
    }

    /// Register a piece. Model/number pairs must be unique.
    pub fn add_piece(&mut self, piece: RollingStockPiece) -> Result<(), RegistryError> {
        if !self.models.contains_key(&piece.model) {
            return Err(RegistryError::UnknownModel(piece.model));
        }
        if let Some(owner) = piece.owner.filter(|o| !self.owners.contains_key(o)) {
            return Err(RegistryError::UnknownOwner(owner));
        }
        let duplicate = self
            .pieces
            .values()
            .any(|p| p.id != piece.id && p.model == piece.model && p.number == piece.number);
        if duplicate {
            return Err(RegistryError::Duplicate {
                model: piece.model,
                number: piece.number,
            });
        }
        self.pieces.insert(piece.id, piece);
        Ok(())
    }

    pub fn piece(&self, id: RsId) -> Option<&RollingStockPiece> {
        self.pieces.get(&id)
    }

    pub fn model(&self, id: RsModelId) -> Option<&RsModel> {
        self.models.get(&id)
    }

    /// Model of the given piece.
    pub fn model_of(&self, id: RsId) -> Option<&RsModel> {
        self.piece(id).and_then(|p| self.model(p.model))
    }

    pub fn pieces(&self) -> impl Iterator<Item = &RollingStockPiece> {
        self.pieces.values()
    }

    /// Display name of a piece, e.g. "E.656.023" or "E.656.023:FS".
    pub fn display_name(&self, id: RsId) -> Option<String> {
        let piece = self.piece(id)?;
        let model = self.model(piece.model)?;
        let mut name = PieceName {
            model,
            number: piece.number,
        }
        .to_string();
        if let Some(owner) = piece.owner.and_then(|o| self.owners.get(&o)) {
            name.push(':');
            name.push_str(&owner.name);
        }
        Some(name)
    }
}

struct PieceName<'a> {
    model: &'a RsModel,
    number: u32,
}

impl fmt::Display for PieceName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.model.name)?;
        if let Some(suffix) = &self.model.suffix {
            f.write_str(suffix)?;
        }
        // Engines use three-digit running numbers, wagons four or more.
        match self.model.kind {
            RsType::Engine(_) => write!(f, ".{:03}", self.number),
            _ => write!(f, ".{:04}", self.number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RollingStockRegistry {
        let mut reg = RollingStockRegistry::new();
        reg.add_model(RsModel {
            id: RsModelId(1),
            name: "E.656".into(),
            suffix: None,
            kind: RsType::Engine(EngineKind::Electric),
            max_speed_kmh: 150,
        });
        reg.add_model(RsModel {
            id: RsModelId(2),
            name: "Gbs".into(),
            suffix: Some("-fs".into()),
            kind: RsType::FreightWagon,
            max_speed_kmh: 100,
        });
        reg.add_owner(RsOwner {
            id: RsOwnerId(1),
            name: "FS".into(),
        });
        reg
    }

    #[test]
    fn display_names() {
        let mut reg = registry();
        reg.add_piece(RollingStockPiece {
            id: RsId(1),
            model: RsModelId(1),
            number: 23,
            owner: Some(RsOwnerId(1)),
        })
        .unwrap();
        reg.add_piece(RollingStockPiece {
            id: RsId(2),
            model: RsModelId(2),
            number: 7,
            owner: None,
        })
        .unwrap();

        assert_eq!(reg.display_name(RsId(1)).unwrap(), "E.656.023:FS");
        assert_eq!(reg.display_name(RsId(2)).unwrap(), "Gbs-fs.0007");
        assert!(reg.display_name(RsId(3)).is_none());
    }

    #[test]
    fn rejects_unknown_model_and_duplicates() {
        let mut reg = registry();
        let err = reg
            .add_piece(RollingStockPiece {
                id: RsId(1),
                model: RsModelId(9),
                number: 1,
                owner: None,
            })
            .unwrap_err();
        assert_eq!(err, RegistryError::UnknownModel(RsModelId(9)));

        let piece = RollingStockPiece {
            id: RsId(1),
            model: RsModelId(1),
            number: 1,
            owner: None,
        };
        reg.add_piece(piece.clone()).unwrap();
        // Same id re-registered is an update, not a duplicate.
        reg.add_piece(piece).unwrap();
        let err = reg
            .add_piece(RollingStockPiece {
                id: RsId(2),
                model: RsModelId(1),
                number: 1,
                owner: None,
            })
            .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { number: 1, .. }));
    }

    #[test]
    fn electric_only_detection() {
        assert!(RsType::Engine(EngineKind::Electric).is_electric_only());
        assert!(!RsType::Engine(EngineKind::Diesel).is_electric_only());
        assert!(!RsType::Coach.is_electric_only());
        assert!(RsType::Engine(EngineKind::Steam).is_engine());
    }
}
