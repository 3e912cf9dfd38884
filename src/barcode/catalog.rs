use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::barcode::Color;
use crate::errors::CatalogError;

/// Position of a barcode definition inside the [`Catalog`]. Stable for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct IdentityIndex(pub usize);

impl fmt::Display for IdentityIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A colored barcode worn by exactly one individual: ordered chips from the front (chip 0) to the back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarcodeDefinition {
    pub name: String,
    pub colors: Vec<Color>,
}

impl BarcodeDefinition {
    /// Basic usage:
    ///
    /// ```
    /// use tagtrack_rs::barcode::{BarcodeDefinition, Color};
    /// let def = BarcodeDefinition::new("rat_07", "rgb");
    /// assert_eq!(def.colors, vec![Color('R'), Color('G'), Color('B')]);
    /// ```
    pub fn new(name: &str, code: &str) -> Self {
        BarcodeDefinition {
            name: name.to_string(),
            colors: code.chars().map(Color::from_symbol).collect(),
        }
    }
    pub fn chips(&self) -> usize {
        self.colors.len()
    }
    pub fn code(&self) -> String {
        self.colors.iter().map(|c| c.symbol()).collect()
    }
    pub fn reversed(&self) -> Vec<Color> {
        self.colors.iter().rev().copied().collect()
    }
    pub fn is_palindrome(&self) -> bool {
        self.colors == self.reversed()
    }
}

/// Read-only set of valid barcodes, one per tracked individual
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    definitions: Vec<BarcodeDefinition>,
    chips: usize,
    by_name: HashMap<String, IdentityIndex>,
}

impl Catalog {
    /// Validates the definitions and builds the catalog
    ///
    /// Basic usage:
    ///
    /// ```
    /// use tagtrack_rs::barcode::{BarcodeDefinition, Catalog};
    /// let catalog = Catalog::new(vec![
    ///     BarcodeDefinition::new("rat_01", "RGB"),
    ///     BarcodeDefinition::new("rat_02", "RBY"),
    /// ]).unwrap();
    /// assert_eq!(catalog.chips(), 3);
    /// ```
    pub fn new(definitions: Vec<BarcodeDefinition>) -> Result<Self, CatalogError> {
        let first = definitions.first().ok_or(CatalogError::Empty)?;
        let chips = first.chips();
        let mut by_name = HashMap::with_capacity(definitions.len());
        for (position, def) in definitions.iter().enumerate() {
            if def.name.trim().is_empty() {
                return Err(CatalogError::EmptyName { position });
            }
            if let Some(bad) = def.colors.iter().find(|c| !c.is_valid()) {
                return Err(CatalogError::InvalidColor {
                    name: def.name.clone(),
                    symbol: bad.symbol(),
                });
            }
            if def.chips() < 2 {
                return Err(CatalogError::TooShort {
                    name: def.name.clone(),
                    chips: def.chips(),
                });
            }
            if def.chips() != chips {
                return Err(CatalogError::InconsistentLength {
                    name: def.name.clone(),
                    expected: chips,
                    found: def.chips(),
                });
            }
            if by_name
                .insert(def.name.clone(), IdentityIndex(position))
                .is_some()
            {
                return Err(CatalogError::DuplicateName {
                    name: def.name.clone(),
                });
            }
        }
        for (i, a) in definitions.iter().enumerate() {
            let a_reversed = a.reversed();
            for b in definitions.iter().skip(i + 1) {
                if a.colors == b.colors || a_reversed == b.colors {
                    return Err(CatalogError::Indistinguishable {
                        first: a.name.clone(),
                        second: b.name.clone(),
                    });
                }
            }
        }
        Ok(Catalog {
            definitions,
            chips,
            by_name,
        })
    }
    /// Shorthand for `(name, code)` pairs
    pub fn from_codes(codes: &[(&str, &str)]) -> Result<Self, CatalogError> {
        Catalog::new(
            codes
                .iter()
                .map(|(name, code)| BarcodeDefinition::new(name, code))
                .collect(),
        )
    }
    pub fn len(&self) -> usize {
        self.definitions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
    /// Number of chips of every barcode in the catalog
    pub fn chips(&self) -> usize {
        self.chips
    }
    pub fn get(&self, identity: IdentityIndex) -> Option<&BarcodeDefinition> {
        self.definitions.get(identity.0)
    }
    pub fn name(&self, identity: IdentityIndex) -> Option<&str> {
        self.get(identity).map(|def| def.name.as_str())
    }
    pub fn index_of(&self, name: &str) -> Option<IdentityIndex> {
        self.by_name.get(name).copied()
    }
    pub fn identities(&self) -> impl Iterator<Item = IdentityIndex> + '_ {
        (0..self.definitions.len()).map(IdentityIndex)
    }
    pub fn iter(&self) -> impl Iterator<Item = (IdentityIndex, &BarcodeDefinition)> {
        self.definitions
            .iter()
            .enumerate()
            .map(|(i, def)| (IdentityIndex(i), def))
    }
    pub fn definitions(&self) -> &[BarcodeDefinition] {
        &self.definitions
    }
}
