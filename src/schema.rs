// 📐 Shape Layer - the model store's wire contract
//
// Every load-bearing key lives here. If the remote schema is renamed,
// this is the only file that changes and the only place that fails.

use crate::error::{BidError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// KEYS
// ============================================================================

pub const ELEMENTS_KEY: &str = "elements";
pub const NAME_KEY: &str = "Name";
pub const VOLUME_KEY: &str = "Volume (m³)";
pub const PRICES_KEY: &str = "prices";

pub const CONCRETE_ROOT_KEY: &str = "@Concrete";
pub const LIGHTING_ROOT_KEY: &str = "@Lighting";

/// Branch every stream starts with; never a bid category
pub const MAIN_BRANCH: &str = "main";

pub const COMMIT_MESSAGE: &str = "Update from open bid";
pub const SOURCE_APPLICATION: &str = "openbid";

/// Contractor name -> price per unit
pub type ContractorPrices = BTreeMap<String, f64>;

/// Item name -> contractor prices
pub type PriceTable = BTreeMap<String, ContractorPrices>;

// ============================================================================
// CATEGORY
// ============================================================================

/// Bid domain. Each maps to one branch and one root member key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Concrete,
    Lighting,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Concrete, Category::Lighting];

    pub fn branch_name(&self) -> &'static str {
        match self {
            Category::Concrete => "concrete",
            Category::Lighting => "lighting",
        }
    }

    pub fn root_key(&self) -> &'static str {
        match self {
            Category::Concrete => CONCRETE_ROOT_KEY,
            Category::Lighting => LIGHTING_ROOT_KEY,
        }
    }

    /// Unit of the aggregated quantity
    pub fn unit(&self) -> &'static str {
        match self {
            Category::Concrete => "m³",
            Category::Lighting => "pieces",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Concrete => "Concrete",
            Category::Lighting => "Lighting",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.branch_name())
    }
}

impl FromStr for Category {
    type Err = BidError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "concrete" => Ok(Category::Concrete),
            "lighting" => Ok(Category::Lighting),
            other => Err(BidError::InvalidInput(format!(
                "unknown category '{}' (expected concrete or lighting)",
                other
            ))),
        }
    }
}

// ============================================================================
// ITEM RECORD
// ============================================================================

/// Typed view over one item entry of a category object.
///
/// Only what quantity reads need. Written members such as `prices` are
/// left unparsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub name: String,
    pub volume: Option<f64>,
}

impl ItemRecord {
    /// Validate a raw record. Only `Name` is required here.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self> {
        let name = item_name(fields)?.to_string();

        let volume = match fields.get(VOLUME_KEY) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_f64().ok_or_else(|| {
                BidError::schema(format!("item '{}': '{}' is not a number", name, VOLUME_KEY))
            })?),
        };

        Ok(ItemRecord { name, volume })
    }

    /// Volume, failing when the record does not carry one
    pub fn require_volume(&self) -> Result<f64> {
        self.volume.ok_or_else(|| {
            BidError::schema(format!("item '{}' is missing '{}'", self.name, VOLUME_KEY))
        })
    }
}

/// Borrow the `Name` of a raw record
pub fn item_name(fields: &Map<String, Value>) -> Result<&str> {
    match fields.get(NAME_KEY) {
        Some(Value::String(name)) => Ok(name),
        Some(_) => Err(BidError::schema(format!("item '{}' is not a string", NAME_KEY))),
        None => Err(BidError::schema(format!("item is missing '{}'", NAME_KEY))),
    }
}
