// 🧾 Contractor bids - fan-in and comparison
//
// Bids are held by the hosting platform; here they are plain input.
// Many contractor bid sets fold into one price table per category.

use crate::error::{BidError, Result};
use crate::geo::{distance_to_project, GeoPoint};
use crate::schema::{Category, ContractorPrices, PriceTable};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

// ============================================================================
// BID ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcreteBid {
    #[serde(default)]
    pub pre_cast_option: bool,
    pub concrete_type: String,
    pub lead_time_weeks: f64,
    /// € per m³
    pub price_per_unit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightingBid {
    pub lighting_type: String,
    pub lead_time_weeks: f64,
    /// € per piece
    pub price_per_unit: f64,
}

/// Everything one contractor submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorBid {
    pub contractor_name: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub concrete: Vec<ConcreteBid>,
    #[serde(default)]
    pub lighting: Vec<LightingBid>,
}

impl ContractorBid {
    pub fn new(contractor_name: &str) -> Self {
        ContractorBid {
            contractor_name: contractor_name.to_string(),
            location: None,
            concrete: Vec::new(),
            lighting: Vec::new(),
        }
    }

    pub fn with_concrete(mut self, concrete_type: &str, price_per_unit: f64, lead_time_weeks: f64, pre_cast_option: bool) -> Self {
        self.concrete.push(ConcreteBid {
            pre_cast_option,
            concrete_type: concrete_type.to_string(),
            lead_time_weeks,
            price_per_unit,
        });
        self
    }

    pub fn with_lighting(mut self, lighting_type: &str, price_per_unit: f64, lead_time_weeks: f64) -> Self {
        self.lighting.push(LightingBid {
            lighting_type: lighting_type.to_string(),
            lead_time_weeks,
            price_per_unit,
        });
        self
    }

    pub fn distance_km(&self) -> Option<f64> {
        distance_to_project(self.location.as_ref())
    }

    /// Bid lines for one category, in entry order
    pub fn lines(&self, category: Category) -> Vec<BidLine<'_>> {
        match category {
            Category::Concrete => self
                .concrete
                .iter()
                .map(|row| BidLine {
                    contractor_name: &self.contractor_name,
                    item_type: &row.concrete_type,
                    pre_cast_option: Some(row.pre_cast_option),
                    lead_time_weeks: row.lead_time_weeks,
                    price_per_unit: row.price_per_unit,
                })
                .collect(),
            Category::Lighting => self
                .lighting
                .iter()
                .map(|row| BidLine {
                    contractor_name: &self.contractor_name,
                    item_type: &row.lighting_type,
                    pre_cast_option: None,
                    lead_time_weeks: row.lead_time_weeks,
                    price_per_unit: row.price_per_unit,
                })
                .collect(),
        }
    }
}

/// Category-agnostic view of one bid row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BidLine<'a> {
    pub contractor_name: &'a str,
    pub item_type: &'a str,
    pub pre_cast_option: Option<bool>,
    pub lead_time_weeks: f64,
    pub price_per_unit: f64,
}

pub fn parse_bids(json: &str) -> Result<Vec<ContractorBid>> {
    serde_json::from_str(json).map_err(|e| BidError::InvalidInput(format!("malformed bids: {}", e)))
}

pub fn load_bids(path: &Path) -> Result<Vec<ContractorBid>> {
    let json = fs::read_to_string(path)
        .map_err(|e| BidError::InvalidInput(format!("cannot read {}: {}", path.display(), e)))?;
    parse_bids(&json)
}

// ============================================================================
// PRICE TABLE (fan-in)
// ============================================================================

/// Item name -> {contractor -> price per unit}.
///
/// A contractor bidding twice on the same item keeps the later price.
pub fn price_table(bids: &[ContractorBid], category: Category) -> PriceTable {
    let mut table = PriceTable::new();
    for bid in bids {
        for line in bid.lines(category) {
            table
                .entry(line.item_type.to_string())
                .or_insert_with(ContractorPrices::new)
                .insert(line.contractor_name.to_string(), line.price_per_unit);
        }
    }
    table
}

// ============================================================================
// COMPARISON
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    #[serde(rename = "Contractor name")]
    pub contractor_name: String,
    #[serde(rename = "Type")]
    pub item_type: String,
    #[serde(rename = "Pre cast option")]
    pub pre_cast_option: Option<bool>,
    #[serde(rename = "Lead time (weeks)")]
    pub lead_time_weeks: f64,
    #[serde(rename = "Price per unit")]
    pub price_per_unit: f64,
    #[serde(rename = "Quantity")]
    pub quantity: f64,
    #[serde(rename = "Total price")]
    pub total_price: f64,
}

/// One row per bid line, priced against the model's quantities.
///
/// A bid on an item the model does not contain is a schema mismatch.
pub fn comparison_rows(
    bids: &[ContractorBid],
    category: Category,
    quantities: &IndexMap<String, f64>,
) -> Result<Vec<ComparisonRow>> {
    let mut rows = Vec::new();
    for bid in bids {
        for line in bid.lines(category) {
            let quantity = *quantities.get(line.item_type).ok_or_else(|| {
                BidError::schema(format!(
                    "{} bid on '{}' which is not in the {} model",
                    line.contractor_name, line.item_type, category
                ))
            })?;
            rows.push(ComparisonRow {
                contractor_name: line.contractor_name.to_string(),
                item_type: line.item_type.to_string(),
                pre_cast_option: line.pre_cast_option,
                lead_time_weeks: line.lead_time_weeks,
                price_per_unit: line.price_per_unit,
                quantity,
                total_price: quantity * line.price_per_unit,
            });
        }
    }
    Ok(rows)
}

/// Write comparison rows as CSV with a header line
pub fn write_comparison_csv<W: io::Write>(rows: &[ComparisonRow], out: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Grouped-bar data: one series per contractor, one bar per item type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonChart {
    pub title: String,
    pub x_axis_title: String,
    pub y_axis_title: String,
    pub item_types: Vec<String>,
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub contractor_name: String,
    /// Total price per item type, aligned with `item_types`; 0 where no bid
    pub totals: Vec<f64>,
}

impl ComparisonChart {
    pub fn from_rows(category: Category, rows: &[ComparisonRow]) -> Self {
        let contractors: IndexSet<&str> = rows.iter().map(|r| r.contractor_name.as_str()).collect();
        let item_types: IndexSet<&str> = rows.iter().map(|r| r.item_type.as_str()).collect();

        let mut grid: IndexMap<&str, Vec<f64>> = contractors
            .iter()
            .map(|c| (*c, vec![0.0; item_types.len()]))
            .collect();

        for row in rows {
            if let (Some(totals), Some(column)) = (
                grid.get_mut(row.contractor_name.as_str()),
                item_types.get_index_of(row.item_type.as_str()),
            ) {
                totals[column] = row.total_price;
            }
        }

        let label = category.label();
        ComparisonChart {
            title: format!("{} Prices by Contractor and Type", label),
            x_axis_title: format!("{} Type", label),
            y_axis_title: format!("{} Price", label),
            item_types: item_types.iter().map(|t| t.to_string()).collect(),
            series: grid
                .into_iter()
                .map(|(contractor, totals)| ChartSeries {
                    contractor_name: contractor.to_string(),
                    totals,
                })
                .collect(),
        }
    }
}
