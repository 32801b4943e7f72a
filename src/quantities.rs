// 📏 Quantity Extractor
//
// Reads a category object (`@Concrete` / `@Lighting`) and aggregates its
// item records. Every list-valued member is scanned; every entry is an item.

use crate::error::Result;
use crate::node::Node;
use crate::schema::{item_name, Category, ItemRecord};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::warn;

/// Distinct item names, in order of first appearance
pub fn collect_names(category_root: &Node) -> Result<Vec<String>> {
    let mut names = IndexSet::new();
    category_root.for_each_list_entry(|_, record| {
        names.insert(item_name(record)?.to_string());
        Ok(())
    })?;
    Ok(names.into_iter().collect())
}

/// Name -> summed `Volume (m³)`
///
/// Records sharing a name are summed. Duplicates are logged since names
/// are expected to be unique within a category.
pub fn collect_volumes(category_root: &Node) -> Result<IndexMap<String, f64>> {
    let mut volumes: IndexMap<String, f64> = IndexMap::new();
    category_root.for_each_list_entry(|list, record| {
        let item = ItemRecord::from_fields(record)?;
        let volume = item.require_volume()?;
        if volumes.contains_key(&item.name) {
            warn!(item = %item.name, list, "duplicate item name, summing volumes");
        }
        *volumes.entry(item.name).or_insert(0.0) += volume;
        Ok(())
    })?;
    Ok(volumes)
}

/// Name -> number of records (one piece per record)
pub fn collect_counts(category_root: &Node) -> Result<IndexMap<String, u64>> {
    let mut counts: IndexMap<String, u64> = IndexMap::new();
    category_root.for_each_list_entry(|_, record| {
        *counts.entry(item_name(record)?.to_string()).or_insert(0) += 1;
        Ok(())
    })?;
    Ok(counts)
}

/// Category quantities in a common shape: volumes for concrete, counts for lighting
pub fn collect_quantities(category: Category, category_root: &Node) -> Result<IndexMap<String, f64>> {
    match category {
        Category::Concrete => collect_volumes(category_root),
        Category::Lighting => Ok(collect_counts(category_root)?
            .into_iter()
            .map(|(name, count)| (name, count as f64))
            .collect()),
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantityLine {
    pub name: String,
    pub quantity: f64,
    pub label: String,
}

/// Per-category total plus one line per item, for dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantitySummary {
    pub category: Category,
    pub unit: String,
    pub total: f64,
    pub total_label: String,
    pub lines: Vec<QuantityLine>,
}

impl QuantitySummary {
    pub fn new(category: Category, quantities: &IndexMap<String, f64>) -> Self {
        let unit = category.unit();
        let total: f64 = quantities.values().sum();
        let lines = quantities
            .iter()
            .map(|(name, quantity)| QuantityLine {
                name: name.clone(),
                quantity: *quantity,
                label: format!("{:.0} {}", quantity, unit),
            })
            .collect();

        QuantitySummary {
            category,
            unit: unit.to_string(),
            total,
            total_label: format!("{:.0} {}", total, unit),
            lines,
        }
    }
}
