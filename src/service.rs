// 🏗️ Bid service - the upstream-facing API
//
// Construct once with a store, share everywhere. Every read fetches the
// latest commit fresh; nothing is cached.

use crate::bids::{comparison_rows, price_table, ComparisonChart, ComparisonRow, ContractorBid};
use crate::error::Result;
use crate::node::Node;
use crate::prices::{write_prices, PushReceipt};
use crate::quantities::{collect_counts, collect_names, collect_quantities, collect_volumes, QuantitySummary};
use crate::schema::{Category, PriceTable, MAIN_BRANCH};
use crate::store::RemoteStore;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct BidService {
    store: Arc<dyn RemoteStore>,
}

impl BidService {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        BidService { store }
    }

    /// Branch names that carry models (everything except `main`)
    pub fn list_models(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_branches()?
            .into_iter()
            .map(|branch| branch.name)
            .filter(|name| name != MAIN_BRANCH)
            .collect())
    }

    /// Latest graph of the category's branch, narrowed to its root member
    pub fn fetch_category(&self, category: Category) -> Result<Node> {
        let latest = self.store.resolve_latest_root(category.branch_name())?;
        let graph = self.store.receive_graph(&latest.object_id)?;
        debug!(%category, commit = %latest.commit_id, nodes = graph.node_count(), "fetched category graph");
        graph.child(category.root_key())
    }

    pub fn names(&self, category: Category) -> Result<Vec<String>> {
        collect_names(&self.fetch_category(category)?)
    }

    pub fn concrete_names(&self) -> Result<Vec<String>> {
        self.names(Category::Concrete)
    }

    pub fn lighting_names(&self) -> Result<Vec<String>> {
        self.names(Category::Lighting)
    }

    pub fn concrete_volumes(&self) -> Result<IndexMap<String, f64>> {
        collect_volumes(&self.fetch_category(Category::Concrete)?)
    }

    pub fn lighting_counts(&self) -> Result<IndexMap<String, u64>> {
        collect_counts(&self.fetch_category(Category::Lighting)?)
    }

    /// Volumes for concrete, piece counts for lighting
    pub fn quantities(&self, category: Category) -> Result<IndexMap<String, f64>> {
        collect_quantities(category, &self.fetch_category(category)?)
    }

    pub fn quantity_summary(&self) -> Result<Vec<QuantitySummary>> {
        Category::ALL
            .iter()
            .map(|category| Ok(QuantitySummary::new(*category, &self.quantities(*category)?)))
            .collect()
    }

    pub fn compare(&self, bids: &[ContractorBid], category: Category) -> Result<Vec<ComparisonRow>> {
        comparison_rows(bids, category, &self.quantities(category)?)
    }

    pub fn comparison_chart(&self, bids: &[ContractorBid], category: Category) -> Result<ComparisonChart> {
        Ok(ComparisonChart::from_rows(category, &self.compare(bids, category)?))
    }

    /// Write one category's price table back as a new commit
    pub fn push_prices(&self, category: Category, prices: &PriceTable) -> Result<PushReceipt> {
        write_prices(self.store.as_ref(), category, prices)
    }

    /// Fold every contractor's bids and push concrete, then lighting
    pub fn push_all(&self, bids: &[ContractorBid]) -> Result<Vec<PushReceipt>> {
        Category::ALL
            .iter()
            .map(|category| self.push_prices(*category, &price_table(bids, *category)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BidError;
    use crate::store::MemoryStore;

    fn demo_service() -> BidService {
        BidService::new(Arc::new(MemoryStore::demo().unwrap()))
    }

    #[test]
    fn test_list_models_skips_main() {
        assert_eq!(demo_service().list_models().unwrap(), vec!["concrete", "lighting"]);
    }

    #[test]
    fn test_reads() {
        let service = demo_service();
        assert_eq!(
            service.concrete_names().unwrap(),
            vec!["C30/37", "C25/30", "C35/45 precast"]
        );
        let volumes = service.concrete_volumes().unwrap();
        assert!((volumes["C30/37"] - 224.0).abs() < 1e-9);

        let counts = service.lighting_counts().unwrap();
        assert_eq!(counts["LED panel 600x600"], 3);
        assert_eq!(counts["Emergency exit sign"], 1);
        assert_eq!(service.lighting_names().unwrap().len(), 3);
    }

    #[test]
    fn test_summary() {
        let summary = demo_service().quantity_summary().unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[1].total_label, "6 pieces");
    }

    #[test]
    fn test_push_all() {
        let service = demo_service();
        let bids = vec![ContractorBid::new("Acme")
            .with_concrete("C30/37", 95.0, 3.0, false)
            .with_concrete("C25/30", 90.0, 3.0, false)
            .with_concrete("C35/45 precast", 140.0, 5.0, true)
            .with_lighting("LED panel 600x600", 40.0, 2.0)
            .with_lighting("Downlight 12W", 15.0, 2.0)
            .with_lighting("Emergency exit sign", 30.0, 1.0)];

        let receipts = service.push_all(&bids).unwrap();
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[0].branch_name, "concrete");
        assert_eq!(receipts[0].items_priced, 4);
        assert_eq!(receipts[1].items_priced, 6);
    }

    #[test]
    fn test_push_with_missing_item_fails_before_commit() {
        let store = Arc::new(MemoryStore::demo().unwrap());
        let service = BidService::new(store.clone());
        let bids = vec![ContractorBid::new("Acme").with_lighting("Downlight 12W", 15.0, 2.0)];

        let err = service.push_all(&bids).unwrap_err();
        assert!(matches!(err, BidError::SchemaMismatch(_)));
        // concrete table is empty too, so nothing was committed anywhere
        assert_eq!(store.commits("concrete").unwrap().len(), 1);
        assert_eq!(store.commits("lighting").unwrap().len(), 1);
    }
}
