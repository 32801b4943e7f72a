// 💶 Price Writer
//
// receive latest graph -> attach `prices` to every item -> send -> commit.
// All mutation happens in memory first, so a failure before the commit
// leaves the branch's latest commit untouched.

use crate::error::{BidError, Result};
use crate::node::Node;
use crate::schema::{item_name, Category, PriceTable, COMMIT_MESSAGE, PRICES_KEY, SOURCE_APPLICATION};
use crate::store::{NewCommit, RemoteStore};
use serde::Serialize;
use tracing::info;

/// What a successful push produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushReceipt {
    pub branch_name: String,
    pub previous_commit_id: String,
    pub object_id: String,
    pub commit_id: String,
    pub items_priced: usize,
}

/// Attach the price map for each item's name to the category object.
///
/// Overwrites any existing `prices`. An item whose name has no entry in
/// `prices` is an error and the graph must then be discarded.
pub fn apply_prices(root: &mut Node, category: Category, prices: &PriceTable) -> Result<usize> {
    root.update_child(category.root_key(), |category_root| {
        let mut priced = 0;
        category_root.for_each_list_entry_mut(|_, record| {
            let name = item_name(record)?;
            let entry = prices.get(name).ok_or_else(|| {
                BidError::schema(format!("no prices supplied for item '{}'", name))
            })?;
            let value = serde_json::to_value(entry)?;
            record.insert(PRICES_KEY.to_string(), value);
            priced += 1;
            Ok(())
        })?;
        Ok(priced)
    })
}

/// Full pipeline against a remote store
pub fn write_prices(store: &dyn RemoteStore, category: Category, prices: &PriceTable) -> Result<PushReceipt> {
    let branch_name = category.branch_name();
    let latest = store.resolve_latest_root(branch_name)?;
    let mut root = store.receive_graph(&latest.object_id)?;

    let items_priced = apply_prices(&mut root, category, prices)?;

    let object_id = store.send_graph(&root)?;
    let commit_id = store.create_commit(&NewCommit {
        branch_name: branch_name.to_string(),
        object_id: object_id.clone(),
        message: COMMIT_MESSAGE.to_string(),
        source_application: SOURCE_APPLICATION.to_string(),
    })?;

    info!(branch = branch_name, commit = %commit_id, items = items_priced, "pushed prices");

    Ok(PushReceipt {
        branch_name: branch_name.to_string(),
        previous_commit_id: latest.commit_id,
        object_id,
        commit_id,
        items_priced,
    })
}
