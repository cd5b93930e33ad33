use recalc_core::EntityRef;
use serde::{Deserialize, Serialize};

/// Body of a v2 collection query.
#[derive(Debug, Deserialize)]
pub struct ItemsResponse {
    pub items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: u64,
    /// Present only when the selection asks for it.
    #[serde(default)]
    pub entity_type: Option<String>,
}

impl From<Item> for EntityRef {
    fn from(item: Item) -> Self {
        EntityRef::new(item.id, item.entity_type.unwrap_or_default())
    }
}

/// Request body shared by both bulk endpoints.
#[derive(Debug, Serialize)]
pub struct BulkRequest<'a> {
    pub targets: &'a [EntityRef],
}
