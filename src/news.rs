use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::docstore::Db;
use crate::errors::StoreError;

pub const NEWS: &str = "news";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Milliseconds since the epoch.
    pub published_at: i64,
}

pub fn publish(
    db: &Db,
    title: &str,
    body: &str,
    image_url: Option<&str>,
) -> Result<NewsItem, StoreError> {
    let published_at = Utc::now().timestamp_millis();
    let mut item = NewsItem {
        id: format!("n{published_at}"),
        title: title.trim().to_string(),
        body: body.to_string(),
        image_url: image_url.map(|s| s.to_string()).filter(|s| !s.is_empty()),
        published_at,
    };
    // Same-millisecond publishes get a suffix instead of overwriting.
    let mut seq = 1;
    while db.get(&format!("{NEWS}/{}", item.id))?.is_some() {
        item.id = format!("n{published_at}-{seq}");
        seq += 1;
    }
    db.set(&format!("{NEWS}/{}", item.id), &item, false)?;
    tracing::info!(id = %item.id, title = %item.title, "news published");
    Ok(item)
}

pub fn delete(db: &Db, id: &str) -> Result<(), StoreError> {
    db.delete(&format!("{NEWS}/{id}"))
}

pub fn latest(db: &Db, limit: usize) -> Result<Vec<NewsItem>, StoreError> {
    let mut items: Vec<NewsItem> = db
        .list(NEWS)?
        .into_iter()
        .filter_map(|doc| {
            let mut item: NewsItem = doc.decode().ok()?;
            item.id = doc.id;
            Some(item)
        })
        .collect();
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(b.id.cmp(&a.id)));
    items.truncate(limit);
    Ok(items)
}
