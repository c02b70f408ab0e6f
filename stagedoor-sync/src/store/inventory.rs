//! Inventory items

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use crate::error::SyncResult;
use crate::event_schema::InventoryAdjustmentPayload;
use crate::model::{db_timestamp, parse_db_timestamp, InventoryItem};

fn row_to_item(row: &SqliteRow) -> SyncResult<InventoryItem> {
    let updated_at: String = row.try_get("updated_at")?;
    Ok(InventoryItem {
        id: row.try_get("id")?,
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        quantity: row.try_get("quantity")?,
        updated_at: parse_db_timestamp(&updated_at)?,
    })
}

pub(crate) async fn upsert_item(conn: &mut SqliteConnection, item: &InventoryItem) -> SyncResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_items (id, sku, name, quantity, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            sku = excluded.sku,
            name = excluded.name,
            quantity = excluded.quantity,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&item.id)
    .bind(&item.sku)
    .bind(&item.name)
    .bind(item.quantity)
    .bind(db_timestamp(item.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Project a synced adjustment onto its item
///
/// The reported quantity is absolute. An item first seen through an
/// adjustment is named after its id until a name arrives.
pub(crate) async fn apply_adjustment(
    conn: &mut SqliteConnection,
    adjustment: &InventoryAdjustmentPayload,
    updated_at: DateTime<Utc>,
) -> SyncResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_items (id, sku, name, quantity, updated_at)
        VALUES (?1, ?2, COALESCE(?3, ?1), ?4, ?5)
        ON CONFLICT(id) DO UPDATE SET
            sku = COALESCE(?2, inventory_items.sku),
            name = COALESCE(?3, inventory_items.name),
            quantity = ?4,
            updated_at = ?5
        "#,
    )
    .bind(&adjustment.item_id)
    .bind(&adjustment.sku)
    .bind(&adjustment.name)
    .bind(adjustment.quantity)
    .bind(db_timestamp(updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Items ordered by id, after `cursor`, at most `limit`
pub(crate) async fn list_page(
    conn: &mut SqliteConnection,
    cursor: Option<&str>,
    limit: i64,
) -> SyncResult<Vec<InventoryItem>> {
    let rows = sqlx::query(
        r#"
        SELECT id, sku, name, quantity, updated_at FROM inventory_items
        WHERE (?1 IS NULL OR id > ?1)
        ORDER BY id ASC
        LIMIT ?2
        "#,
    )
    .bind(cursor)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(row_to_item).collect()
}
