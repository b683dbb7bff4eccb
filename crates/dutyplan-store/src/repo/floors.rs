//! Floor repository.

use dutyplan_core::FloorId;

use crate::model::FloorRow;
use crate::{DbPool, StoreError};

#[derive(Clone)]
pub struct FloorRepository {
    pool: DbPool,
}

impl FloorRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// All floors in display order.
    pub async fn list(&self) -> Result<Vec<FloorRow>, StoreError> {
        sqlx::query_as::<_, FloorRow>(
            "SELECT id, name, required_per_break, order_index FROM floors ORDER BY order_index, name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Query)
    }

    pub async fn insert(
        &self,
        name: &str,
        required_per_break: u32,
        order_index: i64,
    ) -> Result<FloorId, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO floors (name, required_per_break, order_index) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(i64::from(required_per_break))
        .bind(order_index)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::Query)?;
        Ok(row.0)
    }
}
