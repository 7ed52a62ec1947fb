use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::response::{PagingState, PagingStateResponse};
use scylla::statement::unprepared::Statement;
use std::fmt::Display;
use std::ops::ControlFlow;
use std::sync::Arc;

use super::{sort_newest_first, OrderStore, StoreError};
use crate::domain::order::{Order, OrderId, OrderStatus};

const ACTIVE_PAGE_SIZE: i32 = 500;
const ACTIVE_STATUSES: [OrderStatus; 3] =
    [OrderStatus::Pending, OrderStatus::Paid, OrderStatus::Dispensing];

// ============================================================================
// ScyllaDB Order Store
// ============================================================================
//
// Table layout (one row per order):
//
//   orders(order_id text PRIMARY KEY, status text, version bigint,
//          record text, updated_at timestamp)
//
// `record` holds the JSON-encoded order; `status` and `version` are kept as
// plain columns so they can be inspected from cqlsh. `status` carries a
// secondary index so active orders are read page by page without a full
// scan. Version checks are read-then-write and rely on the per-order lock
// held by the coordinator.
//
// ============================================================================

pub struct ScyllaOrderStore {
    session: Arc<Session>,
    keyspace: String,
}

impl ScyllaOrderStore {
    /// Connect, then create the keyspace and table if missing
    pub async fn connect(node: &str, keyspace: &str) -> Result<Self, StoreError> {
        validate_keyspace(keyspace)?;

        tracing::info!(node = %node, keyspace = %keyspace, "Connecting to ScyllaDB");
        let session: Session = SessionBuilder::new()
            .known_node(node)
            .build()
            .await
            .map_err(backend)?;

        let store = Self {
            session: Arc::new(session),
            keyspace: keyspace.to_string(),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in schema_statements(&self.keyspace) {
            self.session
                .query_unpaged(statement, &[])
                .await
                .map_err(backend)?;
        }
        tracing::info!(keyspace = %self.keyspace, "Order table ready");
        Ok(())
    }

    async fn current_version(&self, order_id: &OrderId) -> Result<Option<u64>, StoreError> {
        let result = self
            .session
            .query_unpaged(
                format!("SELECT version FROM {}.orders WHERE order_id = ?", self.keyspace),
                (order_id.as_str(),),
            )
            .await
            .map_err(backend)?;

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(None),
        };

        match rows_result.maybe_first_row::<(i64,)>() {
            Ok(Some((version,))) => Ok(Some(version as u64)),
            Ok(None) => Ok(None),
            Err(e) => Err(backend(e)),
        }
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, StoreError> {
        let statement = Statement::new(orders_by_status_query(&self.keyspace))
            .with_page_size(ACTIVE_PAGE_SIZE);

        let mut orders = Vec::new();
        let mut paging_state = PagingState::start();
        loop {
            let (result, paging_response) = self
                .session
                .query_single_page(statement.clone(), (status.as_str(),), paging_state)
                .await
                .map_err(backend)?;

            if let Ok(rows_result) = result.into_rows_result() {
                for row in rows_result.rows::<(String,)>().map_err(backend)? {
                    let (record,) = row.map_err(backend)?;
                    orders.push(decode_record(&record)?);
                }
            }

            match paging_response.into_paging_control_flow() {
                ControlFlow::Continue(next) => paging_state = next,
                ControlFlow::Break(()) => break,
            }
        }
        Ok(orders)
    }

    async fn write(&self, order: &Order) -> Result<(), StoreError> {
        let row = OrderRow::encode(order)?;
        self.session
            .query_unpaged(
                format!(
                    "INSERT INTO {}.orders (order_id, status, version, record, updated_at) \
                     VALUES (?, ?, ?, ?, ?)",
                    self.keyspace
                ),
                (row.order_id, row.status, row.version, row.record, row.updated_at),
            )
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for ScyllaOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        if self.current_version(&order.order_id).await?.is_some() {
            return Err(StoreError::DuplicateOrder(order.order_id.clone()));
        }
        self.write(order).await?;

        tracing::debug!(order_id = %order.order_id, "Inserted order row");
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        let result = self
            .session
            .query_unpaged(
                format!("SELECT record FROM {}.orders WHERE order_id = ?", self.keyspace),
                (order_id.as_str(),),
            )
            .await
            .map_err(backend)?;

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(None),
        };

        match rows_result.maybe_first_row::<(String,)>() {
            Ok(Some((record,))) => Ok(Some(decode_record(&record)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(backend(e)),
        }
    }

    async fn save(&self, order: &Order, expected_version: u64) -> Result<(), StoreError> {
        let actual = self
            .current_version(&order.order_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(order.order_id.clone()))?;

        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                order_id: order.order_id.clone(),
                expected: expected_version,
                actual,
            });
        }

        self.write(order).await?;

        tracing::debug!(
            order_id = %order.order_id,
            version = order.version,
            status = %order.status,
            "Saved order row"
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let result = self
            .session
            .query_unpaged(format!("SELECT record FROM {}.orders", self.keyspace), &[])
            .await
            .map_err(backend)?;

        let mut orders = Vec::new();
        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(orders),
        };

        for row in rows_result.rows::<(String,)>().map_err(backend)? {
            let (record,) = row.map_err(backend)?;
            orders.push(decode_record(&record)?);
        }

        sort_newest_first(&mut orders);
        Ok(orders)
    }

    async fn list_active(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders = Vec::new();
        for status in ACTIVE_STATUSES {
            orders.extend(self.list_by_status(status).await?);
        }

        tracing::debug!(count = orders.len(), "Loaded active orders");
        sort_newest_first(&mut orders);
        Ok(orders)
    }

    fn backend_name(&self) -> &'static str {
        "scylla"
    }
}

// ============================================================================
// Row Encoding
// ============================================================================

#[derive(Debug)]
struct OrderRow {
    order_id: String,
    status: String,
    version: i64,
    record: String,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn encode(order: &Order) -> Result<Self, StoreError> {
        Ok(Self {
            order_id: order.order_id.to_string(),
            status: order.status.as_str().to_string(),
            version: i64::try_from(order.version)
                .map_err(|_| StoreError::Serialization(format!("version {} out of range", order.version)))?,
            record: serde_json::to_string(order)?,
            updated_at: order.updated_at,
        })
    }
}

fn decode_record(record: &str) -> Result<Order, StoreError> {
    Ok(serde_json::from_str(record)?)
}

fn orders_by_status_query(keyspace: &str) -> String {
    format!("SELECT record FROM {}.orders WHERE status = ?", keyspace)
}

fn schema_statements(keyspace: &str) -> [String; 3] {
    [
        format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
             {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
            keyspace
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.orders (\
             order_id text PRIMARY KEY, \
             status text, \
             version bigint, \
             record text, \
             updated_at timestamp)",
            keyspace
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS orders_status_idx ON {}.orders (status)",
            keyspace
        ),
    ]
}

/// Keyspace names are spliced into CQL, so only identifiers are accepted
fn validate_keyspace(keyspace: &str) -> Result<(), StoreError> {
    let valid = !keyspace.is_empty()
        && keyspace.len() <= 48
        && keyspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && keyspace.chars().next().is_some_and(|c| c.is_ascii_alphabetic());

    if valid {
        Ok(())
    } else {
        Err(StoreError::Backend(format!("invalid keyspace name '{}'", keyspace)))
    }
}

fn backend(err: impl Display) -> StoreError {
    StoreError::Backend(err.to_string())
}
