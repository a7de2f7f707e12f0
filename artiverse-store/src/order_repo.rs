use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use artiverse_catalog::Page;
use artiverse_core::repository::{OrderFilter, OrderRepository};
use artiverse_core::{CoreError, CoreResult};
use artiverse_order::reporting::BEST_SELLER_COUNT;
use artiverse_order::{
    Address, BestSeller, CustomerInfo, DailyRevenue, Order, OrderChange, OrderItem, OrderStatus, PaymentStatus, SalesReport,
};

use crate::db_err;

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach items to a batch of order rows, preserving row order.
    async fn hydrate(&self, rows: Vec<OrderRow>) -> CoreResult<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, artwork_id, title, artist_name, unit_price_cents, quantity, line_total_cents \
             FROM order_items WHERE order_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            items.entry(row.order_id).or_default().push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let order_items = items.remove(&row.id).unwrap_or_default();
                row.into_order(order_items)
            })
            .collect()
    }

    async fn hydrate_one(&self, row: Option<OrderRow>) -> CoreResult<Option<Order>> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

const ORDER_COLUMNS: &str = "id, order_number, user_id, customer_name, customer_email, customer_phone, \
     ship_line1, ship_line2, ship_city, ship_region, ship_postal_code, ship_country, \
     subtotal_cents, discount_cents, shipping_cents, tax_cents, total_cents, currency, \
     status, payment_status, payment_reference, notes, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Option<Uuid>,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    ship_line1: String,
    ship_line2: Option<String>,
    ship_city: String,
    ship_region: Option<String>,
    ship_postal_code: String,
    ship_country: String,
    subtotal_cents: i64,
    discount_cents: i64,
    shipping_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    currency: String,
    status: String,
    payment_status: String,
    payment_reference: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> CoreResult<Order> {
        let status = OrderStatus::parse(&self.status)
            .ok_or_else(|| CoreError::Storage(format!("order {} has unknown status {}", self.id, self.status)))?;
        let payment_status = PaymentStatus::parse(&self.payment_status).ok_or_else(|| {
            CoreError::Storage(format!("order {} has unknown payment status {}", self.id, self.payment_status))
        })?;

        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            customer: CustomerInfo { name: self.customer_name, email: self.customer_email, phone: self.customer_phone },
            shipping_address: Address {
                line1: self.ship_line1,
                line2: self.ship_line2,
                city: self.ship_city,
                region: self.ship_region,
                postal_code: self.ship_postal_code,
                country: self.ship_country,
            },
            items,
            subtotal_cents: self.subtotal_cents,
            discount_cents: self.discount_cents,
            shipping_cents: self.shipping_cents,
            tax_cents: self.tax_cents,
            total_cents: self.total_cents,
            currency: self.currency,
            status,
            payment_status,
            payment_reference: self.payment_reference,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    artwork_id: Uuid,
    title: String,
    artist_name: Option<String>,
    unit_price_cents: i64,
    quantity: i32,
    line_total_cents: i64,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            artwork_id: row.artwork_id,
            title: row.title,
            artist_name: row.artist_name,
            unit_price_cents: row.unit_price_cents,
            quantity: row.quantity.max(0) as u32,
            line_total_cents: row.line_total_cents,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderChangeRow {
    id: Uuid,
    order_id: Uuid,
    from_status: String,
    to_status: String,
    actor: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderChangeRow> for OrderChange {
    type Error = CoreError;

    fn try_from(row: OrderChangeRow) -> Result<Self, Self::Error> {
        let parse = |s: &str| {
            OrderStatus::parse(s).ok_or_else(|| CoreError::Storage(format!("order change {} has unknown status {}", row.id, s)))
        };
        Ok(OrderChange {
            id: row.id,
            order_id: row.order_id,
            from_status: parse(&row.from_status)?,
            to_status: parse(&row.to_status)?,
            actor: row.actor.clone(),
            note: row.note.clone(),
            created_at: row.created_at,
        })
    }
}

async fn insert_change(tx: &mut Transaction<'_, Postgres>, change: &OrderChange) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO order_changes (id, order_id, from_status, to_status, actor, note, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(change.id)
    .bind(change.order_id)
    .bind(change.from_status.as_str())
    .bind(change.to_status.as_str())
    .bind(&change.actor)
    .bind(&change.note)
    .bind(change.created_at)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create(&self, order: &Order) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Guarded decrement; zero rows means the line cannot be covered and the
        // transaction is dropped, rolling back earlier lines.
        for (artwork_id, quantity) in order.stock_lines() {
            let result = sqlx::query(
                "UPDATE artworks SET stock = stock - $1, updated_at = NOW() WHERE id = $2 AND stock >= $1",
            )
            .bind(quantity)
            .bind(artwork_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            if result.rows_affected() == 0 {
                return Err(CoreError::InsufficientStock { artwork_id });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, customer_name, customer_email, customer_phone,
                                ship_line1, ship_line2, ship_city, ship_region, ship_postal_code, ship_country,
                                subtotal_cents, discount_cents, shipping_cents, tax_cents, total_cents, currency,
                                status, payment_status, payment_reference, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)
            "#,
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.user_id)
        .bind(&order.customer.name)
        .bind(&order.customer.email)
        .bind(&order.customer.phone)
        .bind(&order.shipping_address.line1)
        .bind(&order.shipping_address.line2)
        .bind(&order.shipping_address.city)
        .bind(&order.shipping_address.region)
        .bind(&order.shipping_address.postal_code)
        .bind(&order.shipping_address.country)
        .bind(order.subtotal_cents)
        .bind(order.discount_cents)
        .bind(order.shipping_cents)
        .bind(order.tax_cents)
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.payment_reference)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, artwork_id, title, artist_name, unit_price_cents, quantity, line_total_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.artwork_id)
            .bind(&item.title)
            .bind(&item.artist_name)
            .bind(item.unit_price_cents)
            .bind(item.quantity as i32)
            .bind(item.line_total_cents)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        self.hydrate_one(row).await
    }

    async fn get_by_number(&self, order_number: &str) -> CoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE UPPER(order_number) = $1",
            ORDER_COLUMNS
        ))
        .bind(order_number.trim().to_ascii_uppercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        self.hydrate_one(row).await
    }

    async fn update(
        &self,
        order: &Order,
        expected: OrderStatus,
        change: Option<&OrderChange>,
        restock: bool,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Compare-and-set on the status the caller loaded.
        let result = sqlx::query(
            "UPDATE orders SET status = $2, payment_status = $3, payment_reference = $4, notes = $5, updated_at = $6 \
             WHERE id = $1 AND status = $7",
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.payment_reference)
        .bind(&order.notes)
        .bind(order.updated_at)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let current: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                .bind(order.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            return Err(match current {
                Some(status) => CoreError::Conflict(format!(
                    "order {} is {}, not {}",
                    order.order_number,
                    status,
                    expected.as_str()
                )),
                None => CoreError::NotFound(format!("order {}", order.id)),
            });
        }

        if let Some(change) = change {
            insert_change(&mut tx, change).await?;
        }

        if restock {
            for (artwork_id, quantity) in order.stock_lines() {
                // Deleted artworks simply have nothing to restock.
                sqlx::query("UPDATE artworks SET stock = stock + $1, updated_at = NOW() WHERE id = $2")
                    .bind(quantity)
                    .bind(artwork_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn list(&self, filter: &OrderFilter) -> CoreResult<Page<Order>> {
        let status = filter.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE ($1::TEXT IS NULL OR status = $1) AND ($2::UUID IS NULL OR user_id = $2)",
        )
        .bind(status)
        .bind(filter.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE ($1::TEXT IS NULL OR status = $1) AND ($2::UUID IS NULL OR user_id = $2) \
             ORDER BY created_at DESC, id LIMIT $3 OFFSET $4",
            ORDER_COLUMNS
        ))
        .bind(status)
        .bind(filter.user_id)
        .bind(i64::from(filter.per_page()))
        .bind(filter.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Page::new(self.hydrate(rows).await?, total as u64, filter.page(), filter.per_page()))
    }

    async fn sales_report(&self, since: DateTime<Utc>) -> CoreResult<SalesReport> {
        let revenue_statuses: Vec<String> = OrderStatus::ALL
            .iter()
            .filter(|s| s.counts_as_revenue())
            .map(|s| s.as_str().to_string())
            .collect();

        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM orders WHERE created_at >= $1 GROUP BY status")
                .bind(since)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        let days: Vec<(NaiveDate, i64, i64)> = sqlx::query_as(
            "SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day, SUM(total_cents)::BIGINT, COUNT(*) \
             FROM orders WHERE created_at >= $1 AND status = ANY($2) GROUP BY day ORDER BY day",
        )
        .bind(since)
        .bind(&revenue_statuses)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let sellers: Vec<(Uuid, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT i.artwork_id, MIN(i.title) AS title, SUM(i.quantity)::BIGINT AS units,
                   SUM(i.line_total_cents)::BIGINT AS revenue
            FROM order_items i JOIN orders o ON o.id = i.order_id
            WHERE o.created_at >= $1 AND o.status = ANY($2)
            GROUP BY i.artwork_id
            ORDER BY revenue DESC, units DESC, title ASC
            LIMIT $3
            "#,
        )
        .bind(since)
        .bind(&revenue_statuses)
        .bind(BEST_SELLER_COUNT as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(SalesReport::from_aggregates(
            Some(since),
            by_status.into_iter().map(|(status, n)| (status, n.max(0) as u64)).collect(),
            days.into_iter()
                .map(|(date, revenue_cents, orders)| DailyRevenue { date, revenue_cents, orders: orders.max(0) as u64 })
                .collect(),
            sellers
                .into_iter()
                .map(|(artwork_id, title, units, revenue_cents)| BestSeller {
                    artwork_id,
                    title,
                    units: units.max(0) as u64,
                    revenue_cents,
                })
                .collect(),
        ))
    }

    async fn history(&self, order_id: Uuid) -> CoreResult<Vec<OrderChange>> {
        let rows = sqlx::query_as::<_, OrderChangeRow>(
            "SELECT id, order_id, from_status, to_status, actor, note, created_at FROM order_changes \
             WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(OrderChange::try_from).collect()
    }

    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE status = 'PENDING' AND created_at < $1 ORDER BY created_at ASC",
            ORDER_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        self.hydrate(rows).await
    }
}
