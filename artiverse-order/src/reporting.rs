use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Order, OrderStatus};

pub const BEST_SELLER_COUNT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue_cents: i64,
    pub orders: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BestSeller {
    pub artwork_id: Uuid,
    pub title: String,
    pub units: u64,
    pub revenue_cents: i64,
}

/// Sales figures over a window of orders
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SalesReport {
    pub since: Option<DateTime<Utc>>,
    pub order_count: u64,
    pub paid_order_count: u64,
    pub revenue_cents: i64,
    pub average_order_value_cents: i64,
    pub orders_by_status: BTreeMap<String, u64>,
    pub revenue_by_day: Vec<DailyRevenue>,
    pub best_sellers: Vec<BestSeller>,
}

impl SalesReport {
    /// Revenue counts orders whose money is captured and not returned.
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>, since: Option<DateTime<Utc>>) -> Self {
        let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
        let mut by_day: BTreeMap<NaiveDate, DailyRevenue> = BTreeMap::new();
        let mut sellers: HashMap<Uuid, BestSeller> = HashMap::new();

        for order in orders {
            if since.is_some_and(|s| order.created_at < s) {
                continue;
            }
            *by_status.entry(order.status.as_str().to_string()).or_insert(0) += 1;

            if !order.status.counts_as_revenue() {
                continue;
            }

            let date = order.created_at.date_naive();
            let day = by_day.entry(date).or_insert(DailyRevenue { date, revenue_cents: 0, orders: 0 });
            day.revenue_cents += order.total_cents;
            day.orders += 1;

            for item in &order.items {
                let seller = sellers.entry(item.artwork_id).or_insert_with(|| BestSeller {
                    artwork_id: item.artwork_id,
                    title: item.title.clone(),
                    units: 0,
                    revenue_cents: 0,
                });
                seller.units += u64::from(item.quantity);
                seller.revenue_cents += item.line_total_cents;
            }
        }

        Self::from_aggregates(since, by_status, by_day.into_values().collect(), sellers.into_values().collect())
    }

    /// Assemble a report from per-status counts, revenue days (revenue
    /// statuses only) and per-artwork sales, however they were aggregated.
    pub fn from_aggregates(
        since: Option<DateTime<Utc>>,
        orders_by_status: BTreeMap<String, u64>,
        mut revenue_by_day: Vec<DailyRevenue>,
        mut best_sellers: Vec<BestSeller>,
    ) -> Self {
        let order_count = orders_by_status.values().sum();
        let paid_order_count = OrderStatus::ALL
            .iter()
            .filter(|s| s.counts_as_revenue())
            .filter_map(|s| orders_by_status.get(s.as_str()))
            .sum::<u64>();

        revenue_by_day.sort_by_key(|d| d.date);
        let revenue_cents: i64 = revenue_by_day.iter().map(|d| d.revenue_cents).sum();
        let average_order_value_cents = if paid_order_count > 0 { revenue_cents / paid_order_count as i64 } else { 0 };

        best_sellers.sort_by(|a, b| {
            b.revenue_cents
                .cmp(&a.revenue_cents)
                .then(b.units.cmp(&a.units))
                .then(a.title.cmp(&b.title))
        });
        best_sellers.truncate(BEST_SELLER_COUNT);

        SalesReport {
            since,
            order_count,
            paid_order_count,
            revenue_cents,
            average_order_value_cents,
            orders_by_status,
            revenue_by_day,
            best_sellers,
        }
    }

    pub fn count(&self, status: OrderStatus) -> u64 {
        self.orders_by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}
