use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use artiverse_core::notification::templates;
use artiverse_core::CoreError;
use artiverse_order::{OrderManager, OrderStatus};

use crate::error::AppError;
use crate::notify;
use crate::state::AppState;

pub const SWEEP_ACTOR: &str = "order-expiry";

/// Cancel unpaid orders older than the hold window and put their stock back.
pub async fn start_order_expiry_worker(state: AppState, every: Duration) {
    info!(
        "Order expiry worker started: hold {} minutes, sweeping every {}s",
        state.gallery.order_hold_minutes,
        every.as_secs()
    );

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match expire_stale_orders(&state).await {
            Ok(0) => {}
            Ok(n) => info!("Expired {} unpaid order(s)", n),
            Err(e) => error!("Order expiry sweep failed: {}", e),
        }
    }
}

/// One sweep; returns how many orders were cancelled.
pub async fn expire_stale_orders(state: &AppState) -> Result<usize, AppError> {
    let hold = chrono::Duration::minutes(state.gallery.order_hold_minutes as i64);
    let cutoff = Utc::now() - hold;
    let stale = state.orders.stale_pending(cutoff).await?;

    let mut expired = 0;
    for mut order in stale {
        // A webhook may have settled it since the query ran.
        if order.status != OrderStatus::Pending {
            continue;
        }
        let note = Some(format!("Unpaid after {} minutes", state.gallery.order_hold_minutes));
        let change = OrderManager::transition(&mut order, OrderStatus::Cancelled, SWEEP_ACTOR, note)?;

        match state.orders.update(&order, OrderStatus::Pending, Some(&change), true).await {
            Ok(()) => {}
            Err(CoreError::Conflict(_)) => {
                debug!("Order {} changed during the sweep; skipping", order.order_number);
                continue;
            }
            Err(e) => {
                error!("Failed to expire order {}: {}", order.order_number, e);
                continue;
            }
        }
        expired += 1;

        if let Some(message) = templates::status_update(&state.gallery.name, &order) {
            notify::send_email(state, message);
        }
        notify::emit(state, notify::status_changed(&order, &change));
    }
    Ok(expired)
}
