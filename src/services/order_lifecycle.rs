use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use strum::{Display, EnumString};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::order::{Column as OrderColumn, Entity as OrderEntity, Model as OrderModel},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Order lifecycle states. `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Processing,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

/// Signals that drive the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum OrderSignal {
    PaymentConfirmed,
    PaymentFailed,
    Fulfilled,
}

/// Outcome of applying a signal to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(OrderStatus),
    /// Re-applying a signal the order has already absorbed (a fulfillment
    /// retry on a delivered order) is not an error.
    NoOp,
}

/// The transition table. Everything not listed here is rejected;
/// cancelled orders are never revived.
pub fn next_status(from: OrderStatus, signal: OrderSignal) -> Result<Transition, ServiceError> {
    use OrderSignal::*;
    use OrderStatus::*;

    match (from, signal) {
        (Placed, PaymentConfirmed) => Ok(Transition::To(Processing)),
        (Placed, PaymentFailed) => Ok(Transition::To(Cancelled)),
        (Processing, PaymentFailed) => Ok(Transition::To(Cancelled)),
        (Placed, Fulfilled) | (Processing, Fulfilled) => Ok(Transition::To(Delivered)),
        (Delivered, Fulfilled) => Ok(Transition::NoOp),
        _ => Err(ServiceError::IllegalTransition(format!(
            "cannot apply '{}' to an order in status '{}'",
            signal, from
        ))),
    }
}

/// Applies lifecycle signals to stored orders under an optimistic guard.
#[derive(Clone)]
pub struct OrderLifecycleService {
    db: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl OrderLifecycleService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Transitions `order_id` according to the table above.
    ///
    /// The update is guarded by `WHERE status = <expected-from>` so two
    /// concurrent attempts cannot both commit from a stale read; the loser
    /// sees zero affected rows and gets a conflict to re-read on.
    #[instrument(skip(self), fields(order_id = %order_id, signal = %signal))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        signal: OrderSignal,
    ) -> Result<OrderModel, ServiceError> {
        let db = &*self.db;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let from = parse_status(&order.status)?;
        let to = match next_status(from, signal)? {
            Transition::NoOp => {
                info!(%order_id, status = %from, "signal is a no-op for current status");
                return Ok(order);
            }
            Transition::To(to) => to,
        };

        let updated =
            apply_guarded_transition(db, order_id, from, to).await?.ok_or_else(|| {
                warn!(%order_id, %from, %to, "lost transition race");
                ServiceError::Conflict(format!(
                    "order {} was modified concurrently; expected status '{}'",
                    order_id, from
                ))
            })?;

        info!(%order_id, old_status = %from, new_status = %to, "order status updated");

        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::OrderStatusChanged {
                    order_id,
                    old_status: from.to_string(),
                    new_status: to.to_string(),
                })
                .await;
        }

        Ok(updated)
    }
}

pub(crate) fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw)
        .map_err(|_| ServiceError::InternalError(format!("unknown order status '{}'", raw)))
}

/// Guarded status update shared with the fulfillment transaction. Returns
/// the refreshed order, or `None` when the guard did not match.
pub(crate) async fn apply_guarded_transition<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<Option<OrderModel>, ServiceError> {
    let result = OrderEntity::update_many()
        .col_expr(OrderColumn::Status, Expr::value(to.to_string()))
        .col_expr(OrderColumn::UpdatedAt, Expr::value(Utc::now()))
        .col_expr(
            OrderColumn::Version,
            Expr::col(OrderColumn::Version).add(1),
        )
        .filter(OrderColumn::Id.eq(order_id))
        .filter(OrderColumn::Status.eq(from.to_string()))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Ok(None);
    }

    let refreshed = OrderEntity::find_by_id(order_id).one(conn).await?;
    Ok(refreshed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn payment_confirmation_moves_placed_to_processing() {
        assert_matches!(
            next_status(OrderStatus::Placed, OrderSignal::PaymentConfirmed),
            Ok(Transition::To(OrderStatus::Processing))
        );
    }

    #[test]
    fn payment_failure_cancels_placed_and_processing() {
        assert_matches!(
            next_status(OrderStatus::Placed, OrderSignal::PaymentFailed),
            Ok(Transition::To(OrderStatus::Cancelled))
        );
        assert_matches!(
            next_status(OrderStatus::Processing, OrderSignal::PaymentFailed),
            Ok(Transition::To(OrderStatus::Cancelled))
        );
    }

    #[test]
    fn fulfillment_delivers_from_placed_or_processing() {
        assert_matches!(
            next_status(OrderStatus::Placed, OrderSignal::Fulfilled),
            Ok(Transition::To(OrderStatus::Delivered))
        );
        assert_matches!(
            next_status(OrderStatus::Processing, OrderSignal::Fulfilled),
            Ok(Transition::To(OrderStatus::Delivered))
        );
    }

    #[test]
    fn refulfilling_a_delivered_order_is_a_noop() {
        assert_matches!(
            next_status(OrderStatus::Delivered, OrderSignal::Fulfilled),
            Ok(Transition::NoOp)
        );
    }

    #[test]
    fn cancelled_orders_are_never_revived() {
        for signal in [
            OrderSignal::PaymentConfirmed,
            OrderSignal::PaymentFailed,
            OrderSignal::Fulfilled,
        ] {
            assert_matches!(
                next_status(OrderStatus::Cancelled, signal),
                Err(ServiceError::IllegalTransition(_))
            );
        }
    }

    #[test]
    fn all_unlisted_pairs_are_rejected() {
        // Exhaustive over the rest of the (from, signal) grid.
        assert_matches!(
            next_status(OrderStatus::Processing, OrderSignal::PaymentConfirmed),
            Err(ServiceError::IllegalTransition(_))
        );
        assert_matches!(
            next_status(OrderStatus::Delivered, OrderSignal::PaymentConfirmed),
            Err(ServiceError::IllegalTransition(_))
        );
        assert_matches!(
            next_status(OrderStatus::Delivered, OrderSignal::PaymentFailed),
            Err(ServiceError::IllegalTransition(_))
        );
    }

    #[test]
    fn status_round_trips_through_storage_representation() {
        for status in [
            OrderStatus::Placed,
            OrderStatus::Processing,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(parse_status(&status.to_string()).unwrap(), status);
        }
        assert!(parse_status("shipped").is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Placed.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
    }
}
