//! Shipment status transitions.
//!
//! ```text
//! PENDING ─┐
//! IN_TRANSIT ─┼─ receive ──> RECEIVED ── verify ──> COMPLETED
//! DELIVERED ─┘
//! any non-terminal ─────────── sign-off ─────────> COMPLETED
//! ```
//!
//! `CANCELLED` is a terminal state with no transition into it.
//!
//! Each transition is applied as one conditional update on the status
//! column, so two concurrent requests cannot both observe the source state.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db::shipment_store::{self, RecipientUpdate},
    error::{AppError, Result},
    models::ShipmentStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Recipient signs for the shipment on the public receive page.
    Receive,
    /// Admin confirms devices of a received shipment.
    Verify,
    /// Admin signs off directly, skipping `RECEIVED`.
    SignOff,
}

impl Transition {
    pub fn sources(self) -> &'static [ShipmentStatus] {
        match self {
            Transition::Receive => &[
                ShipmentStatus::Pending,
                ShipmentStatus::InTransit,
                ShipmentStatus::Delivered,
            ],
            Transition::Verify => &[ShipmentStatus::Received],
            Transition::SignOff => &[
                ShipmentStatus::Pending,
                ShipmentStatus::InTransit,
                ShipmentStatus::Delivered,
                ShipmentStatus::Receiving,
                ShipmentStatus::Received,
            ],
        }
    }

    pub fn target(self) -> ShipmentStatus {
        match self {
            Transition::Receive => ShipmentStatus::Received,
            Transition::Verify | Transition::SignOff => ShipmentStatus::Completed,
        }
    }

    pub fn permits(self, from: ShipmentStatus) -> bool {
        self.sources().contains(&from)
    }

    pub fn name(self) -> &'static str {
        match self {
            Transition::Receive => "receive",
            Transition::Verify => "verify",
            Transition::SignOff => "sign off",
        }
    }
}

/// Moves the shipment from one of the transition's source states to its
/// target inside the caller's transaction.
///
/// Fails with `NotFound` when the shipment does not exist and `Conflict` when
/// its current status is not a legal source.
pub async fn apply(
    conn: &mut SqliteConnection,
    shipment_id: &str,
    transition: Transition,
    recipient: &RecipientUpdate,
    at: DateTime<Utc>,
) -> Result<ShipmentStatus> {
    let changed = shipment_store::conditional_status_update(
        conn,
        shipment_id,
        transition.sources(),
        transition.target(),
        recipient,
        at,
    )
    .await
    .map_err(AppError::Database)?;

    if changed == 1 {
        return Ok(transition.target());
    }

    match shipment_store::current_status(conn, shipment_id)
        .await
        .map_err(AppError::Database)?
    {
        None => Err(AppError::NotFound("Shipment".into())),
        Some(current) => Err(AppError::Conflict(format!(
            "cannot {} a shipment with status {}",
            transition.name(),
            current
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ShipmentStatus::*;

    #[test]
    fn test_receive_sources() {
        for status in ShipmentStatus::ALL {
            let expected = matches!(status, Pending | InTransit | Delivered);
            assert_eq!(Transition::Receive.permits(status), expected, "{}", status);
        }
    }

    #[test]
    fn test_verify_requires_received() {
        for status in ShipmentStatus::ALL {
            assert_eq!(Transition::Verify.permits(status), status == Received, "{}", status);
        }
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        for transition in [Transition::Receive, Transition::Verify, Transition::SignOff] {
            assert!(!transition.permits(Completed));
            assert!(!transition.permits(Cancelled));
        }
    }

    #[test]
    fn test_no_transition_targets_cancelled_or_goes_backwards() {
        for transition in [Transition::Receive, Transition::Verify, Transition::SignOff] {
            assert_ne!(transition.target(), Cancelled);
            assert!(!transition.permits(transition.target()));
        }
    }

    #[test]
    fn test_sign_off_accepts_every_non_terminal_state() {
        for status in ShipmentStatus::ALL {
            assert_eq!(Transition::SignOff.permits(status), !status.is_terminal());
        }
    }
}
