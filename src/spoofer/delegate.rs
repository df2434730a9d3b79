// src/spoofer/delegate.rs
//! Observer interface of the spoofer

use super::state::{MoveState, MoveType, SpooferState};
use crate::geo::Coordinate;

/// Receives notifications from the engine task.
///
/// Every method runs on the engine task, in order, and must return quickly.
/// `will_*` methods see the state before the change and the value about to be
/// applied; `did_*` methods see the state after it. A `None` coordinate
/// stands for a reset to the real device location.
#[allow(unused_variables)]
pub trait SpooferDelegate: Send + Sync {
    fn will_change_move_type(&self, state: &SpooferState, move_type: MoveType) {}
    fn did_change_move_type(&self, state: &SpooferState, move_type: MoveType) {}

    fn will_change_move_state(&self, state: &SpooferState, move_state: &MoveState) {}
    fn did_change_move_state(&self, state: &SpooferState, move_state: &MoveState) {}

    fn will_change_location(&self, state: &SpooferState, to: Option<Coordinate>) {}
    fn did_change_location(&self, state: &SpooferState, to: Option<Coordinate>) {}
    fn error_changing_location(&self, state: &SpooferState, to: Option<Coordinate>) {}

    fn will_pause_navigation(&self, state: &SpooferState) {}
    fn did_pause_navigation(&self, state: &SpooferState) {}
    fn will_resume_navigation(&self, state: &SpooferState) {}
    fn did_resume_navigation(&self, state: &SpooferState) {}
}
