// src/spoofer/state.rs
//! Spoofer state and the movement step computation

use crate::geo::{self, Coordinate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveType {
    #[default]
    Walk,
    Cycle,
    Car,
}

impl MoveType {
    pub const ALL: [MoveType; 3] = [MoveType::Walk, MoveType::Cycle, MoveType::Car];

    /// Speed in meters per second
    pub fn speed(self) -> f64 {
        match self {
            MoveType::Walk => 1.39,   // 5 km/h
            MoveType::Cycle => 4.167, // 15 km/h
            MoveType::Car => 11.112,  // 40 km/h
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MoveType::Walk => "walk",
            MoveType::Cycle => "cycle",
            MoveType::Car => "car",
        }
    }
}

impl fmt::Display for MoveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "walk" => Ok(MoveType::Walk),
            "cycle" => Ok(MoveType::Cycle),
            "car" | "drive" => Ok(MoveType::Car),
            other => Err(format!("unknown move type '{}' (expected walk, cycle or car)", other)),
        }
    }
}

/// How the position moves on its own.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "route", rename_all = "lowercase")]
pub enum MoveState {
    /// Only explicit steps and teleports.
    #[default]
    Manual,
    /// Continuous movement along the heading.
    Auto,
    /// Continuous movement consuming the remaining waypoints front to back.
    Navigation(VecDeque<Coordinate>),
}

impl MoveState {
    pub fn is_manual(&self) -> bool {
        matches!(self, MoveState::Manual)
    }

    /// True for the states that run the movement loop.
    pub fn is_moving(&self) -> bool {
        !self.is_manual()
    }

    pub fn route(&self) -> Option<&VecDeque<Coordinate>> {
        match self {
            MoveState::Navigation(route) => Some(route),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MoveState::Manual => "manual",
            MoveState::Auto => "auto",
            MoveState::Navigation(_) => "navigation",
        }
    }
}

/// Everything observers can see about a spoofer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpooferState {
    pub current_location: Option<Coordinate>,
    /// Degrees in `[0, 360)`, 0 is north.
    pub heading: f64,
    pub move_state: MoveState,
    pub move_type: MoveType,
    /// Meters per second. Follows `move_type` unless overridden.
    pub speed: f64,
    /// Meters travelled since the last successful reset.
    pub total_distance: f64,
    /// Commits handed to the device that have not completed yet.
    pub pending_tasks: usize,
    pub navigation_paused: bool,
    /// Time of the last successful commit.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Result of planning one movement step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPlan {
    pub target: Coordinate,
    /// The step consumed the last waypoint of the route.
    pub route_finished: bool,
}

impl SpooferState {
    pub fn new(move_type: MoveType) -> Self {
        Self {
            current_location: None,
            heading: 0.0,
            move_state: MoveState::Manual,
            move_type,
            speed: move_type.speed(),
            total_distance: 0.0,
            pending_tasks: 0,
            navigation_paused: false,
            updated_at: None,
        }
    }

    pub fn has_pending_task(&self) -> bool {
        self.pending_tasks > 0
    }

    pub fn route(&self) -> Option<&VecDeque<Coordinate>> {
        self.move_state.route()
    }

    /// Next position after moving `distance` meters. Consumes the front
    /// waypoint when the step would reach or pass it.
    ///
    /// Returns `None` without a current location.
    pub fn plan_step(&mut self, distance: f64) -> Option<StepPlan> {
        let current = self.current_location?;

        if let MoveState::Navigation(route) = &mut self.move_state {
            if let Some(&waypoint) = route.front() {
                let candidate = geo::destination(current, geo::bearing(current, waypoint), distance);
                if current == waypoint || geo::distance(candidate, waypoint) <= distance {
                    route.pop_front();
                    return Some(StepPlan {
                        target: waypoint,
                        route_finished: route.is_empty(),
                    });
                }
                return Some(StepPlan {
                    target: candidate,
                    route_finished: false,
                });
            }
        }

        Some(StepPlan {
            target: geo::destination(current, self.heading, distance),
            route_finished: false,
        })
    }

    /// Apply a successful commit to `target`; `None` is a reset.
    pub fn apply_commit(&mut self, target: Option<Coordinate>) {
        match target {
            Some(coordinate) => {
                if let Some(previous) = self.current_location {
                    self.total_distance += geo::distance(previous, coordinate);
                }
                self.current_location = Some(coordinate);
            }
            None => {
                self.current_location = None;
                self.total_distance = 0.0;
            }
        }
        self.updated_at = Some(Utc::now());
    }
}

impl Default for SpooferState {
    fn default() -> Self {
        Self::new(MoveType::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn navigating(from: Coordinate, route: &[Coordinate]) -> SpooferState {
        let mut state = SpooferState::new(MoveType::Walk);
        state.current_location = Some(from);
        state.move_state = MoveState::Navigation(route.iter().copied().collect());
        state
    }

    #[test]
    fn test_move_type_speeds() {
        assert_eq!(MoveType::Walk.speed(), 1.39);
        assert_eq!(MoveType::Cycle.speed(), 4.167);
        assert_eq!(MoveType::Car.speed(), 11.112);
    }

    #[test]
    fn test_move_type_parse() {
        assert_eq!("walk".parse::<MoveType>(), Ok(MoveType::Walk));
        assert_eq!(" Cycle ".parse::<MoveType>(), Ok(MoveType::Cycle));
        assert_eq!("drive".parse::<MoveType>(), Ok(MoveType::Car));
        assert!("fly".parse::<MoveType>().is_err());
        for move_type in MoveType::ALL {
            assert_eq!(move_type.to_string().parse::<MoveType>(), Ok(move_type));
        }
    }

    #[test]
    fn test_no_location_no_step() {
        let mut state = SpooferState::default();
        assert!(state.plan_step(10.0).is_none());
    }

    #[test]
    fn test_free_step_follows_heading() {
        let mut state = SpooferState::default();
        state.current_location = Some(Coordinate::new(0.0, 0.0));
        state.heading = 90.0;

        let plan = state.plan_step(1.39).unwrap();
        assert!(plan.target.longitude > 0.0);
        assert!(plan.target.latitude.abs() < 1e-12);
        assert!(!plan.route_finished);
    }

    #[test]
    fn test_route_consumed_in_order() {
        let start = Coordinate::new(48.0, 11.0);
        let w1 = start.destination(0.0, 10.0);
        let w2 = w1.destination(90.0, 10.0);
        let w3 = w2.destination(180.0, 10.0);
        let mut state = navigating(start, &[w1, w2, w3]);

        let mut reached = Vec::new();
        for _ in 0..100 {
            let plan = state.plan_step(3.0).unwrap();
            state.apply_commit(Some(plan.target));
            if [w1, w2, w3].contains(&plan.target) {
                reached.push(plan.target);
            }
            if plan.route_finished {
                assert_eq!(plan.target, w3);
                break;
            }
            assert!(!state.route().unwrap().is_empty());
        }

        assert_eq!(reached, vec![w1, w2, w3]);
        assert!(state.route().unwrap().is_empty());
    }

    #[test]
    fn test_route_starting_at_current_location() {
        let w1 = Coordinate::new(48.0, 11.0);
        let w2 = w1.destination(90.0, 10.0);
        let w3 = w2.destination(0.0, 10.0);
        let mut state = navigating(w1, &[w1, w2, w3]);

        let plan = state.plan_step(3.0).unwrap();
        assert_eq!(plan.target, w1);
        assert!(!plan.route_finished);
        assert_eq!(state.route().unwrap().front(), Some(&w2));

        state.apply_commit(Some(plan.target));
        let plan = state.plan_step(3.0).unwrap();
        assert_ne!(plan.target, w2);
        assert!((w1.distance_to(&plan.target) - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_step_longer_than_leg_snaps() {
        let start = Coordinate::new(0.0, 0.0);
        let waypoint = start.destination(45.0, 5.0);
        let mut state = navigating(start, &[waypoint]);

        let plan = state.plan_step(50.0).unwrap();
        assert_eq!(plan.target, waypoint);
        assert!(plan.route_finished);
    }

    #[test]
    fn test_commit_accumulates_distance() {
        let mut state = SpooferState::default();
        let a = Coordinate::new(0.0, 0.0);
        let b = a.destination(0.0, 500.0);

        state.apply_commit(Some(a));
        assert_eq!(state.total_distance, 0.0);
        state.apply_commit(Some(b));
        assert!((state.total_distance - 500.0).abs() < 1e-6);
        assert!(state.updated_at.is_some());

        state.apply_commit(None);
        assert_eq!(state.total_distance, 0.0);
        assert!(state.current_location.is_none());
    }

    #[test]
    fn test_move_state_serialization() {
        let json = serde_json::to_string(&MoveState::Auto).unwrap();
        assert_eq!(json, r#"{"mode":"auto"}"#);

        let route = MoveState::Navigation(VecDeque::from(vec![Coordinate::new(1.0, 2.0)]));
        let json = serde_json::to_string(&route).unwrap();
        assert_eq!(
            json,
            r#"{"mode":"navigation","route":[{"latitude":1.0,"longitude":2.0}]}"#
        );
        assert_eq!(serde_json::from_str::<MoveState>(&json).unwrap(), route);
    }
}
