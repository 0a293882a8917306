// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Obstacle-avoiding arrow routing.
//!
//! Strategies are tried in a fixed order and the first clear path wins.
//! The last one forces an H-V-H path without checking it, so routing
//! always terminates with a result.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use super::config::LayoutConfig;
use super::geometry::{BoundingBox, Position, path_is_clear};
use crate::common::LayoutDegradation;
use crate::model::{Connection, Point, Variable};

/// Intermediate points of an arrow; never more than two.
pub type Waypoints = SmallVec<[Point; 2]>;

/// The routing pattern that produced a path, in the order tried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RouteStrategy {
    Straight,
    /// horizontal, vertical, horizontal through the midpoint x
    Hvh,
    /// vertical, horizontal, vertical through the midpoint y
    Vhv,
    OffsetHvh,
    OffsetVhv,
    Perpendicular,
    ForcedFallback,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub waypoints: Waypoints,
    pub strategy: RouteStrategy,
}

impl Route {
    pub fn degradation(&self, from_id: Option<i32>, to_id: Option<i32>) -> Option<LayoutDegradation> {
        (self.strategy == RouteStrategy::ForcedFallback).then(|| LayoutDegradation::ForcedFallback {
            from: from_id.unwrap_or(-1),
            to: to_id.unwrap_or(-1),
        })
    }
}

type Strategy<'a> = Box<dyn Fn() -> Option<Waypoints> + 'a>;

/// Route an arrow from `from` to `to`.  Boxes owned by either endpoint
/// are not obstacles for it, nor are anonymous boxes containing one.
pub fn route(
    from: Position,
    to: Position,
    obstacles: &[BoundingBox],
    from_id: Option<i32>,
    to_id: Option<i32>,
    config: &LayoutConfig,
) -> Route {
    let obstacles: Vec<BoundingBox> = obstacles
        .iter()
        .filter(|bbox| match bbox.id {
            Some(_) => bbox.id != from_id && bbox.id != to_id,
            None => !bbox.contains(from) && !bbox.contains(to),
        })
        .copied()
        .collect();

    let mid = from.midpoint(to);

    let try_path = |waypoints: &[Position]| -> Option<Waypoints> {
        let mut path: SmallVec<[Position; 4]> = SmallVec::new();
        path.push(from);
        path.extend_from_slice(waypoints);
        path.push(to);
        path_is_clear(&path, &obstacles).then(|| waypoints.iter().map(|w| w.to_point()).collect())
    };
    let hvh = |x: f64| [Position::new(x, from.y), Position::new(x, to.y)];
    let vhv = |y: f64| [Position::new(from.x, y), Position::new(to.x, y)];

    let strategies: [(RouteStrategy, Strategy<'_>); 6] = [
        (RouteStrategy::Straight, Box::new(|| try_path(&[]))),
        (RouteStrategy::Hvh, Box::new(|| try_path(&hvh(mid.x)))),
        (RouteStrategy::Vhv, Box::new(|| try_path(&vhv(mid.y)))),
        (
            RouteStrategy::OffsetHvh,
            Box::new(|| {
                config
                    .hvh_offsets
                    .iter()
                    .find_map(|dx| try_path(&hvh(mid.x + dx)))
            }),
        ),
        (
            RouteStrategy::OffsetVhv,
            Box::new(|| {
                config
                    .vhv_offsets
                    .iter()
                    .find_map(|dy| try_path(&vhv(mid.y + dy)))
            }),
        ),
        (
            RouteStrategy::Perpendicular,
            Box::new(|| {
                let delta = to - from;
                let length = delta.length();
                if length <= 0.0 {
                    return None;
                }
                let normal = Position::new(-delta.y / length, delta.x / length);
                config
                    .perpendicular_offsets
                    .iter()
                    .find_map(|&offset| try_path(&[mid + normal * offset]))
            }),
        ),
    ];

    for (strategy, attempt) in &strategies {
        if let Some(waypoints) = attempt() {
            log::debug!(
                from = from_id.unwrap_or(-1), to = to_id.unwrap_or(-1), strategy:? = strategy;
                "routed connection"
            );
            return Route {
                waypoints,
                strategy: *strategy,
            };
        }
    }

    let route = Route {
        waypoints: hvh(mid.x).iter().map(|w| w.to_point()).collect(),
        strategy: RouteStrategy::ForcedFallback,
    };
    if let Some(degradation) = route.degradation(from_id, to_id) {
        log::warn!("{degradation}");
    }
    route
}

/// Waypoints for one arrow using the default configuration.  An empty
/// result means the straight line is clear.
pub fn find_waypoints(
    from: Position,
    to: Position,
    obstacles: &[BoundingBox],
    from_id: Option<i32>,
    to_id: Option<i32>,
) -> Waypoints {
    route(from, to, obstacles, from_id, to_id, &LayoutConfig::default()).waypoints
}

pub fn obstacles_for(variables: &[Variable], padding: f64) -> Vec<BoundingBox> {
    variables
        .iter()
        .map(|var| BoundingBox::for_variable(var, padding))
        .collect()
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoutingResult {
    /// Keyed by `(from_id, to_id)`.
    pub waypoints: BTreeMap<(i32, i32), Waypoints>,
    pub degradations: Vec<LayoutDegradation>,
}

/// Route every connection whose endpoints are both placed variables.
pub fn route_all_connections(
    variables: &[Variable],
    connections: &[Connection],
    config: &LayoutConfig,
) -> RoutingResult {
    let obstacles = obstacles_for(variables, config.obstacle_padding);
    let positions: BTreeMap<i32, Position> = variables
        .iter()
        .map(|var| (var.id, Position::from(var.position())))
        .collect();

    let mut result = RoutingResult::default();
    for conn in connections {
        let (Some(&from), Some(&to)) = (positions.get(&conn.from), positions.get(&conn.to)) else {
            continue;
        };
        let route = route(from, to, &obstacles, Some(conn.from), Some(conn.to), config);
        if let Some(degradation) = route.degradation(Some(conn.from), Some(conn.to)) {
            result.degradations.push(degradation);
        }
        result.waypoints.insert(conn.key(), route.waypoints);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn p(x: f64, y: f64) -> Position {
        Position::new(x, y)
    }

    fn blocker(x: f64, y: f64) -> BoundingBox {
        let mut bbox = BoundingBox::around(p(x, y), 60.0, 26.0, 50.0);
        bbox.id = Some(99);
        bbox
    }

    #[test]
    fn test_clear_path_has_no_waypoints() {
        assert!(find_waypoints(p(100.0, 100.0), p(300.0, 100.0), &[], Some(1), Some(2)).is_empty());
    }

    #[test]
    fn test_endpoint_boxes_are_not_obstacles() {
        let mut a = BoundingBox::around(p(100.0, 100.0), 60.0, 26.0, 50.0);
        a.id = Some(1);
        let mut b = BoundingBox::around(p(300.0, 100.0), 60.0, 26.0, 50.0);
        b.id = Some(2);
        let route = route(p(100.0, 100.0), p(300.0, 100.0), &[a, b], Some(1), Some(2), &LayoutConfig::default());
        assert_eq!(RouteStrategy::Straight, route.strategy);
    }

    #[test]
    fn test_anonymous_boxes_around_endpoints_are_skipped() {
        let around_from = BoundingBox::around(p(100.0, 100.0), 60.0, 26.0, 50.0);
        let around_to = BoundingBox::around(p(300.0, 100.0), 60.0, 26.0, 50.0);
        let clear = route(p(100.0, 100.0), p(300.0, 100.0), &[around_from, around_to], None, None, &LayoutConfig::default());
        assert_eq!(RouteStrategy::Straight, clear.strategy);

        // an anonymous box between them still blocks
        let between = BoundingBox::around(p(200.0, 100.0), 20.0, 20.0, 10.0);
        let blocked = route(p(100.0, 100.0), p(300.0, 100.0), &[around_from, between], None, None, &LayoutConfig::default());
        assert_ne!(RouteStrategy::Straight, blocked.strategy);
    }

    #[test]
    fn test_blocked_path_escalates() {
        let obstacle = BoundingBox {
            id: Some(99),
            left: 70.0,
            right: 130.0,
            top: 80.0,
            bottom: 120.0,
        };
        let waypoints = find_waypoints(p(50.0, 100.0), p(150.0, 100.0), &[obstacle], None, None);
        assert!(!waypoints.is_empty());
    }

    #[test]
    fn test_hvh_for_offset_endpoints() {
        // the diagonal crosses the blocker; the H-V-H dogleg at x=300
        // passes to its left and below it
        let obstacles = [blocker(400.0, 220.0)];
        let route = route(p(100.0, 100.0), p(500.0, 300.0), &obstacles, Some(1), Some(2), &LayoutConfig::default());
        assert_eq!(RouteStrategy::Hvh, route.strategy);
        assert_eq!(
            Waypoints::from_slice(&[Point::new(300, 100), Point::new(300, 300)]),
            route.waypoints
        );
    }

    #[test]
    fn test_collinear_blocker_uses_offset_or_perpendicular() {
        // H-V-H and V-H-V through the midpoint degenerate to the
        // straight line for horizontal endpoints
        let obstacles = [blocker(300.0, 100.0)];
        let route = route(p(100.0, 100.0), p(500.0, 100.0), &obstacles, Some(1), Some(2), &LayoutConfig::default());
        assert!(route.strategy > RouteStrategy::Vhv);
        assert_ne!(RouteStrategy::ForcedFallback, route.strategy);
        assert!(!route.waypoints.is_empty());
    }

    #[test]
    fn test_forced_fallback_when_everything_is_blocked() {
        // one huge obstacle that swallows every candidate path
        let wall = BoundingBox {
            id: Some(99),
            left: -10_000.0,
            right: 10_000.0,
            top: -10_000.0,
            bottom: 10_000.0,
        };
        let route = route(p(100.0, 100.0), p(500.0, 300.0), &[wall], Some(1), Some(2), &LayoutConfig::default());
        assert_eq!(RouteStrategy::ForcedFallback, route.strategy);
        assert_eq!(
            Waypoints::from_slice(&[Point::new(300, 100), Point::new(300, 300)]),
            route.waypoints
        );
        assert_eq!(
            Some(LayoutDegradation::ForcedFallback { from: 1, to: 2 }),
            route.degradation(Some(1), Some(2))
        );
    }

    #[test]
    fn test_waypoints_truncate() {
        let obstacles = [blocker(400.0, 220.0)];
        let route = route(p(101.0, 100.0), p(500.0, 301.0), &obstacles, None, None, &LayoutConfig::default());
        // midpoint x 300.5 truncates to 300
        assert_eq!(Point::new(300, 100), route.waypoints[0]);
    }

    proptest! {
        #[test]
        fn unobstructed_routes_are_straight(
            x1 in -2000.0f64..2000.0, y1 in -2000.0f64..2000.0,
            x2 in -2000.0f64..2000.0, y2 in -2000.0f64..2000.0,
        ) {
            prop_assert!(find_waypoints(p(x1, y1), p(x2, y2), &[], None, None).is_empty());
        }

        #[test]
        fn blocked_routes_never_straight(
            x in 0.0f64..1000.0, y in 0.0f64..1000.0,
            len in 300.0f64..1200.0, t in 0.3f64..0.7,
            horizontal in any::<bool>(),
        ) {
            let (from, to) = if horizontal {
                (p(x, y), p(x + len, y))
            } else {
                (p(x, y), p(x, y + len))
            };
            let center = from + (to - from) * t;
            let obstacles = [blocker(center.x, center.y)];
            let route = route(from, to, &obstacles, Some(1), Some(2), &LayoutConfig::default());
            prop_assert_ne!(RouteStrategy::Straight, route.strategy);
            prop_assert!(!route.waypoints.is_empty());
        }
    }
}
