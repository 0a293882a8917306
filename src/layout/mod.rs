// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Arrow routing and node spacing for sketch diagrams.

pub mod config;
pub mod geometry;
pub mod overlap;
pub mod routing;

pub use config::{CanvasBounds, LayoutConfig};
pub use geometry::{BoundingBox, Position};
pub use overlap::{OverlapReport, resolve_overlaps};
pub use routing::{Route, RouteStrategy, RoutingResult, Waypoints, find_waypoints, route, route_all_connections};
