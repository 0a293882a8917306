// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Whole-diagram minimum-spacing pass.

use float_cmp::approx_eq;

use super::config::{CanvasBounds, LayoutConfig};
use super::geometry::Position;
use crate::common::LayoutDegradation;

#[derive(Clone, Debug, PartialEq)]
pub struct OverlapReport {
    /// Passes that found at least one violating pair.
    pub iterations: usize,
    pub converged: bool,
    pub degradation: Option<LayoutDegradation>,
}

/// `bounds` must be normalized.  A NaN bound leaves that side open.
fn clamp_to(bounds: &CanvasBounds, p: Position) -> Position {
    Position::new(
        p.x.max(bounds.min_x).min(bounds.max_x),
        p.y.max(bounds.min_y).min(bounds.max_y),
    )
}

/// Push nodes apart until every pair is at least `min_spacing` apart.
///
/// For each violating pair `(i, j)` with `i < j`, node `j` moves away
/// from node `i` along their connecting unit vector (or +x when they
/// coincide) by the shortfall plus `overlap_margin`, is clamped to the
/// canvas and truncated to whole units.  Later pairs in the same pass see
/// the updated positions.  If the iteration cap is reached the partially
/// fixed positions are kept and a degradation is reported.
pub fn resolve_overlaps(positions: &mut [Position], config: &LayoutConfig) -> OverlapReport {
    let n = positions.len();
    let canvas = config.canvas.normalized();
    let mut iterations = 0;

    while iterations < config.max_overlap_iterations {
        let mut overlap_found = false;

        for i in 0..n {
            for j in (i + 1)..n {
                let a = positions[i];
                let b = positions[j];
                let dist = a.distance(b);
                if dist >= config.min_spacing {
                    continue;
                }
                overlap_found = true;

                let direction = if approx_eq!(f64, dist, 0.0, ulps = 2) {
                    Position::new(1.0, 0.0)
                } else {
                    (b - a) * (1.0 / dist)
                };
                let needed = config.min_spacing - dist + config.overlap_margin;
                let moved = clamp_to(&canvas, b + direction * needed);
                positions[j] = Position::new(moved.x.trunc(), moved.y.trunc());
            }
        }

        if !overlap_found {
            log::debug!(iterations = iterations, nodes = n; "overlap resolution converged");
            return OverlapReport {
                iterations,
                converged: true,
                degradation: None,
            };
        }
        iterations += 1;
    }

    let degradation = LayoutDegradation::OverlapIterationCap { iterations };
    log::warn!("{degradation}");
    OverlapReport {
        iterations,
        converged: false,
        degradation: Some(degradation),
    }
}
