// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use serde::Deserialize;

use crate::common::{Error, Result};

/// Canvas rectangle nodes are kept inside during overlap resolution.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct CanvasBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Default for CanvasBounds {
    fn default() -> Self {
        Self {
            min_x: 100.0,
            max_x: 2400.0,
            min_y: 50.0,
            max_y: 950.0,
        }
    }
}

impl CanvasBounds {
    /// The same rectangle with each axis ordered low to high.
    pub fn normalized(&self) -> CanvasBounds {
        let order = |a: f64, b: f64| if b < a { (b, a) } else { (a, b) };
        let (min_x, max_x) = order(self.min_x, self.max_x);
        let (min_y, max_y) = order(self.min_y, self.max_y);
        CanvasBounds {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    fn is_valid(&self) -> bool {
        [self.min_x, self.max_x, self.min_y, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }
}

/// Routing and spacing parameters.
///
/// All distances are in sketch units.  Any subset can be overridden from
/// JSON; missing fields keep their defaults.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    // Routing
    /// Clearance added around every variable's box.
    pub obstacle_padding: f64,
    /// Shifts of the H-V-H midpoint x, tried in order.
    pub hvh_offsets: Vec<f64>,
    /// Shifts of the V-H-V midpoint y, tried in order.
    pub vhv_offsets: Vec<f64>,
    /// Distances along the segment normal for a single waypoint.
    pub perpendicular_offsets: Vec<f64>,

    // Overlap resolution
    /// Minimum distance between node centers.
    pub min_spacing: f64,
    /// Extra distance added to every push.
    pub overlap_margin: f64,
    pub max_overlap_iterations: usize,
    pub canvas: CanvasBounds,

    // New elements
    pub default_width: i32,
    pub default_height: i32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            obstacle_padding: 50.0,
            hvh_offsets: vec![200.0, -200.0, 400.0, -400.0],
            vhv_offsets: vec![150.0, -150.0, 300.0, -300.0],
            perpendicular_offsets: vec![100.0, -100.0, 200.0, -200.0],
            min_spacing: 200.0,
            overlap_margin: 10.0,
            max_overlap_iterations: 100,
            canvas: CanvasBounds::default(),
            default_width: 60,
            default_height: 26,
        }
    }
}

impl LayoutConfig {
    /// Parse a JSON override of the defaults, rejecting an inverted canvas
    /// or a negative spacing.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: LayoutConfig = serde_json::from_str(text)?;
        if !config.canvas.is_valid() {
            return Err(Error::InvalidModel(format!("bad canvas bounds {:?}", config.canvas)));
        }
        if !(config.min_spacing.is_finite() && config.min_spacing >= 0.0) {
            return Err(Error::InvalidModel(format!("bad min_spacing {}", config.min_spacing)));
        }
        Ok(config)
    }
}
