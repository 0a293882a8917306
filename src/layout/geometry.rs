// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::ops::{Add, Mul, Sub};

use crate::model::{Point, Variable};

/// 2D position/vector used by routing and overlap resolution.
#[derive(Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl std::fmt::Debug for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 2D cross product: z-component of the 3D cross product.
    pub fn cross_2d(self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Self) -> f64 {
        (other - self).length()
    }

    pub fn midpoint(self, other: Self) -> Self {
        Self::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Truncate toward zero, the way sketch coordinates are written.
    pub fn to_point(self) -> Point {
        Point::new(self.x as i32, self.y as i32)
    }
}

impl From<Point> for Position {
    fn from(p: Point) -> Self {
        Position::new(f64::from(p.x), f64::from(p.y))
    }
}

impl Add for Position {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Position {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<f64> for Position {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

/// Check if two line segments intersect.
/// Parallel/collinear segments are NOT considered crossing.
pub fn segments_intersect(a_start: Position, a_end: Position, b_start: Position, b_end: Position) -> bool {
    let d1 = a_end - a_start;
    let d2 = b_end - b_start;

    let denom = d1.cross_2d(d2);
    if denom.abs() < 1e-10 {
        return false;
    }

    let w = b_start - a_start;
    let t = w.cross_2d(d2) / denom;
    let u = w.cross_2d(d1) / denom;

    (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)
}

/// An axis-aligned obstacle around a variable, already inflated by the
/// routing clearance.  `top` is the smaller y.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub id: Option<i32>,
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl BoundingBox {
    pub fn around(center: Position, width: f64, height: f64, padding: f64) -> Self {
        BoundingBox {
            id: None,
            left: center.x - width / 2.0 - padding,
            right: center.x + width / 2.0 + padding,
            top: center.y - height / 2.0 - padding,
            bottom: center.y + height / 2.0 + padding,
        }
    }

    pub fn for_variable(var: &Variable, padding: f64) -> Self {
        let mut bbox = Self::around(
            var.position().into(),
            f64::from(var.width),
            f64::from(var.height),
            padding,
        );
        bbox.id = Some(var.id);
        bbox
    }

    pub fn contains(&self, p: Position) -> bool {
        (self.left..=self.right).contains(&p.x) && (self.top..=self.bottom).contains(&p.y)
    }

    /// True if the segment has an endpoint inside the box or crosses one
    /// of its four edges.
    pub fn intersects_segment(&self, start: Position, end: Position) -> bool {
        if self.contains(start) || self.contains(end) {
            return true;
        }
        let top_left = Position::new(self.left, self.top);
        let top_right = Position::new(self.right, self.top);
        let bottom_left = Position::new(self.left, self.bottom);
        let bottom_right = Position::new(self.right, self.bottom);
        [
            (top_left, bottom_left),
            (top_right, bottom_right),
            (top_left, top_right),
            (bottom_left, bottom_right),
        ]
        .into_iter()
        .any(|(a, b)| segments_intersect(start, end, a, b))
    }
}

/// True if no leg of the polyline touches any obstacle.
pub fn path_is_clear(path: &[Position], obstacles: &[BoundingBox]) -> bool {
    path.windows(2).all(|leg| {
        obstacles
            .iter()
            .all(|bbox| !bbox.intersects_segment(leg[0], leg[1]))
    })
}
