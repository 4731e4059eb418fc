use serde::Serialize;

/// The two lane centers of the road, as X coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Lanes {
    pub right_x: f32,
    pub left_x: f32,
}

impl Lanes {
    pub fn new(right_x: f32, left_x: f32) -> Self {
        Self { right_x, left_x }
    }

    /// The lane an agent at `lane_x` would overtake into.
    pub fn other(&self, lane_x: f32) -> f32 {
        if lane_x == self.right_x { self.left_x } else { self.right_x }
    }

    /// Whether `x` lies within `tolerance` of `lane_center`.
    pub fn within(x: f32, lane_center: f32, tolerance: f32) -> bool {
        (x - lane_center).abs() < tolerance
    }
}
