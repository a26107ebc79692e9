//! Points, regions and query shapes.

mod bounds;
mod point;
mod shape;

pub use bounds::Bounds;
pub use point::Point;
pub use shape::{Ball, Polygon, Segment, Shape};
