use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    pub fn normalized(&self) -> Vec2 {
        let len = self.length();
        if len <= f32::EPSILON {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / len, self.y / len)
        }
    }

    pub fn from_polar(radius: f32, angle: f32) -> Vec2 {
        Vec2::new(radius * angle.cos(), radius * angle.sin())
    }

    pub fn axis(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }

    pub fn with_axis(mut self, axis: Axis, value: f32) -> Vec2 {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
        }
        self
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn other(&self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }
}

/// A rectangle defined by min and max corners
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn from_min_max(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_pos_size(pos: Vec2, size: Vec2) -> Self {
        Self {
            min: pos,
            max: Vec2::new(pos.x + size.x, pos.y + size.y),
        }
    }

    /// Square box of half-extent `radius` around a point.
    pub fn around(point: Vec2, radius: f32) -> Self {
        Self {
            min: Vec2::new(point.x - radius, point.y - radius),
            max: Vec2::new(point.x + radius, point.y + radius),
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width(), self.height())
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            self.min.x + self.width() * 0.5,
            self.min.y + self.height() * 0.5,
        )
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Smallest rect covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            min: Vec2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Vec2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn expand(&self, amount: f32) -> Rect {
        Rect {
            min: Vec2::new(self.min.x - amount, self.min.y - amount),
            max: Vec2::new(self.max.x + amount, self.max.y + amount),
        }
    }
}

/// One of the four sides of a node rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Wall {
    Left,
    Right,
    Top,
    Bottom,
}

impl Wall {
    pub const ALL: [Wall; 4] = [Wall::Top, Wall::Right, Wall::Bottom, Wall::Left];

    pub fn opposite(&self) -> Self {
        match self {
            Wall::Left => Wall::Right,
            Wall::Right => Wall::Left,
            Wall::Top => Wall::Bottom,
            Wall::Bottom => Wall::Top,
        }
    }

    /// Unit vector pointing out of the node through this wall.
    pub fn direction_vector(&self) -> Vec2 {
        match self {
            Wall::Left => Vec2::new(-1.0, 0.0),
            Wall::Right => Vec2::new(1.0, 0.0),
            Wall::Top => Vec2::new(0.0, -1.0),
            Wall::Bottom => Vec2::new(0.0, 1.0),
        }
    }

    /// The axis a point may slide along while staying on this wall.
    pub fn variable_axis(&self) -> Axis {
        match self {
            Wall::Top | Wall::Bottom => Axis::X,
            Wall::Left | Wall::Right => Axis::Y,
        }
    }

    /// Midpoint of this wall relative to the node's top-left corner.
    pub fn midpoint_offset(&self, size: Vec2) -> Vec2 {
        match self {
            Wall::Top => Vec2::new(size.x / 2.0, 0.0),
            Wall::Bottom => Vec2::new(size.x / 2.0, size.y),
            Wall::Left => Vec2::new(0.0, size.y / 2.0),
            Wall::Right => Vec2::new(size.x, size.y / 2.0),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Wall::Left => "left",
            Wall::Right => "right",
            Wall::Top => "top",
            Wall::Bottom => "bottom",
        }
    }
}

impl FromStr for Wall {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" => Ok(Wall::Left),
            "right" => Ok(Wall::Right),
            "top" => Ok(Wall::Top),
            "bottom" => Ok(Wall::Bottom),
            _ => Err(CoreError::InvalidWall(s.to_string())),
        }
    }
}
