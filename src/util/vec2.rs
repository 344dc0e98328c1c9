use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// 2D vector on the arena plane (x to the east, z to the south)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub z: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, z: 0.0 };

    #[inline]
    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    #[inline]
    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.z * self.z
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self {
                x: self.x / len,
                z: self.z / len,
            }
        } else {
            Self::ZERO
        }
    }

    #[inline]
    pub fn dot(&self, other: Vec2) -> f32 {
        self.x * other.x + self.z * other.z
    }

    #[inline]
    pub fn distance_to(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    #[inline]
    pub fn distance_sq_to(&self, other: Vec2) -> f32 {
        (*self - other).length_sq()
    }

    pub fn lerp(&self, other: Vec2, t: f32) -> Self {
        *self + (other - *self) * t
    }

    /// Returns perpendicular vector (rotated 90 degrees, east -> south)
    pub fn perpendicular(&self) -> Self {
        Self {
            x: -self.z,
            z: self.x,
        }
    }

    /// Squared distance from this point to the segment `a`-`b`.
    ///
    /// Projects onto the segment and clamps the parameter to [0, 1]. A
    /// zero-length segment degenerates to the point distance to `a`.
    pub fn distance_sq_to_segment(&self, a: Vec2, b: Vec2) -> f32 {
        let ab = b - a;
        let len_sq = ab.length_sq();
        if len_sq <= f32::EPSILON {
            return self.distance_sq_to(a);
        }
        let t = ((*self - a).dot(ab) / len_sq).clamp(0.0, 1.0);
        self.distance_sq_to(a + ab * t)
    }

    #[inline]
    pub fn distance_to_segment(&self, a: Vec2, b: Vec2) -> f32 {
        self.distance_sq_to_segment(a, b).sqrt()
    }

    /// Component-wise min
    pub fn min(&self, other: Vec2) -> Self {
        Self {
            x: self.x.min(other.x),
            z: self.z.min(other.z),
        }
    }

    /// Component-wise max
    pub fn max(&self, other: Vec2) -> Self {
        Self {
            x: self.x.max(other.x),
            z: self.z.max(other.z),
        }
    }

    /// Check if vector is approximately equal to another
    pub fn approx_eq(&self, other: Vec2, epsilon: f32) -> bool {
        (self.x - other.x).abs() < epsilon && (self.z - other.z).abs() < epsilon
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            z: self.z + rhs.z,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            z: self.z - rhs.z,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            z: self.z * rhs,
        }
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            z: -self.z,
        }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.z += rhs.z;
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.z -= rhs.z;
    }
}

impl MulAssign<f32> for Vec2 {
    fn mul_assign(&mut self, rhs: f32) {
        self.x *= rhs;
        self.z *= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_length() {
        let v = Vec2::new(3.0, 4.0);
        assert!(approx_eq(v.length(), 5.0));
        assert!(approx_eq(v.length_sq(), 25.0));
    }

    #[test]
    fn test_normalize_zero() {
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
        assert!(approx_eq(Vec2::new(0.0, 7.0).normalize().z, 1.0));
    }

    #[test]
    fn test_perpendicular() {
        let east = Vec2::new(1.0, 0.0);
        assert_eq!(east.perpendicular(), Vec2::new(0.0, 1.0));
        assert!(approx_eq(east.dot(east.perpendicular()), 0.0));
    }

    #[test]
    fn test_segment_distance_interior() {
        let p = Vec2::new(0.0, 6.0);
        let d = p.distance_to_segment(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
        assert!(approx_eq(d, 6.0));
    }

    #[test]
    fn test_segment_distance_clamped_to_endpoint() {
        let p = Vec2::new(8.0, 4.0);
        let d = p.distance_to_segment(Vec2::new(0.0, 0.0), Vec2::new(5.0, 0.0));
        assert!(approx_eq(d, 5.0));
    }

    #[test]
    fn test_segment_distance_degenerate() {
        let a = Vec2::new(2.0, 2.0);
        let d = Vec2::new(5.0, 6.0).distance_to_segment(a, a);
        assert!(d.is_finite());
        assert!(approx_eq(d, 5.0));
    }

    #[test]
    fn test_lerp() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, -4.0);
        assert!(a.lerp(b, 0.5).approx_eq(Vec2::new(5.0, -2.0), EPSILON));
    }

    #[test]
    fn test_min_max() {
        let a = Vec2::new(1.0, 5.0);
        let b = Vec2::new(3.0, 2.0);
        assert_eq!(a.min(b), Vec2::new(1.0, 2.0));
        assert_eq!(a.max(b), Vec2::new(3.0, 5.0));
    }

    #[test]
    fn test_serde() {
        let v = Vec2::new(1.5, 2.5);
        let encoded =
            bincode::serde::encode_to_vec(&v, bincode::config::standard()).unwrap();
        let (decoded, _): (Vec2, usize) =
            bincode::serde::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(v, decoded);
    }
}
