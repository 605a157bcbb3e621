use std::ops::{Mul, MulAssign};

use serde_derive::{Deserialize, Serialize};

/// [0,1]
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alpha(pub f32);

pub const ALPHA_ZERO: Alpha = Alpha(0.0);
pub const ALPHA_ONE: Alpha = Alpha(1.0);

pub const ALPHA_NEARLY_ZERO: Alpha = Alpha(1e-6);
pub const ALPHA_NEARLY_ONE: Alpha = Alpha(1.0 - ALPHA_NEARLY_ZERO.0);

impl Alpha {
    pub fn is_nearly_zero(self) -> bool {
        self.0 <= ALPHA_NEARLY_ZERO.0
    }

    pub fn is_nearly_one(self) -> bool {
        self.0 >= ALPHA_NEARLY_ONE.0
    }

    pub fn inverse(self) -> Self {
        Self(1.0 - self.0)
    }
}

impl Eq for Alpha {}

impl PartialOrd for Alpha {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.0.total_cmp(&other.0))
    }
}

impl Ord for Alpha {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Mul for Alpha {
    type Output = Alpha;

    fn mul(self, rhs: Self) -> Self::Output {
        Alpha(self.0 * rhs.0)
    }
}

impl MulAssign for Alpha {
    fn mul_assign(&mut self, rhs: Self) {
        self.0 *= rhs.0;
    }
}

pub fn unorm_clamped(x: f32) -> Alpha {
    Alpha(x.clamp(0.0, 1.0))
}
