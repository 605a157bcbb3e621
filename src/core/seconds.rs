use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seconds(pub f32);

impl From<f32> for Seconds {
    fn from(value: f32) -> Self {
        Seconds(value)
    }
}

impl From<Seconds> for f32 {
    fn from(value: Seconds) -> Self {
        value.0
    }
}

impl Seconds {
    pub fn is_nearly_zero(&self) -> bool {
        self.0.abs() < 1e-6
    }
}

impl Eq for Seconds {}

impl PartialOrd for Seconds {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.0.total_cmp(&other.0))
    }
}

impl Ord for Seconds {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}
