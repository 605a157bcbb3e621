mod alpha;
mod id;
mod seconds;

pub use alpha::*;
pub use id::*;
pub use seconds::*;
