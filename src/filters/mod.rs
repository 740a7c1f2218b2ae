pub mod complementary;

pub use complementary::{AttitudeFilter, AttitudeState, AttitudeUpdate};
