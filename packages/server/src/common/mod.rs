// Common types shared across the application

pub mod brand;
pub mod platform;

pub use brand::BrandContext;
pub use platform::Platform;
