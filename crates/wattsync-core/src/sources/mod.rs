//! Concrete upstream adapters.

pub mod energy;
pub mod weather;

pub use energy::ElectricityMapsSource;
pub use weather::OpenMeteoSource;
