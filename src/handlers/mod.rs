pub mod claim;
pub mod error;
pub mod health;
pub mod params;
pub mod status;
