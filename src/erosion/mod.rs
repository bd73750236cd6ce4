//! Erosion of the density field
//!
//! Both simulators mutate the field in place through atomic accumulation and
//! are meant to run with the field's exclusive guard held.

pub mod config;
pub mod hydraulic;
pub mod thermal;

pub use config::{HydraulicParams, ThermalParams};
pub use hydraulic::{BatchReport, DeathCause, HydraulicSimulator, Particle, ParticleState};
pub use thermal::{ThermalReport, ThermalSimulator, Transfer};
