//! The reasoning-chain core: step client, profiles and the step loop.

pub mod client;
pub mod driver;
pub mod profile;
pub mod step;

pub use client::StepClient;
pub use driver::{ChainDriver, RunParams};
pub use profile::ChainProfile;
pub use step::{ChainEntry, ChainSnapshot};
