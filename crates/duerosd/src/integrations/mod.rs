#[cfg(feature = "integration_dueros")]
pub mod dueros;
