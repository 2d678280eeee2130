//! Disc image support for the oxidized-cube emulator
//!
//! Provides the read-only [`Volume`] abstraction the boot path consumes,
//! the console [`Region`] model, and header probing for flat disc images.
//! Container formats beyond the boot header are out of scope here.

pub mod region;
pub mod volume;

pub use region::Region;
pub use volume::{open_volume, DiscVolume, Partition, Volume};
