//! Configuration layers and their resolution
//!
//! - [`Deployment`]: process-level settings
//! - [`ConfigSource`]: where layers are loaded from
//! - [`Directory`]: rosters and properties for group matching
//! - [`ConfigResolver`]: merges layers into an [`EffectiveConfig`]

mod deployment;
mod directory;
mod resolver;
mod source;

pub use deployment::{DEFAULT_IGNORABLE_FIELDS, Deployment, SectionSpec};
pub use directory::{Directory, StaticDirectory};
pub use resolver::{
    CONTROL_SECTIONS, ConfigResolver, EffectiveConfig, MEMBERSHIP_SECTIONS,
    NAME_VALIDATOR_SECTION, Resolution,
};
pub use source::{ConfigSource, FsConfigSource, LayerLocator, MemoryConfigSource, parse_layer};
