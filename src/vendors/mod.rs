//! Built-in vendor parsers.

use std::sync::Arc;

use crate::config::Config;
use crate::parser::{Telemetry, VendorParser};

mod blackvue;
mod cr2000;

pub use blackvue::BlackVueParser;
pub use cr2000::Cr2000OmegaParser;

/// The built-in parsers in registration order, sharing one telemetry pipeline.
pub fn default_parsers(config: &Config) -> Vec<Arc<dyn VendorParser>> {
    let telemetry = Telemetry::from_config(config);
    let tz = config.time_zone();
    vec![
        Arc::new(BlackVueParser::new(telemetry.clone(), tz)),
        Arc::new(Cr2000OmegaParser::new(telemetry, tz)),
    ]
}
