//! Configuration for the scrape receiver.
//!
//! The configuration is read from a `config.yml` file in a configuration directory and can be
//! overridden from the environment:
//!
//! ```yaml
//! logging:
//!   level: debug
//!   format: json
//! receiver:
//!   start_time_metric_regex: "^node_boot_time_seconds$"
//!   external_labels:
//!     cluster: eu-west-1
//! ```
//!
//! All sections and fields are optional and fall back to their defaults.

#![warn(missing_docs)]

mod config;

pub use self::config::*;
