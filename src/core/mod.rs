/// Module that contains binance-related operations and structures.
pub mod bnc;

/// Module that contains logging configuration and implementation load util.
pub mod logging;

/// Sum of all core sub-modules' configs.
pub mod config;
