//! LAN device discovery
//!
//! A scan walks a /24 host range in batches. Every address in a batch is
//! probed concurrently over HTTP; devices that answer are upserted into the
//! registry as Online and, unless disabled, get a stream ingestor.
//!
//! ```text
//!   ScanRange ──batches()──► [.0 .. .9] ──► JoinSet { probe(.0), .., probe(.9) }
//!                            [.10 .. .19]            │ timeout per probe
//!                             ...                    ▼
//!                                         sorted ProbeReports ──► registry.upsert_probed()
//!                                                                 launcher.launch()
//! ```

pub mod config;
pub mod network;
pub mod probe;
pub mod range;

pub use config::{ScanConfig, DEFAULT_PROBE_PATH, DEFAULT_PROBE_PORT};
pub use network::NetworkScanner;
pub use probe::{parse_resolution, HttpProber, ProbeError, ProbeReport, Prober};
pub use range::ScanRange;
