//! Command Line Arguments
//!
//! Both tools take positional arguments only. The sender's first four have
//! documented defaults; everything after them is mandatory. Numeric fields
//! are parsed as wide signed types so that out-of-range values (a negative
//! window size, a probability above one) reach range validation and produce
//! a specific message instead of a generic parse failure.

use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use stp_protocol::PleConfig;
use thiserror::Error;

/// Argument validation failures, all fatal before any network activity
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgsError {
    #[error("invalid IPv4 address: {0}")]
    InvalidIp(String),

    #[error("no {name} specified")]
    Missing { name: &'static str },

    #[error("{name} must be >= {min}")]
    TooSmall { name: &'static str, min: i64 },

    #[error("{name} must be between 0 and 1")]
    NotProbability { name: &'static str },

    #[error("maxOrder must be between 1 and 6")]
    MaxOrderRange,
}

/// Sender command line
#[derive(Parser, Debug)]
#[command(name = "stp-sender")]
#[command(about = "STP file sender with packet loss emulation", long_about = None)]
pub struct SenderArgs {
    /// IP address of the host the receiver runs on
    #[arg(value_name = "receiver_host_ip", default_value = "127.0.0.1")]
    pub receiver_host_ip: String,

    /// Port the receiver listens on
    #[arg(value_name = "receiver_port", default_value_t = 1111)]
    pub receiver_port: u16,

    /// File to transfer
    #[arg(value_name = "filename", default_value = "test1.pdf")]
    pub filename: String,

    /// Maximum window size in bytes
    #[arg(value_name = "MWS", default_value_t = 10000, allow_hyphen_values = true)]
    pub max_window_size: i64,

    /// Maximum data bytes per segment
    #[arg(value_name = "MSS", allow_hyphen_values = true)]
    pub max_segment_size: Option<i64>,

    /// Deviation multiplier in the timeout interval calculation
    #[arg(value_name = "gamma", allow_hyphen_values = true)]
    pub gamma: Option<i64>,

    /// Probability a data segment is dropped
    #[arg(value_name = "pDrop", allow_hyphen_values = true)]
    pub p_drop: Option<f64>,

    /// Probability an undropped segment is duplicated
    #[arg(value_name = "pDuplicate", allow_hyphen_values = true)]
    pub p_duplicate: Option<f64>,

    /// Probability a surviving segment is corrupted
    #[arg(value_name = "pCorrupt", allow_hyphen_values = true)]
    pub p_corrupt: Option<f64>,

    /// Probability a surviving segment is held for reordering
    #[arg(value_name = "pOrder", allow_hyphen_values = true)]
    pub p_order: Option<f64>,

    /// Number of sends a held segment waits out before release
    #[arg(value_name = "maxOrder", allow_hyphen_values = true)]
    pub max_order: Option<i64>,

    /// Probability a surviving segment is delayed
    #[arg(value_name = "pDelay", allow_hyphen_values = true)]
    pub p_delay: Option<f64>,

    /// Upper bound of the random delay in milliseconds
    #[arg(value_name = "maxDelay", allow_hyphen_values = true)]
    pub max_delay: Option<f64>,

    /// Random number generator seed
    #[arg(value_name = "seed")]
    pub seed: Option<u64>,
}

/// Validated sender configuration
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub receiver: SocketAddr,
    pub filename: String,
    pub max_window_size: usize,
    pub max_segment_size: usize,
    pub gamma: u32,
    pub ple: PleConfig,
}

impl SenderArgs {
    /// Validate ranges and presence, producing the runtime configuration
    pub fn validate(self) -> Result<SenderConfig, ArgsError> {
        let ip: Ipv4Addr = self
            .receiver_host_ip
            .parse()
            .map_err(|_| ArgsError::InvalidIp(self.receiver_host_ip.clone()))?;
        let receiver = SocketAddr::V4(SocketAddrV4::new(ip, self.receiver_port));

        if self.max_window_size < 1 {
            return Err(ArgsError::TooSmall { name: "MWS", min: 1 });
        }
        let max_segment_size = require(self.max_segment_size, "MSS")?;
        if max_segment_size < 1 {
            return Err(ArgsError::TooSmall { name: "MSS", min: 1 });
        }
        let gamma = require(self.gamma, "gamma")?;
        if gamma < 0 {
            return Err(ArgsError::TooSmall {
                name: "gamma",
                min: 0,
            });
        }

        let p_drop = probability(self.p_drop, "pDrop")?;
        let p_duplicate = probability(self.p_duplicate, "pDuplicate")?;
        let p_corrupt = probability(self.p_corrupt, "pCorrupt")?;
        let p_order = probability(self.p_order, "pOrder")?;
        let max_order = require(self.max_order, "maxOrder")?;
        if p_order > 0.0 && !(1..=6).contains(&max_order) {
            return Err(ArgsError::MaxOrderRange);
        }
        let p_delay = probability(self.p_delay, "pDelay")?;
        let max_delay = require(self.max_delay, "maxDelay")?;
        if max_delay < 0.0 {
            return Err(ArgsError::TooSmall {
                name: "maxDelay",
                min: 0,
            });
        }
        let seed = require(self.seed, "seed")?;

        Ok(SenderConfig {
            receiver,
            filename: self.filename,
            max_window_size: self.max_window_size as usize,
            max_segment_size: max_segment_size as usize,
            gamma: gamma as u32,
            ple: PleConfig {
                p_drop,
                p_duplicate,
                p_corrupt,
                p_order,
                max_order: max_order.max(0) as u32,
                p_delay,
                max_delay_ms: max_delay,
                seed,
            },
        })
    }
}

/// Receiver command line
#[derive(Parser, Debug)]
#[command(name = "stp-receiver")]
#[command(about = "STP file receiver", long_about = None)]
pub struct ReceiverArgs {
    /// Port to listen on
    #[arg(value_name = "receiver_port")]
    pub receiver_port: Option<u16>,

    /// Where to write the received file
    #[arg(value_name = "filename")]
    pub filename: Option<String>,
}

/// Validated receiver configuration
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub listen: SocketAddr,
    pub filename: String,
}

impl ReceiverArgs {
    pub fn validate(self) -> Result<ReceiverConfig, ArgsError> {
        let port = require(self.receiver_port, "port")?;
        let filename = require(self.filename, "filename")?;
        Ok(ReceiverConfig {
            listen: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)),
            filename,
        })
    }
}

fn require<T>(value: Option<T>, name: &'static str) -> Result<T, ArgsError> {
    value.ok_or(ArgsError::Missing { name })
}

fn probability(value: Option<f64>, name: &'static str) -> Result<f64, ArgsError> {
    let p = require(value, name)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(ArgsError::NotProbability { name });
    }
    Ok(p)
}
