//! Command-line interface handlers

pub mod commands;

pub use commands::{
    cmd_genesis, cmd_keygen, cmd_start, cmd_submit, parse_peers, CliResult, Transfer,
};
