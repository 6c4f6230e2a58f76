extern crate anyhow;
extern crate log;
extern crate nom;
extern crate thiserror;
#[macro_use]
extern crate lazy_static;

use std::io::BufRead;

use anyhow::Result;
use log::debug;

pub mod cfg;
pub mod config;
pub mod insn;
pub mod line;
pub mod render;
pub mod store;
pub mod util;


/// instruction index within the traced program, as printed by the verifier.
pub type Addr = u64;

pub use config::Config;
pub use store::{read_log, InstructionStore};

/// convert a verifier log into the DOT text of its annotated CFG.
///
/// the whole log is consumed before anything is rendered.
pub fn log2dot<R: BufRead>(reader: R, config: &Config) -> Result<String> {
    config.validate()?;

    let store = read_log(reader)?;
    debug!("log2dot: {} instructions", store.len());

    let cfg = cfg::build_cfg(&store, config);
    let back_edges = cfg::loops::find_back_edges(&cfg);
    debug!("log2dot: {} back edges", back_edges.len());

    let graph = render::Graph::from_cfg(&store, &cfg, &back_edges, config);
    Ok(graph.to_string())
}
