use inic_core::prelude::{ResourceCatalog, StackConfig};
use serde::{Deserialize, Serialize};
use std::io::{stdin, stdout, BufReader, BufWriter, Write};

/// Stack configuration together with the resource lists it serves.
#[derive(Debug, Serialize, Deserialize)]
struct Configuration {
    stack: StackConfig,
    catalog: ResourceCatalog<64, 16, 16>,
}

fn main() {
    let cfg = BufReader::new(stdin());
    let cfg: Configuration = serde_yaml::from_reader(cfg).expect("Failed to read config");
    cfg.stack.validate().expect("Invalid stack configuration");
    cfg.catalog.validate().expect("Invalid resource catalog");
    let cfg: heapless::Vec<u8, 10_000> =
        postcard::to_vec(&cfg).expect("Failed to serialize config");
    let mut out = BufWriter::new(stdout());
    out.write_all(&cfg)
        .expect("Failed to write configuration binary blob")
}
