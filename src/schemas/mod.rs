//! Molecule bindings for the cell data tables, generated from `spore.mol`

mod blockchain {
    pub use ckb_types::packed::{Bytes, BytesOpt, BytesOptReader, BytesReader};
}

#[allow(clippy::all)]
mod spore;

pub use spore::*;
