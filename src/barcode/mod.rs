//! Export contents of `barcode` folder
mod candidate;
mod catalog;
mod clustering;
mod color;
mod decoder;

pub use self::{
    candidate::*,
    catalog::*,
    clustering::*,
    color::*,
    decoder::*,
};
