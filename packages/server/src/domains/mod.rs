// Domain modules

pub mod analysis;
pub mod citations;
