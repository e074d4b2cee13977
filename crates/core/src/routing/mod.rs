mod graph;
mod router;

pub use graph::{ConversionHop, ConversionPath, HopSource, PriceGraph, PriceGraphBuilder};
pub use router::{PriceRouter, RouteError};
