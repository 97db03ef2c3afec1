pub mod dataset;
pub mod export;
pub mod model;
pub mod prelude;
pub mod train;
pub mod util;
