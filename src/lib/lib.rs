pub mod data;
pub mod diagnostics;
pub mod estimate;
pub mod io;
pub mod likelihood;
pub mod model;
pub mod parameter;
pub mod prior;
pub mod sampler;
pub mod summary;
