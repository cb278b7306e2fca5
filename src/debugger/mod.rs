pub mod breakpoint;
pub mod core;
pub mod highlight;
pub mod location;
pub mod output;
pub mod state;
pub mod status;
pub mod threads;
pub mod variables;
