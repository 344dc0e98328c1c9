pub mod constants;
pub mod input_buffer;
pub mod match_result;
pub mod session;
pub mod snapshot;
pub mod spatial;
pub mod state;
pub mod systems;
