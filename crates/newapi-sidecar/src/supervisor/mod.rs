mod core;
mod events;


pub use core::{Supervisor, SupervisorBuilder};
pub use events::SupervisorEvent;
