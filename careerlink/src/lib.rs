// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

#[path = "commands.rs"]
pub mod commands;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    ProgressMode, engine_options_from_matches, expand_path, input_options_from_matches,
    parse_domain_list, progress_line,
};

pub use commands::{CLAP_STYLING, command_argument_builder};
