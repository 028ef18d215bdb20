mod exec;
mod fs;
mod playground;

pub use exec::{ExecArgs, run_exec};
pub use fs::{GetArgs, PathArgs, PutArgs, run_cat, run_get, run_ls, run_put};
pub use playground::{PlaygroundArgs, run_playground};
