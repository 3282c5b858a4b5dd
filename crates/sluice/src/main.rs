//! Sluice CLI: validate landing files against the catalog and route them.

use std::process::ExitCode;

use sluice::{Application, Config};

fn main() -> ExitCode {
    Application::<Config>::run()
}
