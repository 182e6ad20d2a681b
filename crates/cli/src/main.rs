use std::process::ExitCode;

fn main() -> ExitCode {
    commitpilot_cli::run()
}
