use std::process::ExitCode;

fn main() -> ExitCode {
    clawby_cli::run()
}
