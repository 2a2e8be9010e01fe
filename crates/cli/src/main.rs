use std::process::ExitCode;

fn main() -> ExitCode {
    waqf_cli::run()
}
