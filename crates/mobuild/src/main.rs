use std::process::ExitCode;

fn main() -> ExitCode {
    mobuild::run()
}
