use std::process::ExitCode;

fn main() -> ExitCode {
    kujo_cli::run()
}
