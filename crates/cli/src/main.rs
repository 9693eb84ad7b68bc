use std::process::ExitCode;

fn main() -> ExitCode {
    crmquery_cli::run()
}
