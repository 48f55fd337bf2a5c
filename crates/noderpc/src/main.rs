use std::process::ExitCode;

fn main() -> ExitCode {
    match noderpc::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("noderpcd: {error}");
            ExitCode::FAILURE
        }
    }
}
