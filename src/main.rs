use std::process::ExitCode;

fn main() -> ExitCode {
    match certsign::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("certsign: {err:#}");
            ExitCode::FAILURE
        }
    }
}
