use std::process::ExitCode;

fn main() -> ExitCode {
    match sitekeeper::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            sitekeeper::ui::output::error(format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
