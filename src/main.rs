use std::process::ExitCode;

fn main() -> ExitCode {
    scenecast::cli::run(std::env::args_os())
}
