use loopbench::TrackingAllocator;
use std::process::ExitCode;

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

fn main() -> ExitCode {
    match loopbench::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
