use pulse::ServerBuilder;

use log::{error, info};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut server = match ServerBuilder::new().build() {
        Ok(server) => server,
        Err(err) => {
            error!("startup failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    match server.local_addr() {
        Ok(address) => info!(
            "listening on {address}, {} byte response",
            server.response().len()
        ),
        Err(err) => info!("listening (address unavailable: {err})"),
    }

    match server.run() {
        Ok(never) => match never {},
        Err(err) => {
            error!("event loop stopped: {err}");
            ExitCode::FAILURE
        }
    }
}
