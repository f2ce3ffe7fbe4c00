use clap::Parser;
use dot_relay::app::{App, Options};
use dot_relay::driver::sim::SimulatedDriver;
use dot_relay::relay::message::ControlCommand;
use dot_relay::transport::tcp::TcpTransport;
use log::{info, warn};
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Set up the transport, driver and session, then run to completion.
async fn run(options: Options) -> Result<(), dot_relay::app::RunError> {
    let config = options.to_config();

    let transport = Arc::new(TcpTransport::new());
    transport
        .listen(&config.transport.listen_host, config.transport.listen_port)
        .await?;
    if let Some(host) = &config.transport.publish_host {
        transport.connect(host, config.transport.publish_port).await?;
    }

    let driver = Arc::new(SimulatedDriver::new(options.sim_devices));

    let app = App::new(config.session, driver, transport);

    // Ctrl-C takes the external-stop path: Stopping, teardown, Closed.
    let stop = app.control_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping session");
            if stop.send(ControlCommand::Stop).await.is_err() {
                warn!("Session already gone, exiting");
            }
        }
    });

    app.run().await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Clean exit codes for process managers that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    env_logger::init();
    let options = Options::parse();

    match run(options).await {
        Ok(_) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
