use anyhow::Context;
use winit::event_loop::{ControlFlow, EventLoop};

use umbra::logging::{init_logging, LoggingConfig};
use umbra::{RendererConfig, UmbraApp};

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    let config = RendererConfig::default().from_env();
    log::info!("starting {} at {}x{}", config.title, config.width, config.height);

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = UmbraApp::new(config);
    event_loop.run_app(&mut app).context("event loop terminated abnormally")?;

    if let Some(err) = app.take_error() {
        return Err(err).context("renderer setup failed");
    }
    Ok(())
}
