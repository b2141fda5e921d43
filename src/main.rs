use std::path::Path;
use std::time::Duration;

use anyhow::Error;
use env_logger::Env;
use log::{error, info, warn};
use prop_runtime::config::CONFIG_PATH;
use prop_runtime::led::open_driver;
use prop_runtime::network::{bind_control, bind_sacn};
use prop_runtime::power::open_monitor;
use prop_runtime::prelude::*;
use prop_runtime::settings::SETTINGS_PATH;
use prop_runtime::supervisor::{open_reset_input, Worker};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load the config file
    let mut config = Config::load()?;
    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level.as_str()))
        .init();
    if !Path::new(CONFIG_PATH).exists() {
        warn!("No {} found, running on defaults", CONFIG_PATH);
    }

    let settings = RonSettings::open(SETTINGS_PATH)?;
    config.apply_settings(&settings);
    info!(
        "Starting {} ({}) v{}",
        config.device.id,
        config.device.label,
        prop_runtime::config::FIRMWARE_VERSION
    );

    // Every channel exists before any worker starts
    let (senders, receivers) = Channels::create(&config.channels)?;

    info!("Starting LEDs...");
    let driver = open_driver(&config.leds.driver, config.leds.count)?;
    let renderer = LedRenderer::new(driver, config.leds.brightness);
    let led = renderer.spawn(receivers.led)?;
    // Short green sweep to show the strip is alive
    offer(
        &senders.led,
        Command::ScannerEffect {
            color: Color::rgb(0, 255, 0),
            step_delay: Duration::from_millis(15),
        },
        "LED",
    );

    info!("Starting video...");
    let mut display = FrameBuffer::new(
        config.display.width,
        config.display.height,
        config.display.framebuffer.clone(),
    );
    display.set_brightness(config.display.brightness);
    let player = Player::new(
        display,
        FrameDecoder::new(config.media.frame_buffer_size),
        MediaLibrary::new(&config.media.root),
    );
    let video = tokio::spawn(VideoTask::new(player, senders.network.clone()).run(receivers.video));

    info!("Starting network...");
    let control = bind_control(config.network.control_port).await?;
    // Bound even when disabled so `toggle_sacn` can switch reception on
    let sacn = bind_sacn(config.sacn.universe).await;
    let network = NetworkTask::new(&config, senders.led.clone(), senders.video.clone());
    let events = receivers.network;
    let network = tokio::spawn(async move {
        if let Err(e) = network.run(control, sacn, events).await {
            error!("Network task failed: {:#}", e);
        }
    });

    let mut supervisor = Supervisor::new(
        open_reset_input(config.reset_pin)?,
        open_monitor(config.battery.as_deref()),
        Box::new(settings),
        senders.network.clone(),
    );
    supervisor.watch("LED", Worker::Thread(led));
    supervisor.watch("video", Worker::Task(video));
    supervisor.watch("network", Worker::Task(network));
    drop(senders);

    match supervisor.run().await? {
        Exit::Shutdown => info!("Stopped"),
        Exit::FactoryReset => info!("Settings cleared, restart to apply defaults"),
    }
    Ok(())
}
