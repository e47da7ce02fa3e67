//! Subcommand handlers

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use hdmx_driver::{
    onboard, DeviceConfig, DeviceContext, DeviceRegistry, DriverError, DriverEvent, MatrixDriver,
};
use hdmx_protocol::input_label;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::{Cli, Command, PowerArg};
use crate::settings::Settings;

/// Settings together with the file they live in
struct Store {
    path: PathBuf,
    settings: Settings,
}

impl Store {
    fn open(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Settings::default_path().context("Could not determine settings path")?,
        };
        let settings = Settings::load_from(&path);
        Ok(Self { path, settings })
    }

    fn save(&self) -> Result<()> {
        self.settings.save_to(&self.path)
    }

    /// Store `config` under `name` if it differs from what is saved
    fn remember(&mut self, name: &str, config: DeviceConfig) -> Result<()> {
        if self.settings.devices.get(name) == Some(&config) {
            return Ok(());
        }
        info!("Updating saved configuration of {}", name);
        self.settings.devices.insert(name.to_string(), config);
        self.save()
    }

    /// Set up `name` in a fresh registry, persisting re-probed capabilities
    async fn set_up(&mut self, name: &str) -> Result<DeviceRegistry> {
        let config = self.settings.device(name)?.clone();
        let mut registry = DeviceRegistry::with_transport_config(self.settings.transport.clone());
        let updated = registry.setup(name, &config).await?.config();
        self.remember(name, updated)?;
        Ok(registry)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut store = Store::open(cli.config)?;

    match cli.command {
        Command::Add { name, host, port } => add(&mut store, name, host, port).await,
        Command::Remove { name } => remove(&mut store, &name),
        Command::List => {
            list(&store.settings);
            Ok(())
        }
        Command::Probe { name } => probe(&mut store, &name).await,
        Command::Route {
            name,
            input,
            output,
        } => route(&mut store, &name, input, output).await,
        Command::Power { name, state } => power(&mut store, &name, state).await,
        Command::Status { name } => status(&mut store, &name).await,
        Command::Watch { name, interval } => watch(&mut store, &name, interval).await,
    }
}

async fn add(store: &mut Store, name: String, host: String, port: u16) -> Result<()> {
    if store.settings.devices.contains_key(&name) {
        bail!("A device named {:?} already exists", name);
    }

    let config = DeviceConfig::new(host, port);
    config.validate()?;

    let config = onboard(config.endpoint(), store.settings.transport.clone()).await?;
    println!("Added {}: {} ({})", name, config.title(), dimensions(&config));

    store.settings.devices.insert(name, config);
    store.save()
}

fn remove(store: &mut Store, name: &str) -> Result<()> {
    if store.settings.devices.remove(name).is_none() {
        bail!("No device named {:?}", name);
    }
    store.save()?;
    println!("Removed {}", name);
    Ok(())
}

fn list(settings: &Settings) {
    if settings.devices.is_empty() {
        println!("No devices configured. Add one with `hdmx add <name> --host <host>`.");
        return;
    }

    for (name, config) in &settings.devices {
        println!(
            "{:<16} {:<22} {} ({})",
            name,
            config.endpoint().to_string(),
            config.title(),
            dimensions(config)
        );
    }
}

async fn probe(store: &mut Store, name: &str) -> Result<()> {
    let config = store.settings.device(name)?.clone();
    let endpoint = config.endpoint();
    let driver = MatrixDriver::with_config(endpoint.clone(), store.settings.transport.clone());

    if !driver.check_reachable().await {
        return Err(DriverError::CannotConnect { endpoint }.into());
    }

    let capabilities = driver.probe().await;
    println!(
        "{}: {} ({})",
        name,
        capabilities.model.as_deref().unwrap_or("unknown model"),
        capabilities.dimensions()
    );
    store.remember(name, config.with_capabilities(&capabilities))
}

async fn route(store: &mut Store, name: &str, input: u32, output: u32) -> Result<()> {
    let registry = store.set_up(name).await?;
    device(&registry, name)?.driver.route(input, output).await?;

    println!("{}: {} -> Output {}", name, input_label(input), output);
    Ok(())
}

async fn power(store: &mut Store, name: &str, state: PowerArg) -> Result<()> {
    let registry = store.set_up(name).await?;
    let switch = &device(&registry, name)?.entities.power;

    match state {
        PowerArg::On => switch.turn_on().await?,
        PowerArg::Off => switch.turn_off().await?,
    }

    println!("{}: power {}", name, switch.state().name());
    Ok(())
}

async fn status(store: &mut Store, name: &str) -> Result<()> {
    let registry = store.set_up(name).await?;
    let report = registry.refresh(name).await?;
    let context = device(&registry, name)?;

    if report.is_empty() {
        match context.driver.last_refresh() {
            Some(at) => warn!(
                "{} did not answer, showing state from {}s ago",
                name,
                at.elapsed().as_secs()
            ),
            None => warn!("{} did not answer and has never been read", name),
        }
    }

    let config = context.config();
    println!(
        "{} at {} ({})",
        config.title(),
        context.driver.endpoint(),
        context.capabilities().dimensions()
    );
    println!("Power: {}", context.entities.power.state().name());
    for selector in &context.entities.selectors {
        println!(
            "Output {}: {}",
            selector.output(),
            selector
                .current_option()
                .unwrap_or_else(|| "unknown".to_string())
        );
    }
    Ok(())
}

async fn watch(store: &mut Store, name: &str, interval: Option<u64>) -> Result<()> {
    let period = interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| store.settings.poll_interval())
        .max(Duration::from_secs(1));

    let registry = store.set_up(name).await?;
    let context = device(&registry, name)?;
    let mut events = context.driver.subscribe();
    let mut ticker = tokio::time::interval(period);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    println!(
        "Watching {} every {}s (Ctrl-C to stop)",
        name,
        period.as_secs()
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let report = registry.refresh(name).await?;
                if report.is_empty() {
                    warn!("{} did not answer", name);
                }
            }
            event = events.recv() => match event {
                Ok(event) => println!("{}: {}", name, describe(&event)),
                Err(RecvError::Lagged(missed)) => warn!("Missed {} events", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

fn device<'a>(registry: &'a DeviceRegistry, name: &str) -> Result<&'a DeviceContext> {
    registry
        .get(name)
        .ok_or_else(|| DriverError::DeviceNotFound(name.to_string()).into())
}

fn dimensions(config: &DeviceConfig) -> String {
    config
        .capabilities()
        .map(|c| c.dimensions())
        .unwrap_or_else(|| "not probed".to_string())
}

fn describe(event: &DriverEvent) -> String {
    match event {
        DriverEvent::Probed { capabilities } => {
            format!("probed as {}", capabilities.dimensions())
        }
        DriverEvent::RouteChanged { output, input } => {
            format!("{} -> Output {}", input_label(*input), output)
        }
        DriverEvent::PowerChanged { state } => format!("power {}", state.name()),
    }
}
