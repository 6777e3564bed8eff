use clap::{Parser, Subcommand};
use midi_pedal::{
    backend::{Direction, MidiBackend, MidirBackend, OutputHandle},
    config::AppConfig,
    controller::{AppEvent, Controller},
    devices::Selection,
    midi::MidiMessage,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "midi-pedal")]
#[command(about = "MIDI pedal controller and monitor", long_about = None)]
struct Cli {
    /// Path to a configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available MIDI inputs and outputs
    List,

    /// Print every message received from the given inputs
    Monitor {
        /// MIDI input device name (repeatable)
        #[arg(short, long, required = true)]
        device: Vec<String>,
    },

    /// Send one Control Change message to an output
    SendCc {
        /// MIDI output device name
        #[arg(short, long)]
        device: String,

        /// Controller number (0-127)
        #[arg(long)]
        controller: u8,

        /// Controller value (0-127)
        #[arg(long)]
        value: u8,

        /// MIDI channel (1-16)
        #[arg(long, default_value_t = 1)]
        channel: u8,
    },

    /// Generate the default configuration file
    GenerateConfig {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "midi-pedal.json")]
        output: PathBuf,
    },
}

fn main() -> midi_pedal::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List => {
            list_devices(&config)?;
        }
        Commands::Monitor { device } => {
            monitor(config, device)?;
        }
        Commands::SendCc {
            device,
            controller,
            value,
            channel,
        } => {
            send_cc(&config, &device, controller, value, channel)?;
        }
        Commands::GenerateConfig { output } => {
            generate_config(output)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> midi_pedal::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            AppConfig::from_file(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn list_devices(config: &AppConfig) -> midi_pedal::Result<()> {
    tracing::info!("Listing available MIDI devices...");

    let backend = MidirBackend::new(&config.client_name);

    for direction in [Direction::Input, Direction::Output] {
        let devices = backend.list(direction)?;
        if devices.is_empty() {
            println!("No MIDI {}s found.", direction);
        } else {
            println!("Available MIDI {}s:", direction);
            for (i, device) in devices.iter().enumerate() {
                println!("  [{}] {}", i + 1, device);
            }
        }
    }

    Ok(())
}

fn monitor(config: AppConfig, devices: Vec<String>) -> midi_pedal::Result<()> {
    tracing::info!("Starting monitor...");

    let backend = MidirBackend::new(&config.client_name);
    let mut app = Controller::new(backend, config);
    app.refresh_devices();

    let inputs = app.directory(Direction::Input);
    let mut selection = Selection::new();
    for name in &devices {
        match inputs.position(name) {
            Some(i) => {
                selection.insert(i);
            }
            None => return Err(midi_pedal::Error::DeviceNotFound(name.clone())),
        }
    }

    app.update(AppEvent::SelectionChanged {
        direction: Direction::Input,
        selection,
    });
    let open = app.directory(Direction::Input).selection().len();
    println!("✓ Monitoring {} of {} input(s)", open, devices.len());
    println!("Press Ctrl+C to exit...");

    // Keep running until interrupted
    loop {
        app.tick(Instant::now());
        for line in app.monitor().lines() {
            println!("{}", line);
        }
        app.update(AppEvent::ClearLog);
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn send_cc(
    config: &AppConfig,
    device: &str,
    controller: u8,
    value: u8,
    channel: u8,
) -> midi_pedal::Result<()> {
    if !(1..=16).contains(&channel) {
        return Err(midi_pedal::Error::InvalidMidiMessage(format!(
            "Channel {} out of range (1-16)",
            channel
        )));
    }

    let mut backend = MidirBackend::new(&config.client_name);
    let mut output = backend.open_output(device)?;

    let msg = MidiMessage::control_change(channel - 1, controller, value);
    output.send(&msg.to_bytes())?;
    output.close();

    println!("✓ Sent '{}' to '{}'", msg, device);
    Ok(())
}

fn generate_config(output: PathBuf) -> midi_pedal::Result<()> {
    tracing::info!("Generating default configuration...");

    AppConfig::default().to_file(&output)?;

    println!("✓ Configuration saved to: {}", output.display());
    println!("You can edit this file and load it with: midi-pedal --config {} <command>", output.display());

    Ok(())
}
