// gsmlink test application -- CLI tool for exercising a GSM modem through
// the gsmlink engine, against real hardware or the simulated modem.
//
// Usage:
//   gsmlink-test-app --port /dev/ttyUSB0 status
//   gsmlink-test-app --port /dev/ttyUSB0 send +391234567890 "ON 22"
//   gsmlink-test-app --port /dev/ttyUSB0 inbox --wait 30
//   gsmlink-test-app --port /dev/ttyUSB0 run --echo
//   gsmlink-test-app --mock pb add +391234567890 --name ADMIN
//   gsmlink-test-app --mock -v run --duration 60

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use gsmlink_core::{ModemEvent, NullPin, SmsQueue};
use gsmlink_modem::{DispatchStatus, Modem, ModemBuilder, RegistrationPolicy};
use gsmlink_test_harness::{SimHandle, SimulatedModem};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// gsmlink test application -- drives a GSM modem from the command line.
#[derive(Parser)]
#[command(name = "gsmlink-test-app", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    /// Required unless --mock is used.
    #[arg(long)]
    port: Option<String>,

    /// Use the in-memory simulated modem instead of a serial port.
    #[arg(long)]
    mock: bool,

    /// Steady-state baud rate negotiated with the modem.
    #[arg(long)]
    baud: Option<u32>,

    /// Seconds a registration report must settle before it is trusted
    /// (0 = trust immediately).
    #[arg(long)]
    registration_delay: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dispatch loop and print events.
    Run {
        /// Answer every received message with its own text.
        #[arg(long)]
        echo: bool,

        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Store a message and send it once the modem is registered.
    Send {
        /// Destination number (e.g. +391234567890).
        number: String,
        /// Message text, at most 160 characters.
        body: String,

        /// Seconds to wait for the send to complete.
        #[arg(long, default_value_t = 120)]
        wait: u64,
    },

    /// Collect received messages and print them.
    Inbox {
        /// Seconds to run the dispatch loop before reading.
        #[arg(long, default_value_t = 10)]
        wait: u64,
    },

    /// Print registration, signal and error state.
    Status {
        /// Seconds to run the dispatch loop before reporting.
        #[arg(long, default_value_t = 20)]
        wait: u64,
    },

    /// Phonebook operations.
    Pb {
        #[command(subcommand)]
        action: PbAction,
    },

    /// Delete every message in the SIM store.
    Clear,
}

#[derive(Subcommand)]
enum PbAction {
    /// Search the first phonebook slots for a number.
    Find { number: String },
    /// Look up the first entry whose name starts with a prefix.
    Lookup { name: String },
    /// Store a number in the first free slot.
    Add {
        number: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Clear a phonebook slot.
    Delete { index: u16 },
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn builder_from(cli: &Cli) -> ModemBuilder {
    let mut builder = ModemBuilder::new();
    if let Some(baud) = cli.baud {
        builder = builder.baud_rate(baud);
    }
    if let Some(secs) = cli.registration_delay {
        let policy = if secs == 0 {
            RegistrationPolicy::Immediate
        } else {
            RegistrationPolicy::Settle(Duration::from_secs(secs))
        };
        builder = builder.registration_policy(policy);
    }
    builder
}

/// Build and initialize the modem. Returns the simulator handle in mock
/// mode.
async fn create_modem(cli: &Cli) -> Result<(Modem, Option<SimHandle>)> {
    let builder = builder_from(cli);

    if cli.mock {
        info!("using simulated modem");
        let sim = SimulatedModem::new();
        let handle = sim.handle();
        let mut modem = builder
            .build_with_transport(Box::new(sim), Box::new(NullPin), Box::new(NullPin))
            .context("failed to build modem with simulated transport")?;
        modem
            .initialize()
            .await
            .context("simulated modem handshake failed")?;
        // Give the simulated network something to report.
        handle.attach(4);
        handle.deliver_sms("+10000000000", "STATUS");
        println!("Connected (simulated modem)");
        return Ok((modem, Some(handle)));
    }

    let port = cli
        .port
        .as_deref()
        .context("--port is required when not using --mock")?;
    info!(port, "opening serial port");
    let mut modem = builder
        .serial_port(port)
        .build(Box::new(NullPin), Box::new(NullPin))
        .await
        .with_context(|| format!("failed to open serial port {port}"))?;
    modem
        .initialize()
        .await
        .with_context(|| format!("modem on {port} did not complete the handshake"))?;
    println!("Connected -- {port}");
    Ok((modem, None))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Run dispatch ticks for `duration`, or until `done` returns true.
async fn pump(modem: &mut Modem, duration: Duration, done: impl Fn(&Modem) -> bool) -> Result<()> {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline && !done(&*modem) {
        if modem.dispatch().await? == DispatchStatus::Idle {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
    Ok(())
}

async fn cmd_run(modem: &mut Modem, echo: bool, duration_secs: u64) -> Result<()> {
    let mut event_rx = modem.subscribe();
    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));

    println!("Running dispatch loop (Ctrl-C to stop)...");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        if deadline.is_some_and(|dl| Instant::now() >= dl) {
            println!("Run duration elapsed.");
            break;
        }

        tokio::select! {
            _ = &mut ctrl_c => {
                println!("Interrupted.");
                break;
            }
            status = modem.dispatch() => {
                if status? == DispatchStatus::Fatal {
                    warn!("modem not answering");
                }
            }
        }

        loop {
            match event_rx.try_recv() {
                Ok(event) => println!("[event] {event:?}"),
                Err(TryRecvError::Lagged(n)) => {
                    println!("[warning] missed {n} events (consumer too slow)")
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        while modem.is_sms_available() {
            match modem.sms_dequeue(SmsQueue::Inbound).await {
                Ok(sms) => {
                    println!("[sms] from {}: {}", sms.phone, sms.body);
                    if echo {
                        match modem.send_sms(&sms.phone, &sms.body).await {
                            Ok(index) => debug!(index, to = %sms.phone, "echo queued"),
                            Err(e) => warn!(to = %sms.phone, error = %e, "echo failed"),
                        }
                    }
                }
                Err(e) => warn!(error = %e, "reading received message failed"),
            }
        }
    }

    Ok(())
}

async fn cmd_send(modem: &mut Modem, number: &str, body: &str, wait_secs: u64) -> Result<()> {
    let mut event_rx = modem.subscribe();
    let index = modem
        .send_sms(number, body)
        .await
        .context("failed to store message")?;
    info!(index, number, "message stored");
    println!("Stored at index {index}, waiting for network...");

    pump(modem, Duration::from_secs(wait_secs), |m| {
        m.sms_count(SmsQueue::Outbound) == 0
    })
    .await?;

    while let Ok(event) = event_rx.try_recv() {
        match event {
            ModemEvent::SmsSent { index: sent } if sent == index => {
                println!("Sent.");
                return Ok(());
            }
            ModemEvent::SmsDropped { index: dropped } if dropped == index => {
                bail!("message dropped after repeated send failures");
            }
            _ => {}
        }
    }
    bail!("message not sent within {wait_secs} s")
}

async fn cmd_inbox(modem: &mut Modem, wait_secs: u64) -> Result<()> {
    pump(modem, Duration::from_secs(wait_secs), |_| false).await?;

    let count = modem.sms_count(SmsQueue::Inbound);
    println!("{count} message(s)");
    while modem.is_sms_available() {
        match modem.sms_dequeue(SmsQueue::Inbound).await {
            Ok(sms) => println!("  {:<20} {}", sms.phone, sms.body),
            Err(e) => warn!(error = %e, "unreadable message"),
        }
    }
    Ok(())
}

async fn cmd_status(modem: &mut Modem, wait_secs: u64) -> Result<()> {
    pump(modem, Duration::from_secs(wait_secs), |_| false).await?;

    println!("  Registered:     {}", modem.is_registered());
    println!("  Signal:         {}", modem.signal_level());
    println!("  Phonebook:      {}", modem.is_phonebook_ready());
    println!("  Fatal:          {}", modem.is_fatal());
    println!("  Inbound:        {}", modem.sms_count(SmsQueue::Inbound));
    println!("  Outbound:       {}", modem.sms_count(SmsQueue::Outbound));
    Ok(())
}

async fn cmd_pb(modem: &mut Modem, action: &PbAction) -> Result<()> {
    match action {
        PbAction::Find { number } => match modem.number_exists_in_pb(number).await? {
            Some(index) => println!("{number} is in slot {index}"),
            None => println!("{number} not found"),
        },
        PbAction::Lookup { name } => match modem.get_pb_entry_by_name(name).await? {
            Some(entry) => println!("{name}: slot {} number {}", entry.index, entry.number),
            None => println!("{name} not found"),
        },
        PbAction::Add { number, name } => {
            modem.register_number_in_pb(number, name.as_deref()).await?;
            println!("Stored {number}");
        }
        PbAction::Delete { index } => {
            modem.delete_pb_entry_at_index(*index).await?;
            println!("Cleared slot {index}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.mock && cli.port.is_some() {
        bail!("--port and --mock are mutually exclusive");
    }

    let (mut modem, _sim) = create_modem(&cli).await?;
    debug!("modem initialized");

    let result = match &cli.command {
        Command::Run { echo, duration } => cmd_run(&mut modem, *echo, *duration).await,
        Command::Send { number, body, wait } => cmd_send(&mut modem, number, body, *wait).await,
        Command::Inbox { wait } => cmd_inbox(&mut modem, *wait).await,
        Command::Status { wait } => cmd_status(&mut modem, *wait).await,
        Command::Pb { action } => cmd_pb(&mut modem, action).await,
        Command::Clear => modem
            .clear_sms_memory()
            .await
            .map(|()| println!("Message store cleared"))
            .map_err(Into::into),
    };

    if let Err(e) = modem.close().await {
        warn!(error = %e, "closing the modem failed");
    }
    result
}
